//! Which containers belong to vaultOS.
//!
//! The engine's container object and its labels are the only record of a
//! session; nothing is cached between calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::{EngineClient, EngineContainer};
use crate::error::{LifecycleOp, Result, VaultError};

/// Label key marking a container as ours.
pub const APP_LABEL: &str = "app";
pub const APP_LABEL_VALUE: &str = "vaultOS";

/// Absolute expiry of an ephemeral session, unix seconds.
pub const EXPIRES_LABEL: &str = "vaultos.expires";

/// Name prefix of every generated container name.
pub const NAME_PREFIX: &str = "vaultos-";

/// Web interface port inside every desktop image.
pub const WEB_PORT: u16 = 3000;

const SHORT_ID_LEN: usize = 12;

/// Label OR name-prefix match.
///
/// The prefix rule keeps sessions created before labelling visible.
pub fn is_managed(container: &EngineContainer) -> bool {
    container.labels.get(APP_LABEL).map(String::as_str) == Some(APP_LABEL_VALUE)
        || container.name.starts_with(NAME_PREFIX)
}

/// Run state as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown(String),
}

impl SessionStatus {
    pub fn from_engine(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "created" => SessionStatus::Created,
            "running" => SessionStatus::Running,
            "paused" => SessionStatus::Paused,
            "restarting" => SessionStatus::Restarting,
            "removing" => SessionStatus::Removing,
            "exited" => SessionStatus::Exited,
            "dead" => SessionStatus::Dead,
            _ => SessionStatus::Unknown(state.to_string()),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Created => f.write_str("created"),
            SessionStatus::Running => f.write_str("running"),
            SessionStatus::Paused => f.write_str("paused"),
            SessionStatus::Restarting => f.write_str("restarting"),
            SessionStatus::Removing => f.write_str("removing"),
            SessionStatus::Exited => f.write_str("exited"),
            SessionStatus::Dead => f.write_str("dead"),
            SessionStatus::Unknown(state) => f.write_str(state),
        }
    }
}

/// A container classified as a vaultOS session.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedSession {
    pub id: String,
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub status: SessionStatus,
    /// Host port bound to the web interface, if published.
    pub host_port: Option<u16>,
}

impl ManagedSession {
    pub fn from_container(container: EngineContainer) -> Self {
        let host_port = container
            .ports
            .iter()
            .find(|p| p.container_port == WEB_PORT)
            .and_then(|p| p.host_port);
        Self {
            status: SessionStatus::from_engine(&container.state),
            id: container.id,
            name: container.name,
            image: container.image,
            labels: container.labels,
            host_port,
        }
    }

    /// Raw `vaultos.expires` label, if set.
    pub fn expiry_label(&self) -> Option<&str> {
        self.labels.get(EXPIRES_LABEL).map(String::as_str)
    }

    /// Parsed expiry. A label that is not a number yields `None`.
    pub fn expires_at(&self) -> Option<f64> {
        let raw = self.expiry_label()?;
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                warn!(session = %self.name, label = raw, "Ignoring unparsable expiry label");
                None
            }
        }
    }

    pub fn short_id(&self) -> &str {
        match self.id.char_indices().nth(SHORT_ID_LEN) {
            Some((idx, _)) => &self.id[..idx],
            None => &self.id,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }
}

/// Enumerates managed sessions straight from the engine.
#[derive(Clone)]
pub struct SessionRegistry {
    engine: Arc<dyn EngineClient>,
}

impl SessionRegistry {
    pub fn new(engine: Arc<dyn EngineClient>) -> Self {
        Self { engine }
    }

    /// All managed sessions, in any run state.
    pub async fn list_managed(&self) -> Result<Vec<ManagedSession>> {
        let containers = self
            .engine
            .list_containers()
            .await
            .map_err(|source| VaultError::lifecycle(LifecycleOp::List, "containers", source))?;

        let total = containers.len();
        let sessions: Vec<ManagedSession> = containers
            .into_iter()
            .filter(is_managed)
            .map(ManagedSession::from_container)
            .collect();
        debug!(total, managed = sessions.len(), "Listed containers");
        Ok(sessions)
    }
}
