//! Container engine boundary.
//!
//! The session core talks to the engine only through [`EngineClient`], using
//! the engine-neutral value types below. [`DockerEngine`] is the production
//! implementation; tests substitute an in-memory engine.
//!
//! ## Architecture
//!
//! ```text
//! SessionManager ──► Arc<dyn EngineClient> ──► DockerEngine ──► dockerd
//!                                         └──► (test fake)
//! ```

pub mod docker;

pub use docker::DockerEngine;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Errors reported by an engine client.
///
/// "Not found" gets its own variant so callers can treat an already-removed
/// container as benign without string matching.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no such resource: {resource}")]
    NotFound { resource: String },

    #[error("engine returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("engine stream reported: {0}")]
    Stream(String),

    #[error("engine transport error: {0}")]
    Transport(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }
}

/// A published port as reported by the engine's list call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishedPort {
    pub container_port: u16,
    pub host_port: Option<u16>,
}

/// A container as reported by the engine's list call (any run state).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineContainer {
    pub id: String,
    /// Name without the engine's leading `/`.
    pub name: String,
    /// Image reference the container was created from.
    pub image: String,
    pub labels: HashMap<String, String>,
    /// Engine run state (`created`, `running`, `exited`, ...).
    pub state: String,
    pub ports: Vec<PublishedPort>,
}

/// Host port → container port publication (TCP).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    pub container_port: u16,
    pub host_port: u16,
}

/// Host directory bind-mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBinding {
    pub host_path: PathBuf,
    pub container_path: String,
    pub read_only: bool,
}

impl VolumeBinding {
    pub fn read_write(host_path: impl Into<PathBuf>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: false,
        }
    }

    /// Engine bind syntax: `host:container:rw`.
    pub fn bind_spec(&self) -> String {
        let mode = if self.read_only { "ro" } else { "rw" };
        format!(
            "{}:{}:{}",
            self.host_path.display(),
            self.container_path,
            mode
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Never restarted by the engine.
    Never,
    /// Restarted always, unless it was stopped by hand.
    UnlessStopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub shm_size_bytes: i64,
    pub memory_bytes: i64,
    pub nano_cpus: i64,
}

/// Everything the engine needs to create and start one container.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    pub image: String,
    pub name: String,
    pub labels: HashMap<String, String>,
    /// `KEY=VALUE` entries.
    pub env: Vec<String>,
    pub ports: Vec<PortBinding>,
    pub volumes: Vec<VolumeBinding>,
    pub limits: ResourceLimits,
    pub restart_policy: RestartPolicy,
}

/// One decoded event from an image pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullProgress {
    pub status: String,
    /// Layer id, when the event is about a single layer.
    pub layer: Option<String>,
    /// Engine-rendered progress bar / size text.
    pub progress: Option<String>,
    pub current: Option<i64>,
    pub total: Option<i64>,
}

impl PullProgress {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Default::default()
        }
    }

    /// Percentage of the current layer, when the engine reports sizes.
    pub fn percent(&self) -> Option<u8> {
        match (self.current, self.total) {
            (Some(current), Some(total)) if total > 0 => {
                Some(((current.clamp(0, total) * 100) / total) as u8)
            }
            _ => None,
        }
    }
}

impl fmt::Display for PullProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        if let Some(layer) = &self.layer {
            write!(f, " [{}]", layer)?;
        }
        if let Some(progress) = &self.progress {
            write!(f, " {}", progress)?;
        }
        Ok(())
    }
}

/// One line of image build output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildLine {
    Output(String),
    /// The build stopped; carries the engine's error text.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVersion {
    pub version: String,
    pub api_version: String,
}

pub type PullStream<'a> = BoxStream<'a, Result<PullProgress, EngineError>>;
pub type BuildStream<'a> = BoxStream<'a, Result<BuildLine, EngineError>>;

/// The engine operations the session core depends on.
///
/// Implementations must be usable from several tasks at once; the core never
/// serializes calls against the same container itself.
#[async_trait]
pub trait EngineClient: Send + Sync {
    async fn ping(&self) -> Result<(), EngineError>;

    async fn version(&self) -> Result<EngineVersion, EngineError>;

    /// All containers, regardless of run state.
    async fn list_containers(&self) -> Result<Vec<EngineContainer>, EngineError>;

    /// Whether `reference` is present in the local image store.
    async fn image_exists(&self, reference: &str) -> Result<bool, EngineError>;

    /// Pull `repository:tag`, yielding decoded progress events.
    fn pull_image(&self, repository: &str, tag: &str) -> PullStream<'_>;

    /// Build `context` (an uncompressed tar holding a `Dockerfile`) as `tag`.
    fn build_image(&self, context: Vec<u8>, tag: &str) -> BuildStream<'_>;

    /// Create and start a container; returns the engine-assigned id.
    async fn run_container(&self, spec: RunSpec) -> Result<String, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    async fn stop_container(&self, id: &str) -> Result<(), EngineError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError>;
}
