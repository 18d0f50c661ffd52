//! Ephemeral session lifetimes.
//!
//! Timer grammar: `^(\d+)([shd])$`, seconds / hours / days. A timer that
//! does not match resolves to "now", so the session expires on the next
//! sweep instead of living forever.

use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::registry::{ManagedSession, SessionRegistry};
use crate::engine::EngineClient;
use crate::error::Result;

static TIMER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([shd])$").expect("timer pattern is valid"));

/// Current time as fractional unix seconds.
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Duration encoded by `spec`, or `None` when it does not match the grammar
/// (or overflows).
pub fn timer_duration(spec: &str) -> Option<Duration> {
    let caps = TIMER_PATTERN.captures(spec)?;
    let amount: u64 = caps[1].parse().ok()?;
    let unit = match &caps[2] {
        "s" => 1,
        "h" => 3_600,
        "d" => 86_400,
        _ => return None,
    };
    amount.checked_mul(unit).map(Duration::from_secs)
}

/// Absolute expiry for `spec`, starting now.
pub fn parse_timer(spec: &str) -> f64 {
    parse_timer_at(spec, unix_now())
}

/// Absolute expiry for `spec`, starting at `now`.
pub fn parse_timer_at(spec: &str, now: f64) -> f64 {
    match timer_duration(spec) {
        Some(duration) => now + duration.as_secs_f64(),
        None => {
            warn!(timer = spec, "Malformed timer, session expires immediately");
            now
        }
    }
}

/// Time left on an ephemeral session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum Countdown {
    Remaining(Duration),
    Expired,
}

impl Countdown {
    /// Expired once no time is left; the sweeper only removes strictly past
    /// expiry, so a session can show `expired` for one more tick.
    pub fn until(expires_at: f64, now: f64) -> Self {
        if now >= expires_at {
            Countdown::Expired
        } else {
            Countdown::Remaining(Duration::from_secs((expires_at - now).floor() as u64))
        }
    }
}

/// `DD:HH:MM:SS`, or `expired`.
impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Countdown::Expired => f.write_str("expired"),
            Countdown::Remaining(left) => {
                let secs = left.as_secs();
                write!(
                    f,
                    "{:02}:{:02}:{:02}:{:02}",
                    secs / 86_400,
                    (secs % 86_400) / 3_600,
                    (secs % 3_600) / 60,
                    secs % 60
                )
            }
        }
    }
}

impl From<Countdown> for String {
    fn from(countdown: Countdown) -> Self {
        countdown.to_string()
    }
}

/// Removes ephemeral sessions whose expiry has passed.
#[derive(Clone)]
pub struct ExpiryPruner {
    registry: SessionRegistry,
    engine: Arc<dyn EngineClient>,
}

impl ExpiryPruner {
    pub fn new(registry: SessionRegistry, engine: Arc<dyn EngineClient>) -> Self {
        Self { registry, engine }
    }

    /// One sweep at the current time. Returns the surviving sessions.
    pub async fn sweep(&self) -> Result<Vec<ManagedSession>> {
        self.sweep_at(unix_now()).await
    }

    /// One sweep as of `now`.
    ///
    /// Expired sessions are force-removed and left out of the result even
    /// when the removal fails; removal failures are only logged.
    pub async fn sweep_at(&self, now: f64) -> Result<Vec<ManagedSession>> {
        let sessions = self.registry.list_managed().await?;
        let mut survivors = Vec::with_capacity(sessions.len());

        for session in sessions {
            match session.expires_at() {
                Some(expires_at) if now > expires_at => self.remove_expired(&session).await,
                _ => survivors.push(session),
            }
        }

        Ok(survivors)
    }

    async fn remove_expired(&self, session: &ManagedSession) {
        match self.engine.remove_container(&session.id, true).await {
            Ok(()) => info!(session = %session.name, id = %session.short_id(), "Removed expired session"),
            Err(e) if e.is_not_found() => {
                debug!(session = %session.name, "Expired session already gone")
            }
            Err(e) => warn!(session = %session.name, error = %e, "Failed to remove expired session"),
        }
    }
}
