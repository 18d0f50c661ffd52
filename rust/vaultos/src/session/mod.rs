//! Session management on top of the container engine.
//!
//! This module provides:
//! - Typed session configs, validated from the creation wizard's input
//! - The registry deciding which containers are ours
//! - Expiry pruning for ephemeral sessions
//! - The lifecycle orchestrator (create, start, stop, delete, status)
//!
//! ## Naming and Labels
//!
//! ```text
//! name:   vaultos-<5 hex>-<display name>
//! labels: app=vaultOS
//!         vaultos.expires=<unix seconds>     (ephemeral only)
//! ```

pub mod config;
pub mod expiry;
pub mod lifecycle;
pub mod registry;

pub use config::{AdvancedIdentity, DesktopChoice, SessionConfig, SessionKind, SessionMode, SessionRequest};
pub use expiry::{parse_timer, parse_timer_at, timer_duration, unix_now, Countdown, ExpiryPruner};
pub use lifecycle::{generate_container_name, ActiveSession, CreateTask, SessionManager, SystemStatus};
pub use registry::{is_managed, ManagedSession, SessionRegistry, SessionStatus};
