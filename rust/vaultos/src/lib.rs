//! vaultos: disposable and persistent desktop-in-a-container sessions.
//!
//! This crate is the lifecycle core behind the vaultos front-ends. It turns a
//! session request into a running container on the local engine and keeps
//! the fleet of managed containers tidy.
//!
//! ## Modules
//!
//! - [`engine`]: Engine client boundary and the Docker implementation (bollard)
//! - [`image`]: Tag resolution, image pulls, custom identity images
//! - [`session`]: Session configs, registry, expiry pruning, orchestration
//! - [`catalog`]: Supported OS / desktop combinations and their labels
//!
//! ## Key Design: Engine-Owned State
//!
//! vaultos keeps no database. A container's name and labels are the session
//! record, so every listing re-queries the engine.
//!
//! ```text
//! SessionConfig ──► TagResolver ──► ImageProvisioner ──► engine run
//!                                   (pull / custom build)
//!
//! sweep() ──► SessionRegistry ──► expired? ──► forced remove
//! ```

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod image;
pub mod logging;
pub mod session;

pub use config::{Config, ConfigError};
pub use engine::{DockerEngine, EngineClient, EngineError};
pub use error::{LifecycleOp, Result, VaultError};
pub use session::{
    ActiveSession, ManagedSession, SessionConfig, SessionManager, SessionMode, SessionRequest,
    SystemStatus,
};
