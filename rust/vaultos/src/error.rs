//! Error types for vaultos.
//!
//! Every variant keeps the engine's own message so a surfaced error is
//! enough to diagnose the failure without re-running it.

use thiserror::Error;

use crate::engine::EngineError;

/// The lifecycle call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    Create,
    Start,
    Stop,
    Delete,
    List,
}

impl std::fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleOp::Create => write!(f, "create"),
            LifecycleOp::Start => write!(f, "start"),
            LifecycleOp::Stop => write!(f, "stop"),
            LifecycleOp::Delete => write!(f, "delete"),
            LifecycleOp::List => write!(f, "list"),
        }
    }
}

/// All error types that can occur in vaultos operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The engine could not be reached when the client was set up.
    #[error("could not connect to the container engine: {0}")]
    Connectivity(#[source] EngineError),

    /// Probing or pulling a base image failed.
    #[error("failed to provision image {image}: {source}")]
    Provision {
        image: String,
        #[source]
        source: EngineError,
    },

    /// Deriving a custom identity image failed.
    #[error("failed to build image {tag}: {message}")]
    Build {
        tag: String,
        message: String,
        /// Build output captured before the failure.
        logs: Vec<String>,
    },

    /// A create/start/stop/delete/list call was rejected by the engine.
    #[error("failed to {op} {target}: {source}")]
    Lifecycle {
        op: LifecycleOp,
        target: String,
        #[source]
        source: EngineError,
    },

    /// A session request is missing a field its mode requires.
    #[error("invalid session config: {field} {reason}")]
    Validation { field: &'static str, reason: String },
}

impl VaultError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        VaultError::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn lifecycle(op: LifecycleOp, target: impl Into<String>, source: EngineError) -> Self {
        VaultError::Lifecycle {
            op,
            target: target.into(),
            source,
        }
    }
}

/// Result type alias using VaultError.
pub type Result<T> = std::result::Result<T, VaultError>;
