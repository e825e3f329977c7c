//! Error types for orchestration
//!
//! Runs report failures to the UI as [`ErrorDescriptor`] values in their
//! result slot. These enums cover the orchestration machinery itself and
//! configuration loading.

use std::path::PathBuf;

use canvas_engine::EngineError;
use canvas_model::{ErrorCode, ErrorDescriptor, HashError};

use crate::state_machine::RunStatus;

/// Errors raised by orchestrators
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Transition not in the lifecycle table
    #[error("illegal run transition: {from} -> {to}")]
    IllegalTransition {
        /// Current status
        from: RunStatus,
        /// Requested status
        to: RunStatus,
    },

    /// Request could not be hashed
    #[error("request hashing failed: {0}")]
    Hash(#[from] HashError),

    /// Adapter construction failed
    #[error("adapter error: {0}")]
    Engine(#[from] EngineError),
}

impl From<RunnerError> for ErrorDescriptor {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Hash(_) => ErrorDescriptor::bad_input(err.to_string()),
            RunnerError::Engine(engine) => engine.into(),
            RunnerError::IllegalTransition { .. } => {
                ErrorDescriptor::new(ErrorCode::ServerError, err.to_string())
            }
        }
    }
}

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Environment override has an invalid value
    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
    },
}
