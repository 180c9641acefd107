//! Error types for Amoeba.
//!
//! All errors are strongly typed using thiserror. Per-cycle failures
//! (a command that could not be spawned, a child that had to be killed)
//! are ordinary values consumed by the worker loop; only startup failures
//! are expected to reach the binary.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Validation errors raised while building tokens, limits, or configuration.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ValidationError {
    #[error("Token {token:?} is invalid: {reason}")]
    InvalidToken {
        token: String,
        reason: &'static str,
    },

    #[error("Invalid limits: {reason}")]
    InvalidLimits {
        reason: String,
    },

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },
}

/// Failures of the execution sandbox.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ExecError {
    #[error("Failed to create output pipe: {source}")]
    Pipe {
        #[source]
        source: io::Error,
    },

    #[error("Failed to spawn command interpreter: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },

    #[error("Failed to poll child output: {source}")]
    Poll {
        #[source]
        source: io::Error,
    },

    #[error("Failed to query child status: {source}")]
    Wait {
        #[source]
        source: io::Error,
    },

    #[error("Child was stopped by escalation stage {signal_stage}")]
    Interrupted {
        signal_stage: u32,
    },

    #[error("Child survived {attempts} kill attempts; giving up")]
    Unresponsive {
        attempts: u32,
    },
}

impl ExecError {
    /// Returns true for resource failures that say nothing about the command itself.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Pipe { .. } | Self::Spawn { .. } | Self::Poll { .. } | Self::Wait { .. }
        )
    }

    /// Returns true if the child had to be signalled.
    #[must_use]
    pub const fn is_escalation(&self) -> bool {
        matches!(self, Self::Interrupted { .. } | Self::Unresponsive { .. })
    }
}

/// Errors raised by the snapshot files and the data directory lock.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Data directory lock {} is held by another process", path.display())]
    Locked {
        path: PathBuf,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Top-level error type for Amoeba.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum AmoebaError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl AmoebaError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_exec(&self) -> bool {
        matches!(self, Self::Exec(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if this error is local to one cycle and the next cycle may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Exec(e) => e.is_transient(),
            Self::Validation(_) | Self::Storage(_) | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for Amoeba operations.
pub type AmoebaResult<T> = Result<T, AmoebaError>;
