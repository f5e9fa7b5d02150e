//! Error types for couchbox-container.

use thiserror::Error;

/// Result type alias for couchbox-container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Errors that can occur during container operations.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failure reported by the container runtime
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Log marker did not show up in time
    #[error("log marker {marker:?} not seen within {timeout:?}")]
    LogTimeout {
        /// Text that was waited for
        marker: String,
        /// How long we waited
        timeout: std::time::Duration,
    },

    /// Log stream ended before the marker showed up
    #[error("log stream closed before marker {marker:?} was seen")]
    LogStreamClosed {
        /// Text that was waited for
        marker: String,
    },

    /// Container is not in expected state
    #[error("invalid container state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
