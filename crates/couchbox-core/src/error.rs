//! Error types for couchbox-core.

use crate::bootstrap::BootstrapStep;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for couchbox-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while provisioning or using a Couchbase container.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Error from couchbox-container
    #[error("container error: {0}")]
    Container(#[from] couchbox_container::ContainerError),

    /// Management endpoint never answered 2xx within the readiness bound
    #[error("management endpoint not ready after {attempts} attempts ({elapsed:?})")]
    ReadinessTimeout {
        /// Number of readiness requests issued
        attempts: u32,
        /// Time spent waiting, log marker included
        elapsed: Duration,
    },

    /// A bootstrap call returned a non-2xx response
    #[error("provisioning step {step} failed with status {status}: {body}")]
    ProvisioningFailed {
        /// Step that failed
        step: BootstrapStep,
        /// HTTP status code
        status: u16,
        /// Response body, verbatim
        body: String,
    },

    /// A listing call returned a non-2xx response
    #[error("inspection failed with status {status}: {body}")]
    InspectionFailed {
        /// HTTP status code
        status: u16,
        /// Response body, verbatim
        body: String,
    },

    /// Client handle did not report the cluster ready in time
    #[error("cluster not ready after {0:?}")]
    ClientReadinessTimeout(Duration),

    /// Document does not exist
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// A document operation returned a non-2xx response
    #[error("document operation on {key} failed with status {status}: {body}")]
    Document {
        /// Document key
        key: String,
        /// HTTP status code
        status: u16,
        /// Response body, verbatim
        body: String,
    },

    /// Invalid lifecycle state for operation
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
