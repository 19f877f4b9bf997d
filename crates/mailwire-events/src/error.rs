//! Error types for bus publishing.

use thiserror::Error;

/// Errors that can occur while talking to the bus.
#[derive(Debug, Error)]
pub enum EventError {
    /// Failed to connect to the bus.
    #[error("connection to bus at {url} failed: {cause}")]
    ConnectionFailed { url: String, cause: String },

    /// Stream creation or lookup failed.
    #[error("failed to ensure stream {stream}: {cause}")]
    StreamSetup { stream: String, cause: String },

    /// A publish was not acknowledged.
    #[error("failed to publish to {subject}: {cause}")]
    PublishFailed { subject: String, cause: String },

    /// Event payload could not be serialized.
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventError {
    /// True if the failure is worth retrying after a backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EventError::ConnectionFailed { .. }
                | EventError::StreamSetup { .. }
                | EventError::PublishFailed { .. }
        )
    }
}
