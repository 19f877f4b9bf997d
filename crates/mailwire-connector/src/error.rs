//! Adapter error taxonomy with retry classification.

use thiserror::Error;

/// Result type alias using [`ConnectorError`].
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Coarse classification consumed by the sync runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Credential rejected; the next tick re-resolves the token.
    Auth,
    /// Worth retrying on the next tick as-is.
    Transient,
    /// The provider answered with something the driver cannot interpret.
    Protocol,
    /// The sync was cancelled mid-call.
    Cancelled,
    /// The record sink (store write) failed; the page is aborted.
    Sink,
}

/// Errors raised by provider adapters.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The provider rejected the credential.
    #[error("authentication rejected by provider: {0}")]
    Auth(String),

    /// Transport-level failure (connect, timeout, TLS).
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success API response that is not an auth failure.
    #[error("provider API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Provider-side rate limiting or quota exhaustion.
    #[error("provider rate limit exceeded: {0}")]
    RateLimited(String),

    /// The response body did not have the expected shape.
    #[error("malformed provider response: {0}")]
    Protocol(String),

    /// Cancellation observed at a page boundary.
    #[error("sync cancelled")]
    Cancelled,

    /// Failure propagated from the record sink.
    #[error("record sink failed: {0}")]
    Sink(String),
}

impl ConnectorError {
    /// Classification for the runner's retry policy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectorError::Auth(_) => ErrorKind::Auth,
            ConnectorError::Transport(_) => ErrorKind::Transient,
            ConnectorError::Api { status, .. } => match status {
                408 | 429 | 500..=599 => ErrorKind::Transient,
                _ => ErrorKind::Protocol,
            },
            ConnectorError::RateLimited(_) => ErrorKind::Transient,
            ConnectorError::Protocol(_) => ErrorKind::Protocol,
            ConnectorError::Cancelled => ErrorKind::Cancelled,
            ConnectorError::Sink(_) => ErrorKind::Sink,
        }
    }

    /// True if retrying the same call later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }
}
