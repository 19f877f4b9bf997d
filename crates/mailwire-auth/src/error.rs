//! Error types for identity-service interactions.

use mailwire_core::MailProvider;
use thiserror::Error;

/// Errors raised while resolving a provider token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Required configuration variable is missing.
    #[error("configuration missing: {var}")]
    ConfigMissing { var: String },

    /// Configuration value is invalid.
    #[error("configuration invalid for {var}: {reason}")]
    ConfigInvalid { var: String, reason: String },

    /// The identity service reports the provider is not linked to this tenant.
    #[error("no {provider} account connected for this tenant")]
    NotConnected { provider: MailProvider },

    /// The identity service answered with an unexpected status.
    #[error("identity service returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Transport-level failure talking to the identity service.
    #[error("identity request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The token response could not be decoded.
    #[error("failed to decode token response: {reason}")]
    Decode { reason: String },
}

impl AuthError {
    /// True if the failure is worth retrying on a later cycle.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Status { .. } | AuthError::Http(_))
    }

    /// True if the provider is simply not linked for the tenant.
    #[must_use]
    pub fn is_not_connected(&self) -> bool {
        matches!(self, AuthError::NotConnected { .. })
    }
}
