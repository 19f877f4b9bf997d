//! Identity-service connection configuration.

use std::env;
use std::time::Duration;

use crate::error::AuthError;

/// Default deadline for a token fetch.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Connection settings for the identity service.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Base URL, without the `/accounts/...` suffix.
    pub base_url: String,
    /// Per-request deadline.
    pub timeout: Duration,
}

impl IdentityConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `MAILWIRE_IDENTITY_URL`: identity service base URL
    ///
    /// Optional:
    /// - `MAILWIRE_IDENTITY_TIMEOUT_SECS`: request deadline (default: 10)
    pub fn from_env() -> Result<Self, AuthError> {
        let base_url = env::var("MAILWIRE_IDENTITY_URL").map_err(|_| AuthError::ConfigMissing {
            var: "MAILWIRE_IDENTITY_URL".to_string(),
        })?;

        let timeout = match env::var("MAILWIRE_IDENTITY_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw.parse().map_err(|_| AuthError::ConfigInvalid {
                    var: "MAILWIRE_IDENTITY_TIMEOUT_SECS".to_string(),
                    reason: format!("not an integer: {raw}"),
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self { base_url, timeout })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout() {
        let config = IdentityConfig::new("http://localhost:3000");
        assert_eq!(config.timeout, Duration::from_secs(10));
    }
}
