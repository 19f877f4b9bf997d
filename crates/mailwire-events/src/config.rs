//! Bus connection configuration.

use std::env;

/// Default NATS endpoint for local development.
const DEFAULT_URL: &str = "nats://localhost:4222";

/// Stream holding all user events.
pub(crate) const STREAM_NAME: &str = "USER_EVENTS";

/// Bus connection settings.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// Server URL.
    pub url: String,
    /// Stream name; overridable for test isolation.
    pub stream: String,
}

impl NatsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream: STREAM_NAME.to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `MAILWIRE_NATS_URL`: server URL (default: `nats://localhost:4222`)
    /// - `MAILWIRE_NATS_STREAM`: stream name (default: `USER_EVENTS`)
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            url: env::var("MAILWIRE_NATS_URL").unwrap_or_else(|_| DEFAULT_URL.to_string()),
            stream: env::var("MAILWIRE_NATS_STREAM").unwrap_or_else(|_| STREAM_NAME.to_string()),
        }
    }
}
