//! HTTP client for the identity service's token endpoint.

use chrono::{DateTime, TimeZone, Utc};
use mailwire_core::MailProvider;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::IdentityConfig;
use crate::error::AuthError;
use crate::token::ProviderToken;

/// Token response from the identity service.
#[derive(Debug, Deserialize)]
struct TokenBody {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<ExpiresAt>,
}

/// `expires_at` arrives as seconds since epoch, but string dates are
/// also accepted and parsed.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresAt {
    Epoch(i64),
    Text(String),
}

impl ExpiresAt {
    fn resolve(self) -> Result<DateTime<Utc>, AuthError> {
        match self {
            ExpiresAt::Epoch(secs) => Utc
                .timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| AuthError::Decode {
                    reason: format!("expires_at out of range: {secs}"),
                }),
            ExpiresAt::Text(raw) => {
                if let Ok(secs) = raw.parse::<i64>() {
                    return ExpiresAt::Epoch(secs).resolve();
                }
                DateTime::parse_from_rfc3339(&raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| AuthError::Decode {
                        reason: format!("expires_at not a date: {e}"),
                    })
            }
        }
    }
}

/// Fetches provider tokens from the identity service.
///
/// The identity service owns token storage and refresh; this client only
/// exchanges the tenant bearer for the current provider credential.
#[derive(Debug, Clone)]
pub struct TokenClient {
    base_url: String,
    http: reqwest::Client,
}

impl TokenClient {
    /// Creates a client with the configured request deadline.
    pub fn new(config: IdentityConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(AuthError::Http)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Resolves the current access credential for `(bearer, provider)`.
    #[instrument(skip(self, bearer), fields(provider = %provider))]
    pub async fn fetch_token(
        &self,
        bearer: &str,
        provider: MailProvider,
    ) -> Result<ProviderToken, AuthError> {
        let url = format!("{}/accounts/{}/token", self.base_url, provider.account_slug());

        let response = self.http.get(&url).bearer_auth(bearer).send().await?;
        let status = response.status();

        if status.as_u16() == 404 {
            return Err(AuthError::NotConnected { provider });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let raw = response.text().await?;
        let body: TokenBody = serde_json::from_str(&raw).map_err(|e| AuthError::Decode {
            reason: e.to_string(),
        })?;

        let expires_at = match body.expires_at {
            Some(value) => value.resolve()?,
            // Absent expiry reads as already expired; adapters use the
            // token within the current tick regardless.
            None => DateTime::<Utc>::UNIX_EPOCH,
        };

        debug!(expires_at = %expires_at, "resolved provider token");

        Ok(ProviderToken::new(
            body.access_token,
            body.refresh_token,
            expires_at,
        ))
    }
}
