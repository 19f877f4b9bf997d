//! Gmail REST client with bearer injection and error classification.

use std::time::Duration;

use mailwire_connector::{ConnectorError, ConnectorResult};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Page of message references.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessageListResponse {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageRef {
    pub id: String,
}

/// A message in metadata format.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GmailMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    /// Millisecond internal timestamp, serialized as a decimal string.
    pub internal_date: Option<String>,
    pub payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagePayload {
    #[serde(default)]
    pub headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Profile {
    #[serde(deserialize_with = "string_or_number")]
    pub history_id: String,
}

/// Page of history records.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryListResponse {
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HistoryRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub messages_added: Vec<AddedMessage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddedMessage {
    pub message: MessageRef,
}

/// Gmail serializes uint64 ids as strings; tolerate both forms.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Value {
        Text(String),
        Number(u64),
    }

    Ok(match Value::deserialize(deserializer)? {
        Value::Text(s) => s,
        Value::Number(n) => n.to_string(),
    })
}

/// Authenticated HTTP client for the Gmail REST API.
#[derive(Debug)]
pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    access_token: SecretString,
}

impl GmailClient {
    /// Creates a client against the production endpoint.
    pub fn new(access_token: impl Into<String>) -> ConnectorResult<Self> {
        Self::with_base_url(access_token, DEFAULT_BASE_URL)
    }

    /// Creates a client against a custom endpoint.
    pub fn with_base_url(
        access_token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> ConnectorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(ConnectorError::Transport)?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: SecretString::new(access_token.into()),
        })
    }

    #[must_use]
    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET with bearer injection; non-success statuses are classified into
    /// the adapter error taxonomy.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ConnectorResult<T> {
        debug!(url, "gmail request");

        let response = self
            .http
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ConnectorError::Protocol(format!("invalid JSON body: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify(status.as_u16(), body))
    }
}

/// Maps a non-success Gmail status to the adapter taxonomy.
///
/// Gmail reports quota exhaustion both as 429 and as 403 with a
/// rate-limit reason; other 403s are permission problems.
fn classify(status: u16, body: String) -> ConnectorError {
    match status {
        401 => ConnectorError::Auth(body),
        403 if body.contains("rateLimitExceeded") || body.contains("quota") => {
            ConnectorError::RateLimited(body)
        }
        403 => ConnectorError::Auth(body),
        429 => ConnectorError::RateLimited(body),
        _ => ConnectorError::Api {
            status,
            message: body,
        },
    }
}
