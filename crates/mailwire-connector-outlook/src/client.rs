//! Microsoft Graph HTTP client with pagination envelopes and error
//! classification.

use std::time::Duration;

use mailwire_connector::{ConnectorError, ConnectorResult};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `OData` error response from Microsoft Graph.
#[derive(Debug, Deserialize)]
struct ODataError {
    error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
struct ODataErrorBody {
    code: String,
    message: String,
}

/// Response wrapper for paginated Graph API responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ODataResponse<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
    #[serde(rename = "@odata.deltaLink")]
    pub delta_link: Option<String>,
}

/// A message as selected from the delta endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphMessage {
    pub id: String,
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub subject: String,
    pub from: Option<Recipient>,
    #[serde(default)]
    pub to_recipients: Vec<Recipient>,
    #[serde(default)]
    pub cc_recipients: Vec<Recipient>,
    #[serde(default)]
    pub bcc_recipients: Vec<Recipient>,
    #[serde(default)]
    pub body_preview: String,
    pub received_date_time: Option<String>,
    #[serde(default)]
    pub internet_message_headers: Vec<InternetMessageHeader>,
    /// Delta tombstone marker; present for removed items.
    #[serde(rename = "@removed")]
    pub removed: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Recipient {
    pub email_address: Option<EmailAddress>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmailAddress {
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InternetMessageHeader {
    pub name: String,
    pub value: String,
}

/// Authenticated HTTP client for the Microsoft Graph API.
#[derive(Debug)]
pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    access_token: SecretString,
}

impl GraphClient {
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
    /// the adapter error taxonomy, keeping the `OData` error code visible.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ConnectorResult<T> {
        debug!(url, "graph request");

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
        Err(classify(status.as_u16(), &body))
    }
}

fn classify(status: u16, body: &str) -> ConnectorError {
    let message = match serde_json::from_str::<ODataError>(body) {
        Ok(odata) => format!("{}: {}", odata.error.code, odata.error.message),
        Err(_) => body.to_string(),
    };

    match status {
        401 | 403 => ConnectorError::Auth(message),
        429 => ConnectorError::RateLimited(message),
        _ => ConnectorError::Api { status, message },
    }
}
