//! Normalized message record produced by every provider adapter.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider::MailProvider;

/// Event type carried on the bus and embedded in idempotency keys.
pub const EMAIL_RECEIVED_EVENT: &str = "email.received";

/// Provider-agnostic message metadata.
///
/// Adapters map raw provider responses into this form before handing the
/// record to the sink. Bodies and attachments are never fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    pub provider: MailProvider,
    pub tenant_id: String,
    pub inbox_id: String,
    pub provider_message_id: String,
    pub provider_thread_id: String,
    pub subject: String,
    pub sender: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub snippet: String,
    /// Provider label ids, in provider order.
    pub provider_labels: Vec<String>,
    /// Header name to value, casing preserved as delivered.
    pub headers: BTreeMap<String, String>,
    /// Provider-reported receive instant, millisecond precision.
    pub message_date: DateTime<Utc>,
}

impl MailMessage {
    /// Deterministic idempotency key: stable across restarts and adapters.
    #[must_use]
    pub fn dedupe_id(&self) -> String {
        format!(
            "{}|{}|{}",
            EMAIL_RECEIVED_EVENT, self.provider, self.provider_message_id
        )
    }

    /// Bus subject the event for this message is published on.
    #[must_use]
    pub fn bus_subject(&self) -> String {
        format!("user.{}.{}", self.tenant_id, EMAIL_RECEIVED_EVENT)
    }
}
