//! Wire form of the mail-received event.

use std::collections::BTreeMap;

use mailwire_core::{MailMessage, MailProvider};
use serde::{Deserialize, Serialize};

use crate::error::EventError;

/// The event shipped on the bus for every ingested message.
///
/// Self-describing: downstream consumers can parse it without consulting
/// the tenant store. Field order is fixed by this definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailReceivedEvent {
    pub event_id: String,
    /// Ingest instant, unix seconds.
    pub ts: i64,
    /// Provider-reported receive instant, unix milliseconds.
    pub msg_date: i64,
    pub provider: MailProvider,
    pub inbox_id: String,
    pub tenant_id: String,
    pub provider_message_id: String,
    pub provider_thread_id: String,
    pub subject: String,
    pub sender: String,
    pub to_addrs: Vec<String>,
    pub cc_addrs: Vec<String>,
    pub bcc_addrs: Vec<String>,
    pub snippet: String,
    pub headers: BTreeMap<String, String>,
    pub labels: Vec<String>,
}

impl MailReceivedEvent {
    /// Builds the event for a normalized message.
    #[must_use]
    pub fn from_message(event_id: impl Into<String>, ingest_ts: i64, message: &MailMessage) -> Self {
        Self {
            event_id: event_id.into(),
            ts: ingest_ts,
            msg_date: message.message_date.timestamp_millis(),
            provider: message.provider,
            inbox_id: message.inbox_id.clone(),
            tenant_id: message.tenant_id.clone(),
            provider_message_id: message.provider_message_id.clone(),
            provider_thread_id: message.provider_thread_id.clone(),
            subject: message.subject.clone(),
            sender: message.sender.clone(),
            to_addrs: message.to.clone(),
            cc_addrs: message.cc.clone(),
            bcc_addrs: message.bcc.clone(),
            snippet: message.snippet.clone(),
            headers: message.headers.clone(),
            labels: message.provider_labels.clone(),
        }
    }

    /// Serializes the event to its wire bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EventError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses an event from wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EventError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message() -> MailMessage {
        let mut headers = BTreeMap::new();
        headers.insert("Message-Id".to_string(), "<m1@x>".to_string());
        MailMessage {
            provider: MailProvider::Google,
            tenant_id: "u1".into(),
            inbox_id: "primary".into(),
            provider_message_id: "m1".into(),
            provider_thread_id: "t1".into(),
            subject: "hi".into(),
            sender: "a@x".into(),
            to: vec!["b@x".into(), "c@x".into()],
            cc: vec![],
            bcc: vec![],
            snippet: "hello".into(),
            provider_labels: vec!["INBOX".into()],
            headers,
            message_date: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
        }
    }

    #[test]
    fn test_event_carries_millisecond_date() {
        let event = MailReceivedEvent::from_message("e1", 1_700_000_100, &message());
        assert_eq!(event.msg_date, 1_700_000_000_123);
        assert_eq!(event.ts, 1_700_000_100);
    }

    #[test]
    fn test_wire_round_trip() {
        let event = MailReceivedEvent::from_message("e1", 1_700_000_100, &message());
        let bytes = event.to_bytes().unwrap();
        let back = MailReceivedEvent::from_bytes(&bytes).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_wire_form_is_self_describing() {
        let event = MailReceivedEvent::from_message("e1", 1_700_000_100, &message());
        let value: serde_json::Value = serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(value["provider"], "GOOGLE");
        assert_eq!(value["tenant_id"], "u1");
        assert_eq!(value["to_addrs"][1], "c@x");
        assert_eq!(value["headers"]["Message-Id"], "<m1@x>");
    }
}
