//! Gmail adapter: backfill, history-based incremental sync, normalization.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mailwire_connector::{ConnectorError, ConnectorResult, MailConnector, RecordSink};
use mailwire_core::{MailMessage, MailProvider};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::client::{GmailClient, GmailMessage, HistoryListResponse, MessageListResponse, Profile};

const PAGE_SIZE: u32 = 100;
const INBOX_ID: &str = "primary";

/// Gmail implementation of the adapter contract.
///
/// Cursor format: the decimal history id reported by the provider.
pub struct GmailConnector {
    client: GmailClient,
    tenant_id: String,
}

impl GmailConnector {
    pub fn new(client: GmailClient, tenant_id: impl Into<String>) -> Self {
        Self {
            client,
            tenant_id: tenant_id.into(),
        }
    }

    /// Fetches one message in metadata format, normalizes it, and hands it
    /// to the sink.
    async fn deliver_message(
        &self,
        mailbox: &str,
        message_id: &str,
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<()> {
        let url = format!(
            "{}/users/{}/messages/{}?format=metadata",
            self.client.base_url(),
            mailbox,
            message_id
        );
        let message: GmailMessage = self.client.get_json(&url).await?;
        sink.deliver(self.normalize(message)?).await
    }

    fn normalize(&self, message: GmailMessage) -> ConnectorResult<MailMessage> {
        let mut headers = BTreeMap::new();
        if let Some(payload) = message.payload {
            for header in payload.headers {
                headers.insert(header.name, header.value);
            }
        }

        let message_date = match message.internal_date.as_deref() {
            Some(raw) => {
                let millis: i64 = raw.parse().map_err(|_| {
                    ConnectorError::Protocol(format!("internalDate not a timestamp: {raw}"))
                })?;
                millis_to_utc(millis)?
            }
            None => DateTime::<Utc>::UNIX_EPOCH,
        };

        Ok(MailMessage {
            provider: MailProvider::Google,
            tenant_id: self.tenant_id.clone(),
            inbox_id: INBOX_ID.to_string(),
            provider_message_id: message.id,
            provider_thread_id: message.thread_id,
            subject: headers.get("Subject").cloned().unwrap_or_default(),
            sender: headers.get("From").cloned().unwrap_or_default(),
            to: split_addrs(headers.get("To").map(String::as_str).unwrap_or_default()),
            cc: split_addrs(headers.get("Cc").map(String::as_str).unwrap_or_default()),
            bcc: split_addrs(headers.get("Bcc").map(String::as_str).unwrap_or_default()),
            snippet: message.snippet,
            provider_labels: message.label_ids,
            headers,
            message_date,
        })
    }

    /// True when the history API refused the start id as too old.
    fn history_expired(error: &ConnectorError) -> bool {
        match error {
            ConnectorError::Api { status: 404, .. } => true,
            ConnectorError::Api { message, .. } => message.contains("historyId"),
            _ => false,
        }
    }
}

#[async_trait]
impl MailConnector for GmailConnector {
    #[instrument(skip(self, cancel, sink), fields(tenant_id = %self.tenant_id))]
    async fn backfill(
        &self,
        cancel: &CancellationToken,
        mailbox: &str,
        _cursor: &str,
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<String> {
        info!("starting gmail backfill");

        let mut page_token: Option<String> = None;
        loop {
            if cancel.is_cancelled() {
                return Err(ConnectorError::Cancelled);
            }

            let mut url = format!(
                "{}/users/{}/messages?maxResults={}&includeSpamTrash=false",
                self.client.base_url(),
                mailbox,
                PAGE_SIZE
            );
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(token);
            }

            let page: MessageListResponse = self.client.get_json(&url).await?;
            debug!(count = page.messages.len(), "processing message page");

            for reference in &page.messages {
                self.deliver_message(mailbox, &reference.id, sink).await?;
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        // The profile's current history id becomes the incremental cursor.
        let url = format!("{}/users/{}/profile", self.client.base_url(), mailbox);
        let profile: Profile = self.client.get_json(&url).await?;

        info!(cursor = %profile.history_id, "gmail backfill complete");
        Ok(profile.history_id)
    }

    #[instrument(skip(self, cancel, sink), fields(tenant_id = %self.tenant_id))]
    async fn incremental(
        &self,
        cancel: &CancellationToken,
        mailbox: &str,
        cursor: &str,
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<String> {
        if cursor.is_empty() {
            return self.backfill(cancel, mailbox, cursor, sink).await;
        }

        let start: u64 = cursor
            .parse()
            .map_err(|_| ConnectorError::Protocol(format!("invalid history cursor: {cursor}")))?;

        let mut latest = start;
        let mut seen: HashSet<String> = HashSet::new();
        let mut page_token: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(ConnectorError::Cancelled);
            }

            let mut url = format!(
                "{}/users/{}/history?startHistoryId={}&maxResults={}",
                self.client.base_url(),
                mailbox,
                start,
                PAGE_SIZE
            );
            if let Some(token) = &page_token {
                url.push_str("&pageToken=");
                url.push_str(token);
            }

            let page: HistoryListResponse = match self.client.get_json(&url).await {
                Ok(page) => page,
                Err(error) if Self::history_expired(&error) => {
                    // The provider no longer holds history this far back;
                    // rescan from scratch. Invisible to the caller.
                    info!("history id too old, falling back to backfill");
                    return self.backfill(cancel, mailbox, cursor, sink).await;
                }
                Err(error) => return Err(error),
            };

            for record in &page.history {
                if let Ok(id) = record.id.parse::<u64>() {
                    latest = latest.max(id);
                }

                for added in &record.messages_added {
                    // The same message can appear in several history
                    // records; fetch it once.
                    if !seen.insert(added.message.id.clone()) {
                        continue;
                    }
                    self.deliver_message(mailbox, &added.message.id, sink).await?;
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(latest.to_string())
    }
}

/// Splits a comma-separated address header, trimming parts and dropping
/// empty ones.
fn split_addrs(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn millis_to_utc(millis: i64) -> ConnectorResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| ConnectorError::Protocol(format!("timestamp out of range: {millis}")))
}
