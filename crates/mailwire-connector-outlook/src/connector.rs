//! Graph adapter: delta-query sync and normalization.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailwire_connector::{ConnectorError, ConnectorResult, MailConnector, RecordSink};
use mailwire_core::{MailMessage, MailProvider};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::client::{GraphClient, GraphMessage, ODataResponse, Recipient};

const PAGE_SIZE: u32 = 100;
const INBOX_ID: &str = "inbox";

/// Fields selected from the delta endpoint.
const SELECT_FIELDS: &str = "id,conversationId,subject,from,toRecipients,ccRecipients,\
    bccRecipients,bodyPreview,receivedDateTime,internetMessageHeaders";

/// Microsoft Graph implementation of the adapter contract.
///
/// Cursor format: the `@odata.deltaLink` URL returned by the provider.
pub struct OutlookConnector {
    client: GraphClient,
    tenant_id: String,
}

impl OutlookConnector {
    pub fn new(client: GraphClient, tenant_id: impl Into<String>) -> Self {
        Self {
            client,
            tenant_id: tenant_id.into(),
        }
    }

    fn mailbox_path(mailbox: &str) -> String {
        if mailbox == "me" {
            "/me".to_string()
        } else {
            format!("/users/{mailbox}")
        }
    }

    fn delta_start_url(&self, mailbox: &str) -> String {
        format!(
            "{}{}/mailFolders/inbox/messages/delta?$select={}&$top={}",
            self.client.base_url(),
            Self::mailbox_path(mailbox),
            SELECT_FIELDS,
            PAGE_SIZE
        )
    }

    /// Walks delta pages from `url`, delivering each message, and returns
    /// the delta link the enumeration ends with.
    async fn drain_delta(
        &self,
        cancel: &CancellationToken,
        url: String,
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<String> {
        let mut url = url;

        loop {
            if cancel.is_cancelled() {
                return Err(ConnectorError::Cancelled);
            }

            let page: ODataResponse<GraphMessage> = self.client.get_json(&url).await?;
            debug!(count = page.value.len(), "processing delta page");

            for message in page.value {
                if message.removed.is_some() {
                    // Deletions are tombstones in the delta feed; the core
                    // only ingests received messages.
                    continue;
                }
                sink.deliver(self.normalize(message)?).await?;
            }

            if let Some(next) = page.next_link {
                url = next;
            } else {
                return page.delta_link.ok_or_else(|| {
                    ConnectorError::Protocol("delta enumeration ended without delta link".into())
                });
            }
        }
    }

    fn normalize(&self, message: GraphMessage) -> ConnectorResult<MailMessage> {
        let mut headers = BTreeMap::new();
        for header in message.internet_message_headers {
            headers.insert(header.name, header.value);
        }

        let message_date = match message.received_date_time.as_deref() {
            Some(raw) => parse_graph_date(raw)?,
            None => DateTime::<Utc>::UNIX_EPOCH,
        };

        Ok(MailMessage {
            provider: MailProvider::Microsoft,
            tenant_id: self.tenant_id.clone(),
            inbox_id: INBOX_ID.to_string(),
            provider_message_id: message.id,
            provider_thread_id: message.conversation_id,
            subject: message.subject,
            sender: message
                .from
                .as_ref()
                .and_then(recipient_address)
                .unwrap_or_default(),
            to: flatten_recipients(&message.to_recipients),
            cc: flatten_recipients(&message.cc_recipients),
            bcc: flatten_recipients(&message.bcc_recipients),
            snippet: message.body_preview,
            provider_labels: Vec::new(),
            headers,
            message_date,
        })
    }

    /// True when the provider discarded the sync state behind the cursor.
    fn delta_expired(error: &ConnectorError) -> bool {
        match error {
            ConnectorError::Api { status: 410, .. } => true,
            ConnectorError::Api { message, .. } => {
                message.contains("resyncRequired") || message.contains("SyncStateNotFound")
            }
            _ => false,
        }
    }
}

#[async_trait]
impl MailConnector for OutlookConnector {
    #[instrument(skip(self, cancel, sink), fields(tenant_id = %self.tenant_id))]
    async fn backfill(
        &self,
        cancel: &CancellationToken,
        mailbox: &str,
        _cursor: &str,
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<String> {
        info!("starting graph delta backfill");
        let cursor = self
            .drain_delta(cancel, self.delta_start_url(mailbox), sink)
            .await?;
        info!("graph backfill complete");
        Ok(cursor)
    }

    #[instrument(skip(self, cancel, cursor, sink), fields(tenant_id = %self.tenant_id))]
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

        match self.drain_delta(cancel, cursor.to_string(), sink).await {
            Ok(next) => Ok(next),
            Err(error) if Self::delta_expired(&error) => {
                // Sync state is gone on the provider side; rescan from
                // scratch. Invisible to the caller.
                info!("delta token expired, falling back to backfill");
                self.backfill(cancel, mailbox, cursor, sink).await
            }
            Err(error) => Err(error),
        }
    }
}

fn recipient_address(recipient: &Recipient) -> Option<String> {
    recipient.email_address.as_ref()?.address.clone()
}

/// Flattens recipients to bare address strings, preserving order.
fn flatten_recipients(recipients: &[Recipient]) -> Vec<String> {
    recipients.iter().filter_map(recipient_address).collect()
}

fn parse_graph_date(raw: &str) -> ConnectorResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ConnectorError::Protocol(format!("receivedDateTime not a date: {e}")))
}
