//! Event processor: the record sink that makes ingestion durable.

use async_trait::async_trait;
use chrono::Utc;
use mailwire_connector::{ConnectorError, ConnectorResult, RecordSink};
use mailwire_core::{MailMessage, EMAIL_RECEIVED_EVENT};
use mailwire_events::MailReceivedEvent;
use mailwire_store::{NewEvent, NewOutboxEntry, StoreError, TenantStore};
use tracing::debug;
use uuid::Uuid;

/// Persists each normalized record as an event row plus outbox row in a
/// single transaction.
///
/// Duplicate messages leave the event log untouched but still enqueue an
/// outbox row; the bus's deduplication window collapses the replay. A
/// store failure aborts the adapter's current page.
pub struct EventProcessor {
    store: TenantStore,
}

impl EventProcessor {
    pub fn new(store: TenantStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RecordSink for EventProcessor {
    async fn deliver(&mut self, message: MailMessage) -> ConnectorResult<()> {
        let event_id = Uuid::new_v4().to_string();
        let ingest_ts = Utc::now().timestamp();

        let event = MailReceivedEvent::from_message(&event_id, ingest_ts, &message);
        let payload = event
            .to_bytes()
            .map_err(|e| ConnectorError::Sink(e.to_string()))?;

        let msg_id = message.dedupe_id();
        let bus_subject = message.bus_subject();

        let mut tx = self.store.begin().await.map_err(sink_error)?;
        self.store
            .append_received_tx(
                &mut tx,
                &NewEvent {
                    event_id: &event_id,
                    ingest_ts,
                    message: &message,
                },
                &NewOutboxEntry {
                    bus_subject: &bus_subject,
                    event_type: EMAIL_RECEIVED_EVENT,
                    payload: &payload,
                    msg_id: &msg_id,
                },
            )
            .await
            .map_err(sink_error)?;
        tx.commit()
            .await
            .map_err(|e| ConnectorError::Sink(e.to_string()))?;

        debug!(msg_id, "record appended");

        Ok(())
    }
}

fn sink_error(error: StoreError) -> ConnectorError {
    ConnectorError::Sink(error.to_string())
}
