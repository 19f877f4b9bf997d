//! JetStream publisher with idempotent, ack-awaited publishes.

use std::time::Duration;

use async_nats::jetstream;
use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::config::NatsConfig;
use crate::error::EventError;

/// Subject space covered by the user-events stream.
const STREAM_SUBJECTS: &str = "user.*.>";

/// Window within which the bus rejects duplicate `msg_id`s.
const DUPLICATE_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Age-based retention for the stream.
const MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Publish side of the durable bus.
///
/// Process-wide and safe for concurrent publishes. The concrete
/// implementation is [`JetStreamPublisher`]; tests substitute in-process
/// buses behind this trait.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Idempotently creates the target stream. Safe to re-run.
    async fn ensure_stream(&self) -> Result<(), EventError>;

    /// Durable publish, deduplicated by `msg_id`, returning only after
    /// the bus acknowledges.
    async fn publish(&self, subject: &str, payload: &[u8], msg_id: &str)
        -> Result<(), EventError>;
}

/// NATS JetStream implementation of [`BusPublisher`].
///
/// The underlying client reconnects on its own; publishes attempted
/// during a disconnected interval fail and surface as transient errors.
pub struct JetStreamPublisher {
    jetstream: jetstream::Context,
    config: NatsConfig,
}

impl JetStreamPublisher {
    /// Connects to the bus.
    pub async fn connect(config: NatsConfig) -> Result<Self, EventError> {
        let client =
            async_nats::connect(&config.url)
                .await
                .map_err(|e| EventError::ConnectionFailed {
                    url: config.url.clone(),
                    cause: e.to_string(),
                })?;

        info!(url = %config.url, stream = %config.stream, "bus publisher connected");

        Ok(Self {
            jetstream: jetstream::new(client),
            config,
        })
    }
}

#[async_trait]
impl BusPublisher for JetStreamPublisher {
    #[instrument(skip(self), fields(stream = %self.config.stream))]
    async fn ensure_stream(&self) -> Result<(), EventError> {
        self.jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: self.config.stream.clone(),
                subjects: vec![STREAM_SUBJECTS.to_string()],
                storage: jetstream::stream::StorageType::File,
                retention: jetstream::stream::RetentionPolicy::Limits,
                duplicate_window: DUPLICATE_WINDOW,
                max_age: MAX_AGE,
                ..Default::default()
            })
            .await
            .map_err(|e| EventError::StreamSetup {
                stream: self.config.stream.clone(),
                cause: e.to_string(),
            })?;

        Ok(())
    }

    #[instrument(skip(self, payload), fields(payload_size = payload.len()))]
    async fn publish(
        &self,
        subject: &str,
        payload: &[u8],
        msg_id: &str,
    ) -> Result<(), EventError> {
        let mut headers = async_nats::HeaderMap::new();
        headers.insert(async_nats::header::NATS_MESSAGE_ID, msg_id);

        let ack = self
            .jetstream
            .publish_with_headers(subject.to_string(), headers, payload.to_vec().into())
            .await
            .map_err(|e| EventError::PublishFailed {
                subject: subject.to_string(),
                cause: e.to_string(),
            })?;

        ack.await.map_err(|e| EventError::PublishFailed {
            subject: subject.to_string(),
            cause: e.to_string(),
        })?;

        debug!(subject, msg_id, "event published");

        Ok(())
    }
}
