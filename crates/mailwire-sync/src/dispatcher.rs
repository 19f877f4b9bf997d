//! Outbox dispatcher: pumps committed rows to the bus in id order.

use std::sync::Arc;

use mailwire_events::BusPublisher;
use mailwire_store::TenantStore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::error::SyncError;

/// Outcome of one dispatch cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchStats {
    /// Rows dequeued this cycle.
    pub dequeued: usize,
    /// Rows acknowledged by the bus and marked published.
    pub published: usize,
}

/// Runs one dequeue-publish-mark cycle against the store.
///
/// Rows the bus refuses are rescheduled with the configured backoff; a
/// failed row never blocks later rows in the batch.
pub async fn dispatch_pending(
    store: &TenantStore,
    publisher: &dyn BusPublisher,
    config: &RunnerConfig,
) -> Result<DispatchStats, SyncError> {
    let batch = store.dequeue_outbox(config.dispatch_batch).await?;

    let mut stats = DispatchStats {
        dequeued: batch.len(),
        published: 0,
    };

    for entry in batch {
        match publisher
            .publish(&entry.bus_subject, &entry.payload, &entry.msg_id)
            .await
        {
            Ok(()) => {
                store.mark_published(entry.id).await?;
                stats.published += 1;
            }
            Err(error) => {
                warn!(
                    target: "outbox_dispatch",
                    id = entry.id,
                    msg_id = %entry.msg_id,
                    error = %error,
                    "publish failed, scheduling retry"
                );
                store.mark_retry(entry.id, config.publish_backoff).await?;
            }
        }
    }

    if stats.dequeued > 0 {
        debug!(
            target: "outbox_dispatch",
            dequeued = stats.dequeued,
            published = stats.published,
            "dispatch cycle complete"
        );
    }

    Ok(stats)
}

/// Dispatcher loop: one cooperative task per runner, servicing that
/// runner's store only.
pub(crate) async fn run_dispatcher(
    store: TenantStore,
    publisher: Arc<dyn BusPublisher>,
    cancel: CancellationToken,
    config: RunnerConfig,
) {
    info!(target: "outbox_dispatch", "outbox dispatcher started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match dispatch_pending(&store, publisher.as_ref(), &config).await {
            Ok(stats) if stats.dequeued == 0 => {
                idle(&cancel, config.dispatch_idle).await;
            }
            Ok(_) => {
                // More rows may be ready; loop straight into the next batch.
            }
            Err(err) => {
                error!(target: "outbox_dispatch", error = %err, "dispatch cycle failed");
                idle(&cancel, config.dispatch_error_pause).await;
            }
        }
    }

    info!(target: "outbox_dispatch", "outbox dispatcher stopped");
}

async fn idle(cancel: &CancellationToken, period: std::time::Duration) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(period) => {}
    }
}
