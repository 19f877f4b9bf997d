//! Sync runner: drives one `(tenant, inbox, provider)` triple.

use std::sync::Arc;

use mailwire_auth::TokenClient;
use mailwire_connector::{ErrorKind, MailConnector};
use mailwire_core::SyncKey;
use mailwire_events::BusPublisher;
use mailwire_store::{SyncStatus, TenantStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::RunnerConfig;
use crate::dispatcher::run_dispatcher;
use crate::error::SyncError;
use crate::factory::ConnectorFactory;
use crate::processor::EventProcessor;

/// Mailbox reference passed to adapters: the authenticated principal.
const MAILBOX: &str = "me";

/// Owns one sync triple for the lifetime of its cancellation token.
///
/// On start it opens the tenant store, ensures the bus stream, spawns the
/// outbox dispatcher, performs the first pass (backfill or incremental by
/// cursor emptiness), and then ticks incrementally until cancelled. Every
/// tick resolves a fresh credential, so rotations at the identity service
/// propagate within one tick. Tick failures are recorded in the
/// sync-state row and retried on the next tick; they never kill the
/// runner.
pub struct SyncRunner {
    key: SyncKey,
    bearer: String,
    tokens: TokenClient,
    factory: Arc<dyn ConnectorFactory>,
    publisher: Arc<dyn BusPublisher>,
    config: RunnerConfig,
}

impl SyncRunner {
    pub fn new(
        key: SyncKey,
        bearer: impl Into<String>,
        tokens: TokenClient,
        factory: Arc<dyn ConnectorFactory>,
        publisher: Arc<dyn BusPublisher>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            key,
            bearer: bearer.into(),
            tokens,
            factory,
            publisher,
            config,
        }
    }

    /// Runs until the token is cancelled.
    ///
    /// Returns an error only when setup fails (store open, stream
    /// creation); from then on failures surface through the sync-state
    /// row.
    #[instrument(skip_all, fields(sync = %self.key))]
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SyncError> {
        let store = TenantStore::open(&self.config.data_root, &self.key.tenant_id).await?;
        self.publisher.ensure_stream().await?;

        let dispatcher_cancel = cancel.child_token();
        let dispatcher = tokio::spawn(run_dispatcher(
            store.clone(),
            Arc::clone(&self.publisher),
            dispatcher_cancel.clone(),
            self.config.clone(),
        ));

        self.sync_loop(&store, &cancel).await;

        // Runner is going away regardless of why; take the dispatcher and
        // the store with it.
        dispatcher_cancel.cancel();
        let _ = dispatcher.await;
        store.close().await;

        Ok(())
    }

    async fn sync_loop(&self, store: &TenantStore, cancel: &CancellationToken) {
        self.run_tick(store, cancel, true).await;

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first interval tick fires immediately; the first pass above
        // already covered it.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("sync loop shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.run_tick(store, cancel, false).await;
                }
            }
        }
    }

    /// One synchronous pass. Ticks never overlap: the caller awaits each
    /// pass before the next interval fire.
    async fn run_tick(&self, store: &TenantStore, cancel: &CancellationToken, first_pass: bool) {
        let provider = self.key.provider;

        let previous = match store.load_cursor(provider).await {
            Ok(cursor) => cursor,
            Err(error) => {
                warn!(error = %error, "failed to load cursor, skipping tick");
                return;
            }
        };

        // Steady state never backfills: an empty cursor means the first
        // pass has not succeeded yet.
        if !first_pass && previous.is_empty() {
            return;
        }

        if first_pass {
            if let Err(error) = store
                .save_sync_state(provider, &self.key.inbox_id, &previous, SyncStatus::Syncing)
                .await
            {
                warn!(error = %error, "failed to record syncing state");
            }
        }

        let connector = match self.fresh_connector().await {
            Ok(connector) => connector,
            Err(error) => {
                warn!(error = %error, "credential resolution failed");
                let _ = store
                    .update_status(provider, SyncStatus::Error, Some(&error.to_string()))
                    .await;
                return;
            }
        };

        let mut sink = EventProcessor::new(store.clone());
        let outcome = if previous.is_empty() {
            connector.backfill(cancel, MAILBOX, &previous, &mut sink).await
        } else {
            connector
                .incremental(cancel, MAILBOX, &previous, &mut sink)
                .await
        };

        match outcome {
            Err(error) if error.kind() == ErrorKind::Cancelled => {
                // Shutting down; the cursor stays at the last good value.
            }
            Err(error) => {
                warn!(error = %error, kind = ?error.kind(), "tick failed");
                let _ = store
                    .update_status(provider, SyncStatus::Error, Some(&error.to_string()))
                    .await;
            }
            Ok(next) => {
                if cancel.is_cancelled() {
                    // Cancel arrived mid-tick: do not commit the advance.
                    return;
                }

                if next.is_empty() && !previous.is_empty() {
                    // An empty cursor after a non-empty one would discard
                    // the checkpoint; refuse it.
                    warn!("adapter returned empty cursor, keeping previous");
                    let _ = store
                        .update_status(
                            provider,
                            SyncStatus::Error,
                            Some("adapter returned empty cursor"),
                        )
                        .await;
                    return;
                }

                if next != previous {
                    info!(cursor = %next, "cursor advanced");
                }
                if let Err(error) = store
                    .save_sync_state(provider, &self.key.inbox_id, &next, SyncStatus::Hooked)
                    .await
                {
                    warn!(error = %error, "failed to persist cursor");
                }
            }
        }
    }

    /// Resolves a fresh credential and builds the cycle's driver.
    async fn fresh_connector(&self) -> Result<Arc<dyn MailConnector>, SyncError> {
        let token = self
            .tokens
            .fetch_token(&self.bearer, self.key.provider)
            .await?;
        let connector = self
            .factory
            .create(self.key.provider, &token, &self.key.tenant_id)
            .await?;
        Ok(connector)
    }
}
