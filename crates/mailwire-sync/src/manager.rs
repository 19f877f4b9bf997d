//! Worker manager: the process-wide registry of running syncs.

use std::collections::HashMap;
use std::sync::Arc;

use mailwire_auth::TokenClient;
use mailwire_core::SyncKey;
use mailwire_events::BusPublisher;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::RunnerConfig;
use crate::error::SyncError;
use crate::factory::ConnectorFactory;
use crate::runner::SyncRunner;

/// Owns the set of runners process-wide.
///
/// The registry map is the only shared mutable structure across runners:
/// reads take the shared lock, writes the exclusive one. The manager owns
/// no task of its own; each start schedules a detached runner task that
/// removes itself from the map when it exits.
pub struct SyncManager {
    runners: Arc<RwLock<HashMap<SyncKey, CancellationToken>>>,
    tokens: TokenClient,
    publisher: Arc<dyn BusPublisher>,
    factory: Arc<dyn ConnectorFactory>,
    config: RunnerConfig,
}

impl SyncManager {
    pub fn new(
        tokens: TokenClient,
        publisher: Arc<dyn BusPublisher>,
        factory: Arc<dyn ConnectorFactory>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            runners: Arc::new(RwLock::new(HashMap::new())),
            tokens,
            publisher,
            factory,
            config,
        }
    }

    /// Starts a sync for the triple, scheduling its runner without
    /// waiting for the first pass.
    ///
    /// The token is resolved up front so an unlinked provider surfaces
    /// here and no runner is created; the runner re-resolves its own
    /// credential every tick afterwards.
    pub async fn start(&self, key: SyncKey, bearer: &str) -> Result<(), SyncError> {
        let mut runners = self.runners.write().await;

        if runners.contains_key(&key) {
            return Err(SyncError::AlreadyRunning(key));
        }

        self.tokens.fetch_token(bearer, key.provider).await?;

        let cancel = CancellationToken::new();
        let runner = SyncRunner::new(
            key.clone(),
            bearer,
            self.tokens.clone(),
            Arc::clone(&self.factory),
            Arc::clone(&self.publisher),
            self.config.clone(),
        );

        runners.insert(key.clone(), cancel.clone());

        let registry = Arc::clone(&self.runners);
        tokio::spawn(async move {
            info!(sync = %key, "sync started");
            if let Err(err) = runner.run(cancel).await {
                error!(sync = %key, error = %err, "sync runner failed");
            }
            registry.write().await.remove(&key);
            info!(sync = %key, "sync stopped");
        });

        Ok(())
    }

    /// Cancels the triple's runner and removes it from the registry.
    pub async fn stop(&self, key: &SyncKey) -> Result<(), SyncError> {
        let mut runners = self.runners.write().await;

        match runners.remove(key) {
            Some(cancel) => {
                cancel.cancel();
                Ok(())
            }
            None => Err(SyncError::NotRunning(key.clone())),
        }
    }

    /// True if a runner is registered for the triple.
    pub async fn is_running(&self, key: &SyncKey) -> bool {
        self.runners.read().await.contains_key(key)
    }

    /// Snapshot of the currently registered triples.
    pub async fn list(&self) -> Vec<SyncKey> {
        self.runners.read().await.keys().cloned().collect()
    }

    /// Cancels every runner and clears the registry.
    pub async fn stop_all(&self) {
        let mut runners = self.runners.write().await;
        for (key, cancel) in runners.drain() {
            info!(sync = %key, "stopping sync");
            cancel.cancel();
        }
    }
}
