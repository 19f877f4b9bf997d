//! Error types for the sync runtime.

use mailwire_auth::AuthError;
use mailwire_connector::ConnectorError;
use mailwire_core::SyncKey;
use mailwire_events::EventError;
use mailwire_store::StoreError;
use thiserror::Error;

/// Errors surfaced by runners and the worker manager.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A runner for this triple is already registered.
    #[error("sync already running for {0}")]
    AlreadyRunning(SyncKey),

    /// No runner is registered for this triple.
    #[error("no sync running for {0}")]
    NotRunning(SyncKey),

    /// Token resolution failed.
    #[error("token resolution failed: {0}")]
    Auth(#[from] AuthError),

    /// Tenant store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Bus failure.
    #[error("bus error: {0}")]
    Bus(#[from] EventError),

    /// Adapter failure.
    #[error("adapter error: {0}")]
    Connector(#[from] ConnectorError),
}

impl SyncError {
    /// True if the provider is simply not linked for the tenant.
    #[must_use]
    pub fn is_not_connected(&self) -> bool {
        matches!(self, SyncError::Auth(e) if e.is_not_connected())
    }
}
