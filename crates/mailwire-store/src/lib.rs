//! # mailwire-store
//!
//! Tenant-private, crash-consistent storage for the ingestion core. Each
//! tenant owns a single WAL-journaled SQLite file holding three tables:
//! per-provider sync state, the deduplicated event log, and the
//! transactional outbox. `append_received_tx` is the only write path for
//! event and outbox rows; everything else reads or updates in place.

mod error;
mod models;
mod store;

pub use error::StoreError;
pub use models::{NewEvent, NewOutboxEntry, OutboxEntry, SyncState, SyncStatus};
pub use store::TenantStore;
