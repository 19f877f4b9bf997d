//! Row types for the tenant store.

use std::fmt;
use std::str::FromStr;

use mailwire_core::{MailMessage, MailProvider};

use crate::error::StoreError;

/// Lifecycle state of a per-provider sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Row exists but no pass has started.
    Init,
    /// A backfill or incremental pass is in flight.
    Syncing,
    /// Steady state: cursor is current, ticking incrementally.
    Hooked,
    /// Operator-paused; the runner does not write this state itself.
    Paused,
    /// Last tick failed; cursor kept at the last good value.
    Error,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Syncing => "SYNCING",
            Self::Hooked => "HOOKED",
            Self::Paused => "PAUSED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(Self::Init),
            "SYNCING" => Ok(Self::Syncing),
            "HOOKED" => Ok(Self::Hooked),
            "PAUSED" => Ok(Self::Paused),
            "ERROR" => Ok(Self::Error),
            other => Err(StoreError::Corrupt {
                reason: format!("unknown sync status: {other}"),
            }),
        }
    }
}

/// One provider's sync-state row.
#[derive(Debug, Clone)]
pub struct SyncState {
    pub provider: MailProvider,
    pub inbox_id: String,
    pub cursor: String,
    pub last_synced_at: Option<i64>,
    pub status: SyncStatus,
    pub last_error: Option<String>,
    pub retry_count: i64,
    pub updated_at: Option<i64>,
}

/// Event row to append, alongside its outbox entry, in one transaction.
#[derive(Debug)]
pub struct NewEvent<'a> {
    pub event_id: &'a str,
    pub ingest_ts: i64,
    pub message: &'a MailMessage,
}

/// Outbox row to append.
#[derive(Debug)]
pub struct NewOutboxEntry<'a> {
    pub bus_subject: &'a str,
    pub event_type: &'a str,
    pub payload: &'a [u8],
    pub msg_id: &'a str,
}

/// A dequeued outbox row, ready for publication.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: i64,
    pub bus_subject: String,
    pub payload: Vec<u8>,
    pub msg_id: String,
}
