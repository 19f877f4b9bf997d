//! SQLite-backed tenant store.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use mailwire_core::MailProvider;
use serde::Serialize;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, instrument};

use crate::error::StoreError;
use crate::models::{NewEvent, NewOutboxEntry, OutboxEntry, SyncState, SyncStatus};

const SCHEMA: &str = include_str!("schema.sql");

const STORE_FILE_NAME: &str = "events.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 10;

/// One tenant's isolated event store.
///
/// Cheap to clone; clones share the connection pool. A single process
/// holds at most one open store per tenant, owned by that tenant's
/// runner.
#[derive(Debug, Clone)]
pub struct TenantStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl TenantStore {
    /// Opens (creating if needed) the store for `tenant_id` under
    /// `data_root` and applies the schema idempotently.
    #[instrument(skip(data_root))]
    pub async fn open(data_root: &Path, tenant_id: &str) -> Result<Self, StoreError> {
        let dir = data_root.join(tenant_id);
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(STORE_FILE_NAME);
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(StoreError::Connection)?;

        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(StoreError::Schema)?;

        debug!(path = %path.display(), "tenant store opened");

        Ok(Self { pool, path })
    }

    /// Closes the underlying pool. Further calls fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begins a transaction for use with [`TenantStore::append_received_tx`].
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin().await?)
    }

    /// Loads the sync cursor for a provider; empty string when no row yet.
    pub async fn load_cursor(&self, provider: MailProvider) -> Result<String, StoreError> {
        let cursor: Option<Option<String>> =
            sqlx::query_scalar("SELECT cursor FROM provider_sync_state WHERE provider = ?1")
                .bind(provider.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(cursor.flatten().unwrap_or_default())
    }

    /// Loads the full sync-state row for a provider.
    pub async fn load_sync_state(
        &self,
        provider: MailProvider,
    ) -> Result<Option<SyncState>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT inbox_id, cursor, last_synced_at, status, last_error, retry_count, updated_at
            FROM provider_sync_state
            WHERE provider = ?1
            ",
        )
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.get(3);
        Ok(Some(SyncState {
            provider,
            inbox_id: row.get(0),
            cursor: row.get::<Option<String>, _>(1).unwrap_or_default(),
            last_synced_at: row.get(2),
            status: SyncStatus::from_str(&status)?,
            last_error: row.get(4),
            retry_count: row.get(5),
            updated_at: row.get(6),
        }))
    }

    /// Upserts the sync-state row, stamping `last_synced_at` and
    /// `updated_at` with the current time.
    #[instrument(skip(self, cursor))]
    pub async fn save_sync_state(
        &self,
        provider: MailProvider,
        inbox_id: &str,
        cursor: &str,
        status: SyncStatus,
    ) -> Result<(), StoreError> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r"
            INSERT INTO provider_sync_state (provider, inbox_id, cursor, last_synced_at, status, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (provider) DO UPDATE SET
                inbox_id = excluded.inbox_id,
                cursor = excluded.cursor,
                last_synced_at = excluded.last_synced_at,
                status = excluded.status,
                updated_at = excluded.updated_at
            ",
        )
        .bind(provider.as_str())
        .bind(inbox_id)
        .bind(cursor)
        .bind(now)
        .bind(status.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a status transition without disturbing the cursor.
    ///
    /// `retry_count` is incremented only when an error message is present.
    #[instrument(skip(self, error))]
    pub async fn update_status(
        &self,
        provider: MailProvider,
        status: SyncStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let message = error.unwrap_or_default();
        sqlx::query(
            r"
            UPDATE provider_sync_state
            SET status = ?1,
                last_error = ?2,
                retry_count = CASE WHEN ?2 != '' THEN retry_count + 1 ELSE retry_count END,
                updated_at = ?3
            WHERE provider = ?4
            ",
        )
        .bind(status.as_str())
        .bind(message)
        .bind(Utc::now().timestamp())
        .bind(provider.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Appends an event row and its outbox row inside the caller's
    /// transaction. This is the only write path for either table.
    ///
    /// A UNIQUE collision on `(provider, provider_message_id)` leaves the
    /// event log untouched; the outbox row is written regardless, so an
    /// earlier event whose outbox entry was lost before publication gets
    /// retried. The bus deduplicates replays by `msg_id`.
    pub async fn append_received_tx(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        event: &NewEvent<'_>,
        outbox: &NewOutboxEntry<'_>,
    ) -> Result<(), StoreError> {
        let message = event.message;
        sqlx::query(
            r"
            INSERT OR IGNORE INTO email_events
                (event_id, ingest_ts, msg_date, provider, inbox_id, tenant_id,
                 provider_message_id, provider_thread_id, subject, sender,
                 to_addrs, cc_addrs, bcc_addrs, snippet, headers_json, labels_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ",
        )
        .bind(event.event_id)
        .bind(event.ingest_ts)
        .bind(message.message_date.timestamp_millis())
        .bind(message.provider.as_str())
        .bind(&message.inbox_id)
        .bind(&message.tenant_id)
        .bind(&message.provider_message_id)
        .bind(&message.provider_thread_id)
        .bind(&message.subject)
        .bind(&message.sender)
        .bind(json(&message.to)?)
        .bind(json(&message.cc)?)
        .bind(json(&message.bcc)?)
        .bind(&message.snippet)
        .bind(json(&message.headers)?)
        .bind(json(&message.provider_labels)?)
        .execute(&mut **tx)
        .await?;

        let now = Utc::now().timestamp();
        sqlx::query(
            r"
            INSERT INTO outbox (created_ts, bus_subject, event_type, payload, msg_id, next_attempt_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(now)
        .bind(outbox.bus_subject)
        .bind(outbox.event_type)
        .bind(outbox.payload)
        .bind(outbox.msg_id)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Returns up to `limit` unpublished entries that are due, in id order.
    ///
    /// No locking: concurrency is controlled by there being a single
    /// dispatcher per store.
    pub async fn dequeue_outbox(&self, limit: i64) -> Result<Vec<OutboxEntry>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT id, bus_subject, payload, msg_id
            FROM outbox
            WHERE published_at IS NULL
              AND next_attempt_at <= ?1
            ORDER BY id
            LIMIT ?2
            ",
        )
        .bind(Utc::now().timestamp())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| OutboxEntry {
                id: row.get(0),
                bus_subject: row.get(1),
                payload: row.get(2),
                msg_id: row.get(3),
            })
            .collect())
    }

    /// Marks an outbox entry as shipped. Never reverted.
    pub async fn mark_published(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE outbox SET published_at = ?1 WHERE id = ?2")
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Schedules an outbox entry for a later attempt.
    pub async fn mark_retry(&self, id: i64, backoff: Duration) -> Result<(), StoreError> {
        let next = Utc::now().timestamp() + backoff.as_secs() as i64;
        sqlx::query(
            r"
            UPDATE outbox
            SET retries = retries + 1,
                next_attempt_at = ?1
            WHERE id = ?2
            ",
        )
        .bind(next)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt {
        reason: format!("failed to serialize column: {e}"),
    })
}
