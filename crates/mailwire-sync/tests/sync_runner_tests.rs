//! End-to-end scenarios for the sync runner and its dispatcher.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    fast_config, google_message, mount_token_endpoint, token_client_for, Exhausted, FixedFactory,
    MemoryBus, ScriptedConnector, TickScript,
};
use mailwire_core::{MailProvider, SyncKey};
use mailwire_events::BusPublisher;
use mailwire_store::{SyncStatus, TenantStore};
use mailwire_sync::{dispatch_pending, EventProcessor, RunnerConfig, SyncError, SyncRunner};
use mailwire_connector::RecordSink;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

struct Harness {
    identity: MockServer,
    bus: Arc<MemoryBus>,
    connector: Arc<ScriptedConnector>,
    config: RunnerConfig,
    tmp: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let identity = MockServer::start().await;
        mount_token_endpoint(&identity).await;
        let tmp = TempDir::new().unwrap();
        let config = fast_config(tmp.path());
        Self {
            identity,
            bus: Arc::new(MemoryBus::default()),
            connector: ScriptedConnector::new(),
            config,
            tmp,
        }
    }

    fn runner(&self, key: SyncKey) -> SyncRunner {
        SyncRunner::new(
            key,
            "tenant-bearer",
            token_client_for(&self.identity),
            Arc::new(FixedFactory(Arc::clone(&self.connector))),
            Arc::clone(&self.bus) as Arc<dyn BusPublisher>,
            self.config.clone(),
        )
    }

    async fn store(&self, tenant: &str) -> TenantStore {
        TenantStore::open(self.tmp.path(), tenant).await.unwrap()
    }
}

async fn count(store: &TenantStore, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(store.pool())
        .await
        .unwrap()
}

/// Gmail cold start: backfill two messages, hook onto the cursor.
#[tokio::test]
async fn test_cold_start_backfills_and_hooks() {
    let h = Harness::new().await;
    h.connector.push_backfill(TickScript::Deliver {
        records: vec![
            google_message("u1", "m1", "t1", "hi", "a@x"),
            google_message("u1", "m2", "t1", "re: hi", "b@x"),
        ],
        cursor: "12345".into(),
    });

    let key = SyncKey::new("u1", "primary", MailProvider::Google);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(h.runner(key).run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(400)).await;

    let store = h.store("u1").await;
    assert_eq!(count(&store, "email_events").await, 2);
    assert_eq!(count(&store, "outbox").await, 2);

    let state = store
        .load_sync_state(MailProvider::Google)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.cursor, "12345");
    assert_eq!(state.status, SyncStatus::Hooked);
    assert_eq!(state.inbox_id, "primary");

    assert_eq!(h.bus.delivery_count(), 2);
    assert_eq!(
        h.bus.delivered_msg_ids(),
        vec!["email.received|GOOGLE|m1", "email.received|GOOGLE|m2"]
    );
    assert!(h
        .bus
        .delivered_subjects()
        .iter()
        .all(|s| s == "user.u1.email.received"));

    cancel.cancel();
    task.await.unwrap().unwrap();
}

/// Replaying the same records gains outbox rows but no new events
/// and no duplicate bus deliveries.
#[tokio::test]
async fn test_idempotent_reingest() {
    let h = Harness::new().await;
    let records = vec![
        google_message("u1", "m1", "t1", "hi", "a@x"),
        google_message("u1", "m2", "t1", "re: hi", "b@x"),
    ];
    h.connector.push_backfill(TickScript::Deliver {
        records: records.clone(),
        cursor: "12345".into(),
    });
    h.connector.push_incremental(TickScript::Deliver {
        records,
        cursor: "12346".into(),
    });

    let key = SyncKey::new("u1", "primary", MailProvider::Google);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(h.runner(key).run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(500)).await;

    let store = h.store("u1").await;
    assert_eq!(count(&store, "email_events").await, 2);
    assert_eq!(count(&store, "outbox").await, 4);

    // Replays were published but the deduplication window absorbed them.
    assert_eq!(h.bus.delivery_count(), 2);
    assert!(h.bus.publish_count() >= 2);

    let state = store
        .load_sync_state(MailProvider::Google)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.cursor, "12346");

    cancel.cancel();
    task.await.unwrap().unwrap();
}

/// Cursor monotonicity: a failing tick keeps the last good cursor; the
/// next success advances it.
#[tokio::test]
async fn test_failing_tick_keeps_cursor_then_recovers() {
    let h = Harness::new().await;
    h.connector.push_backfill(TickScript::Deliver {
        records: vec![],
        cursor: "100".into(),
    });
    h.connector
        .push_incremental(TickScript::Fail(mailwire_connector::ConnectorError::Api {
            status: 503,
            message: "upstream busy".into(),
        }));
    h.connector.push_incremental(TickScript::Deliver {
        records: vec![],
        cursor: "200".into(),
    });

    let key = SyncKey::new("u1", "primary", MailProvider::Google);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(h.runner(key).run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(500)).await;

    let store = h.store("u1").await;
    let state = store
        .load_sync_state(MailProvider::Google)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.cursor, "200");
    assert_eq!(state.status, SyncStatus::Hooked);
    // The failed tick was recorded on its way through.
    assert!(state.retry_count >= 1);
    assert_eq!(state.last_error.as_deref(), Some("provider API error 503: upstream busy"));

    cancel.cancel();
    task.await.unwrap().unwrap();
}

/// An adapter returning an empty cursor after a non-empty one is refused:
/// the checkpoint is kept and the tick reads as an error.
#[tokio::test]
async fn test_empty_cursor_regression_is_refused() {
    let h = Harness::new().await;
    h.connector.push_backfill(TickScript::Deliver {
        records: vec![],
        cursor: "100".into(),
    });
    h.connector.push_incremental(TickScript::Deliver {
        records: vec![],
        cursor: String::new(),
    });
    // Keep later ticks failing so the refused tick's state stays visible.
    h.connector.set_exhausted(Exhausted::Fail);

    let key = SyncKey::new("u1", "primary", MailProvider::Google);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(h.runner(key).run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(400)).await;

    let store = h.store("u1").await;
    let state = store
        .load_sync_state(MailProvider::Google)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.cursor, "100");
    assert_eq!(state.status, SyncStatus::Error);

    cancel.cancel();
    task.await.unwrap().unwrap();
}

/// A cancel mid-tick keeps every committed pair and never commits
/// the cursor advance.
#[tokio::test]
async fn test_mid_tick_cancel_preserves_committed_work() {
    let h = Harness::new().await;
    let records: Vec<_> = (0..4)
        .map(|i| google_message("u1", &format!("m{i}"), "t1", "subj", "a@x"))
        .collect();
    h.connector
        .push_backfill(TickScript::CancelAfter { records });

    let key = SyncKey::new("u1", "primary", MailProvider::Google);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(h.runner(key).run(cancel.clone()));

    // The scripted adapter cancels the runner itself; it must exit within
    // a short bounded delay.
    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("runner did not exit after cancel")
        .unwrap();
    result.unwrap();

    let store = h.store("u1").await;
    assert_eq!(count(&store, "email_events").await, 4);
    assert_eq!(count(&store, "outbox").await, 4);

    let state = store
        .load_sync_state(MailProvider::Google)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.cursor, "");
    assert_eq!(state.status, SyncStatus::Syncing);
}

/// A refusing publisher defers every row with one retry; recovery
/// ships them all.
#[tokio::test]
async fn test_publisher_offline_then_recovery() {
    let tmp = TempDir::new().unwrap();
    let store = TenantStore::open(tmp.path(), "u1").await.unwrap();
    let config = RunnerConfig::new(tmp.path());
    let bus = MemoryBus::default();

    let mut processor = EventProcessor::new(store.clone());
    for i in 0..3 {
        processor
            .deliver(google_message("u1", &format!("m{i}"), "t1", "subj", "a@x"))
            .await
            .unwrap();
    }

    bus.set_failing(true);
    let stats = dispatch_pending(&store, &bus, &config).await.unwrap();
    assert_eq!(stats.dequeued, 3);
    assert_eq!(stats.published, 0);

    // Every row deferred ten seconds out with one recorded retry.
    let rows: Vec<(i64, i64)> =
        sqlx::query_as("SELECT retries, next_attempt_at FROM outbox ORDER BY id")
            .fetch_all(store.pool())
            .await
            .unwrap();
    let now = chrono::Utc::now().timestamp();
    for (retries, next_attempt_at) in rows {
        assert_eq!(retries, 1);
        assert!(next_attempt_at >= now + 8 && next_attempt_at <= now + 12);
    }

    // Event log and sync state untouched by the outage.
    let events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM email_events")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(events, 3);

    // Nothing is eligible while deferred.
    let stats = dispatch_pending(&store, &bus, &config).await.unwrap();
    assert_eq!(stats.dequeued, 0);

    // Recovery: make the rows due again and the bus healthy.
    bus.set_failing(false);
    sqlx::query("UPDATE outbox SET next_attempt_at = 0")
        .execute(store.pool())
        .await
        .unwrap();

    let stats = dispatch_pending(&store, &bus, &config).await.unwrap();
    assert_eq!(stats.dequeued, 3);
    assert_eq!(stats.published, 3);
    assert_eq!(bus.delivery_count(), 3);
}

/// Dispatcher progress: n ready rows drain within ceil(n / batch) cycles.
#[tokio::test]
async fn test_dispatcher_progress_bound() {
    let tmp = TempDir::new().unwrap();
    let store = TenantStore::open(tmp.path(), "u1").await.unwrap();
    let config = RunnerConfig::new(tmp.path());
    let bus = MemoryBus::default();

    let mut processor = EventProcessor::new(store.clone());
    for i in 0..250 {
        processor
            .deliver(google_message("u1", &format!("m{i}"), "t1", "subj", "a@x"))
            .await
            .unwrap();
    }

    let mut published = 0;
    for _ in 0..3 {
        published += dispatch_pending(&store, &bus, &config).await.unwrap().published;
    }
    assert_eq!(published, 250);

    let stats = dispatch_pending(&store, &bus, &config).await.unwrap();
    assert_eq!(stats.dequeued, 0);
}

/// Per-triple FIFO: deliveries observe outbox id order.
#[tokio::test]
async fn test_dispatch_preserves_insertion_order() {
    let tmp = TempDir::new().unwrap();
    let store = TenantStore::open(tmp.path(), "u1").await.unwrap();
    let config = RunnerConfig::new(tmp.path());
    let bus = MemoryBus::default();

    let mut processor = EventProcessor::new(store.clone());
    for i in 0..5 {
        processor
            .deliver(google_message("u1", &format!("m{i}"), "t1", "subj", "a@x"))
            .await
            .unwrap();
    }

    dispatch_pending(&store, &bus, &config).await.unwrap();

    let expected: Vec<String> = (0..5)
        .map(|i| format!("email.received|GOOGLE|m{i}"))
        .collect();
    assert_eq!(bus.delivered_msg_ids(), expected);
}

/// A stale Gmail cursor falls back to backfill inside the driver;
/// the runner only observes the fresh cursor.
#[tokio::test]
async fn test_stale_gmail_cursor_recovers_through_backfill() {
    use async_trait::async_trait;
    use mailwire_auth::ProviderToken;
    use mailwire_connector::{ConnectorResult, MailConnector};
    use mailwire_connector_gmail::{GmailClient, GmailConnector};
    use mailwire_sync::ConnectorFactory;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    struct GmailTestFactory {
        base_url: String,
    }

    #[async_trait]
    impl ConnectorFactory for GmailTestFactory {
        async fn create(
            &self,
            _provider: MailProvider,
            token: &ProviderToken,
            tenant_id: &str,
        ) -> ConnectorResult<Arc<dyn MailConnector>> {
            Ok(Arc::new(GmailConnector::new(
                GmailClient::with_base_url(token.access_token(), &self.base_url)?,
                tenant_id,
            )))
        }
    }

    let identity = MockServer::start().await;
    mount_token_endpoint(&identity).await;

    let gmail = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/me/history"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Invalid historyId"))
        .mount(&gmail)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "messages": [{"id": "m1"}],
        })))
        .mount(&gmail)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages/m1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "m1",
            "threadId": "t1",
            "internalDate": "1700000000123",
            "payload": {"headers": [{"name": "Subject", "value": "hi"}]}
        })))
        .mount(&gmail)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "historyId": "99",
        })))
        .mount(&gmail)
        .await;

    let tmp = TempDir::new().unwrap();
    let config = fast_config(tmp.path());

    // A previous run left a cursor the provider no longer honors.
    let store = TenantStore::open(tmp.path(), "u1").await.unwrap();
    store
        .save_sync_state(MailProvider::Google, "primary", "1", SyncStatus::Hooked)
        .await
        .unwrap();

    let key = SyncKey::new("u1", "primary", MailProvider::Google);
    let runner = SyncRunner::new(
        key,
        "tenant-bearer",
        token_client_for(&identity),
        Arc::new(GmailTestFactory {
            base_url: gmail.uri(),
        }),
        Arc::new(MemoryBus::default()) as Arc<dyn BusPublisher>,
        config,
    );

    let cancel = CancellationToken::new();
    let task = tokio::spawn(runner.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(400)).await;

    let state = store
        .load_sync_state(MailProvider::Google)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.cursor, "99");
    assert_eq!(state.status, SyncStatus::Hooked);
    assert_eq!(count(&store, "email_events").await, 1);

    cancel.cancel();
    task.await.unwrap().unwrap();
}

/// Stream setup failure is a setup error: the runner reports it instead
/// of ticking.
#[tokio::test]
async fn test_stream_setup_failure_exits_runner() {
    let h = Harness::new().await;
    h.bus.set_ensure_failing(true);

    let key = SyncKey::new("u1", "primary", MailProvider::Google);
    let err = h
        .runner(key)
        .run(CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Bus(_)));
}
