//! Shared test doubles for the sync runtime.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mailwire_auth::{IdentityConfig, ProviderToken, TokenClient};
use mailwire_connector::{ConnectorError, ConnectorResult, MailConnector, RecordSink};
use mailwire_core::{MailMessage, MailProvider};
use mailwire_events::{BusPublisher, EventError};
use mailwire_sync::{ConnectorFactory, RunnerConfig};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// In-process bus with the deduplication semantics of the real one:
/// every accepted publish is recorded, but only the first publish of a
/// given `msg_id` becomes an observed delivery.
#[derive(Default)]
pub struct MemoryBus {
    inner: Mutex<MemoryBusInner>,
}

#[derive(Default)]
struct MemoryBusInner {
    failing: bool,
    ensure_failing: bool,
    ensure_calls: usize,
    publishes: Vec<(String, String)>,
    deliveries: Vec<(String, Vec<u8>, String)>,
    seen: HashSet<String>,
}

impl MemoryBus {
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().unwrap().failing = failing;
    }

    pub fn set_ensure_failing(&self, failing: bool) {
        self.inner.lock().unwrap().ensure_failing = failing;
    }

    /// Accepted publishes, including deduplicated replays.
    pub fn publish_count(&self) -> usize {
        self.inner.lock().unwrap().publishes.len()
    }

    /// Observed deliveries after the deduplication window.
    pub fn delivery_count(&self) -> usize {
        self.inner.lock().unwrap().deliveries.len()
    }

    pub fn delivered_msg_ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .deliveries
            .iter()
            .map(|(_, _, msg_id)| msg_id.clone())
            .collect()
    }

    pub fn delivered_subjects(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .deliveries
            .iter()
            .map(|(subject, _, _)| subject.clone())
            .collect()
    }

    pub fn ensure_calls(&self) -> usize {
        self.inner.lock().unwrap().ensure_calls
    }
}

#[async_trait]
impl BusPublisher for MemoryBus {
    async fn ensure_stream(&self) -> Result<(), EventError> {
        let mut inner = self.inner.lock().unwrap();
        inner.ensure_calls += 1;
        if inner.ensure_failing {
            return Err(EventError::StreamSetup {
                stream: "USER_EVENTS".into(),
                cause: "bus unavailable".into(),
            });
        }
        Ok(())
    }

    async fn publish(
        &self,
        subject: &str,
        payload: &[u8],
        msg_id: &str,
    ) -> Result<(), EventError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing {
            return Err(EventError::PublishFailed {
                subject: subject.to_string(),
                cause: "connection refused".into(),
            });
        }
        inner.publishes.push((subject.to_string(), msg_id.to_string()));
        if inner.seen.insert(msg_id.to_string()) {
            inner
                .deliveries
                .push((subject.to_string(), payload.to_vec(), msg_id.to_string()));
        }
        Ok(())
    }
}

/// One scripted adapter pass.
pub enum TickScript {
    /// Deliver the records, then return the cursor.
    Deliver {
        records: Vec<MailMessage>,
        cursor: String,
    },
    /// Fail with the given error.
    Fail(ConnectorError),
    /// Deliver the records, cancel the token, and report cancellation.
    CancelAfter { records: Vec<MailMessage> },
}

/// What an exhausted script queue does.
#[derive(Clone, Copy)]
pub enum Exhausted {
    /// Report no changes: echo the incoming cursor.
    EchoCursor,
    /// Keep failing transiently.
    Fail,
}

/// Adapter double driven by per-call scripts.
pub struct ScriptedConnector {
    backfill: Mutex<VecDeque<TickScript>>,
    incremental: Mutex<VecDeque<TickScript>>,
    exhausted: Mutex<Exhausted>,
    pub backfill_calls: AtomicUsize,
    pub incremental_calls: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            backfill: Mutex::new(VecDeque::new()),
            incremental: Mutex::new(VecDeque::new()),
            exhausted: Mutex::new(Exhausted::EchoCursor),
            backfill_calls: AtomicUsize::new(0),
            incremental_calls: AtomicUsize::new(0),
        })
    }

    pub fn push_backfill(&self, script: TickScript) {
        self.backfill.lock().unwrap().push_back(script);
    }

    pub fn push_incremental(&self, script: TickScript) {
        self.incremental.lock().unwrap().push_back(script);
    }

    pub fn set_exhausted(&self, behavior: Exhausted) {
        *self.exhausted.lock().unwrap() = behavior;
    }

    async fn play(
        &self,
        script: Option<TickScript>,
        cancel: &CancellationToken,
        cursor_in: &str,
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<String> {
        let script = match script {
            Some(script) => script,
            None => match *self.exhausted.lock().unwrap() {
                Exhausted::EchoCursor => {
                    return Ok(cursor_in.to_string());
                }
                Exhausted::Fail => {
                    return Err(ConnectorError::Api {
                        status: 503,
                        message: "script exhausted".into(),
                    });
                }
            },
        };

        match script {
            TickScript::Deliver { records, cursor } => {
                for record in records {
                    sink.deliver(record).await?;
                }
                Ok(cursor)
            }
            TickScript::Fail(error) => Err(error),
            TickScript::CancelAfter { records } => {
                for record in records {
                    sink.deliver(record).await?;
                }
                cancel.cancel();
                Err(ConnectorError::Cancelled)
            }
        }
    }
}

#[async_trait]
impl MailConnector for ScriptedConnector {
    async fn backfill(
        &self,
        cancel: &CancellationToken,
        _mailbox: &str,
        cursor: &str,
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<String> {
        self.backfill_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.backfill.lock().unwrap().pop_front();
        self.play(script, cancel, cursor, sink).await
    }

    async fn incremental(
        &self,
        cancel: &CancellationToken,
        _mailbox: &str,
        cursor: &str,
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<String> {
        self.incremental_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.incremental.lock().unwrap().pop_front();
        self.play(script, cancel, cursor, sink).await
    }
}

/// Factory that hands every cycle the same scripted adapter.
pub struct FixedFactory(pub Arc<ScriptedConnector>);

#[async_trait]
impl ConnectorFactory for FixedFactory {
    async fn create(
        &self,
        _provider: MailProvider,
        _token: &ProviderToken,
        _tenant_id: &str,
    ) -> ConnectorResult<Arc<dyn MailConnector>> {
        Ok(Arc::clone(&self.0) as Arc<dyn MailConnector>)
    }
}

/// Normalized Gmail-shaped record for scripted ticks.
pub fn google_message(tenant: &str, id: &str, thread: &str, subject: &str, from: &str) -> MailMessage {
    let mut headers = BTreeMap::new();
    headers.insert("Subject".to_string(), subject.to_string());
    headers.insert("From".to_string(), from.to_string());
    MailMessage {
        provider: MailProvider::Google,
        tenant_id: tenant.into(),
        inbox_id: "primary".into(),
        provider_message_id: id.into(),
        provider_thread_id: thread.into(),
        subject: subject.into(),
        sender: from.into(),
        to: vec![],
        cc: vec![],
        bcc: vec![],
        snippet: String::new(),
        provider_labels: vec!["INBOX".into()],
        headers,
        message_date: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
    }
}

/// Mounts a token endpoint for both providers on the mock identity
/// service.
pub async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/accounts/(google|microsoft)/token$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "test-access",
            "refresh_token": "test-refresh",
            "expires_at": 4_000_000_000i64,
        })))
        .mount(server)
        .await;
}

pub fn token_client_for(server: &MockServer) -> TokenClient {
    TokenClient::new(IdentityConfig::new(server.uri())).unwrap()
}

/// Production config with test-friendly timings.
pub fn fast_config(data_root: &Path) -> RunnerConfig {
    let mut config = RunnerConfig::new(data_root);
    config.tick_interval = Duration::from_millis(50);
    config.dispatch_idle = Duration::from_millis(20);
    config.dispatch_error_pause = Duration::from_millis(50);
    config
}
