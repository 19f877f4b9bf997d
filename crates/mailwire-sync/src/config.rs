//! Runner timing and layout configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Steady-state sync tick period.
const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Outbox rows dequeued per dispatcher cycle.
const DISPATCH_BATCH: i64 = 100;

/// Dispatcher sleep when the outbox is drained.
const DISPATCH_IDLE: Duration = Duration::from_millis(500);

/// Dispatcher pause after a store-level dequeue failure.
const DISPATCH_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Flat per-row backoff after a failed publish.
const PUBLISH_BACKOFF: Duration = Duration::from_secs(10);

/// Default tenant-store root.
const DEFAULT_DATA_ROOT: &str = "data/users";

/// Timings and storage layout shared by a runner and its dispatcher.
///
/// Defaults are the production values; tests compress them.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory holding one subdirectory per tenant.
    pub data_root: PathBuf,
    pub tick_interval: Duration,
    pub dispatch_batch: i64,
    pub dispatch_idle: Duration,
    pub dispatch_error_pause: Duration,
    pub publish_backoff: Duration,
}

impl RunnerConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            tick_interval: TICK_INTERVAL,
            dispatch_batch: DISPATCH_BATCH,
            dispatch_idle: DISPATCH_IDLE,
            dispatch_error_pause: DISPATCH_ERROR_PAUSE,
            publish_backoff: PUBLISH_BACKOFF,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `MAILWIRE_DATA_ROOT`: tenant-store root (default: `data/users`)
    #[must_use]
    pub fn from_env() -> Self {
        let data_root =
            env::var("MAILWIRE_DATA_ROOT").unwrap_or_else(|_| DEFAULT_DATA_ROOT.to_string());
        Self::new(data_root)
    }
}
