//! # mailwire-sync
//!
//! The runtime of the ingestion core. A [`SyncRunner`] owns one
//! `(tenant, inbox, provider)` triple: it alternates a one-shot backfill
//! with an indefinite incremental loop, writes each normalized record and
//! its outbox entry in one transaction, and pumps the outbox to the bus
//! from a companion dispatcher task. The [`SyncManager`] multiplexes
//! runners process-wide, enforcing one runner per triple.

mod config;
mod dispatcher;
mod error;
mod factory;
mod manager;
mod processor;
mod runner;

pub use config::RunnerConfig;
pub use dispatcher::{dispatch_pending, DispatchStats};
pub use error::SyncError;
pub use factory::{ConnectorFactory, StandardConnectorFactory};
pub use manager::SyncManager;
pub use processor::EventProcessor;
pub use runner::SyncRunner;
