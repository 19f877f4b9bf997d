//! # mailwire-connector
//!
//! Capability contract for mail provider adapters. An adapter exposes a
//! one-shot backfill and a cursor-driven incremental pass, and normalizes
//! raw provider messages into [`mailwire_core::MailMessage`] records
//! delivered to a sink. Concrete drivers live in the
//! `mailwire-connector-gmail` and `mailwire-connector-outlook` crates.

mod error;
mod traits;

pub use error::{ConnectorError, ConnectorResult, ErrorKind};
pub use traits::{MailConnector, RecordSink};

// Re-export for connector implementors.
pub use async_trait::async_trait;
