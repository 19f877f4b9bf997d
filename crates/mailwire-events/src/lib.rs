//! # mailwire-events
//!
//! Publisher side of the durable message bus. Ensures the user-events
//! stream exists with its deduplication window and retention policy, and
//! publishes serialized mail events with per-message idempotency keys.

mod config;
mod error;
mod event;
mod publisher;

pub use config::NatsConfig;
pub use error::EventError;
pub use event::MailReceivedEvent;
pub use publisher::{BusPublisher, JetStreamPublisher};
