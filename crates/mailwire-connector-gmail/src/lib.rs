//! # mailwire-connector-gmail
//!
//! Gmail driver for the mailwire adapter contract. Messages are pulled in
//! metadata-only format; incremental sync rides the history API with a
//! decimal history id as its cursor, falling back to a full backfill when
//! the provider refuses the id as too old.

mod client;
mod connector;

pub use client::GmailClient;
pub use connector::GmailConnector;
