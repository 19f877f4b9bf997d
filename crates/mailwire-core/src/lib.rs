//! # mailwire-core
//!
//! Shared vocabulary for the mail-ingestion core: the provider enum, the
//! `(tenant, inbox, provider)` sync key, and the normalized message record
//! every adapter produces and every downstream component consumes.

mod key;
mod message;
mod provider;

pub use key::SyncKey;
pub use message::{MailMessage, EMAIL_RECEIVED_EVENT};
pub use provider::{MailProvider, UnknownProvider};
