//! # mailwire-connector-outlook
//!
//! Microsoft Graph driver for the mailwire adapter contract. Both passes
//! ride the delta query protocol: a backfill is a delta enumeration from
//! scratch, and the `@odata.deltaLink` it ends with is the cursor every
//! later incremental pass resumes from. An expired delta token triggers a
//! transparent rescan.

mod client;
mod connector;

pub use client::GraphClient;
pub use connector::OutlookConnector;
