//! Adapter capability traits.

use async_trait::async_trait;
use mailwire_core::MailMessage;
use tokio_util::sync::CancellationToken;

use crate::error::ConnectorResult;

/// Receives normalized records as an adapter enumerates them.
///
/// Delivery order is the provider's order within a page and across pages.
/// A sink failure aborts the current page and surfaces from the adapter
/// call.
#[async_trait]
pub trait RecordSink: Send {
    async fn deliver(&mut self, message: MailMessage) -> ConnectorResult<()>;
}

/// Two-method contract every mail provider driver implements.
///
/// Cursors are opaque to callers: a Gmail driver hands back a decimal
/// history id, a Graph driver a delta link. Both methods drive pagination
/// to completion before returning and honor cancellation at page
/// boundaries at minimum; a cancelled call returns without committing a
/// cursor advance.
#[async_trait]
pub trait MailConnector: Send + Sync {
    /// Enumerates every message in the mailbox and returns a cursor
    /// suitable for subsequent incremental calls. The incoming cursor may
    /// be ignored.
    async fn backfill(
        &self,
        cancel: &CancellationToken,
        mailbox: &str,
        cursor: &str,
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<String>;

    /// Enumerates changes since `cursor` and returns the advanced cursor.
    ///
    /// If the provider refuses the cursor as too old, the driver falls
    /// back to a full backfill and returns a fresh cursor; callers cannot
    /// observe the fallback.
    async fn incremental(
        &self,
        cancel: &CancellationToken,
        mailbox: &str,
        cursor: &str,
        sink: &mut dyn RecordSink,
    ) -> ConnectorResult<String>;
}
