//! Sync identity: the `(tenant, inbox, provider)` triple.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::provider::MailProvider;

/// Identity of a single sync activity.
///
/// One runner exists per key at any time; the worker manager enforces
/// uniqueness. The canonical string form is `{tenant}:{inbox}:{provider}`,
/// which is also what the control surface reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncKey {
    pub tenant_id: String,
    pub inbox_id: String,
    pub provider: MailProvider,
}

impl SyncKey {
    pub fn new(
        tenant_id: impl Into<String>,
        inbox_id: impl Into<String>,
        provider: MailProvider,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            inbox_id: inbox_id.into(),
            provider,
        }
    }

    /// Key for the provider's default inbox.
    pub fn for_provider(tenant_id: impl Into<String>, provider: MailProvider) -> Self {
        Self::new(tenant_id, provider.default_inbox(), provider)
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.tenant_id, self.inbox_id, self.provider)
    }
}
