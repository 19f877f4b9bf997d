//! Provider-driver construction from a resolved credential.

use std::sync::Arc;

use async_trait::async_trait;
use mailwire_auth::ProviderToken;
use mailwire_connector::{ConnectorResult, MailConnector};
use mailwire_connector_gmail::{GmailClient, GmailConnector};
use mailwire_connector_outlook::{GraphClient, OutlookConnector};
use mailwire_core::MailProvider;

/// Builds a provider driver for one sync cycle.
///
/// Injected into the manager at construction; runners call it every tick
/// so each cycle runs on a freshly resolved credential.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    async fn create(
        &self,
        provider: MailProvider,
        token: &ProviderToken,
        tenant_id: &str,
    ) -> ConnectorResult<Arc<dyn MailConnector>>;
}

/// Stock factory wiring the Gmail and Graph drivers.
#[derive(Debug, Default)]
pub struct StandardConnectorFactory;

#[async_trait]
impl ConnectorFactory for StandardConnectorFactory {
    async fn create(
        &self,
        provider: MailProvider,
        token: &ProviderToken,
        tenant_id: &str,
    ) -> ConnectorResult<Arc<dyn MailConnector>> {
        match provider {
            MailProvider::Google => Ok(Arc::new(GmailConnector::new(
                GmailClient::new(token.access_token())?,
                tenant_id,
            ))),
            MailProvider::Microsoft => Ok(Arc::new(OutlookConnector::new(
                GraphClient::new(token.access_token())?,
                tenant_id,
            ))),
        }
    }
}
