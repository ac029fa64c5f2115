use crate::domain::SiteId;
use crate::domain::ports::{ConnectionTokenProvider, PaymentGatewayRemoteRef};
use crate::error::Result;
use async_trait::async_trait;
use tracing::debug;

/// Fetches reader credentials from the active backend for one site.
pub struct SiteConnectionTokenProvider {
    site_id: SiteId,
    remote: PaymentGatewayRemoteRef,
}

impl SiteConnectionTokenProvider {
    pub fn new(site_id: SiteId, remote: PaymentGatewayRemoteRef) -> Self {
        Self { site_id, remote }
    }
}

#[async_trait]
impl ConnectionTokenProvider for SiteConnectionTokenProvider {
    async fn fetch_token(&self) -> Result<String> {
        debug!(site_id = self.site_id, "fetching connection token");
        let token = self.remote.load_connection_token(self.site_id).await?;
        Ok(token.token)
    }

    async fn fetch_default_location_id(&self) -> Result<String> {
        let location = self
            .remote
            .load_default_reader_location(self.site_id)
            .await?;
        Ok(location.id)
    }
}
