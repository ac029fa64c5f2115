use super::account::PaymentGatewayAccount;
use super::payment::{
    ConnectionToken, Customer, PaymentIntent, PaymentParameters, ReaderLocation,
};
use super::plugin::SitePlugin;
use super::reader::{CardReader, ReaderEvent, SoftwareUpdateEvent};
use super::setting::SiteSetting;
use super::{OrderId, SiteId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

#[async_trait]
pub trait PluginStore: Send + Sync {
    async fn upsert_plugin(&self, plugin: SitePlugin) -> Result<()>;
    /// Swaps a site's whole inventory for `plugins`, dropping rows not in it.
    async fn replace_plugins(&self, site_id: SiteId, plugins: Vec<SitePlugin>) -> Result<()>;
    async fn plugins(&self, site_id: SiteId) -> Result<Vec<SitePlugin>>;
}

#[async_trait]
pub trait GatewayAccountStore: Send + Sync {
    async fn upsert_account(&self, account: PaymentGatewayAccount) -> Result<()>;
    async fn delete_account(&self, site_id: SiteId, gateway_id: &str) -> Result<()>;
    async fn accounts(&self, site_id: SiteId) -> Result<Vec<PaymentGatewayAccount>>;
}

#[async_trait]
pub trait SiteSettingStore: Send + Sync {
    async fn upsert_setting(&self, setting: SiteSetting) -> Result<()>;
    async fn setting(&self, site_id: SiteId, key: &str) -> Result<Option<SiteSetting>>;
}

pub type PluginStoreRef = Arc<dyn PluginStore>;
pub type GatewayAccountStoreRef = Arc<dyn GatewayAccountStore>;
pub type SiteSettingStoreRef = Arc<dyn SiteSettingStore>;

/// Backend endpoints exposed by one payment plugin.
#[async_trait]
pub trait PaymentGatewayRemote: Send + Sync {
    async fn load_account(&self, site_id: SiteId) -> Result<PaymentGatewayAccount>;
    async fn fetch_order_customer(&self, site_id: SiteId, order_id: OrderId) -> Result<Customer>;
    async fn capture_order_payment(
        &self,
        site_id: SiteId,
        order_id: OrderId,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent>;
    async fn load_connection_token(&self, site_id: SiteId) -> Result<ConnectionToken>;
    async fn load_default_reader_location(&self, site_id: SiteId) -> Result<ReaderLocation>;
}

pub type PaymentGatewayRemoteRef = Arc<dyn PaymentGatewayRemote>;

/// Site-level backend data feeding the onboarding checks.
#[async_trait]
pub trait SiteRemote: Send + Sync {
    async fn load_plugins(&self, site_id: SiteId) -> Result<Vec<SitePlugin>>;
    async fn load_setting(&self, site_id: SiteId, key: &str) -> Result<SiteSetting>;
}

pub type SiteRemoteRef = Arc<dyn SiteRemote>;

/// Supplies the reader SDK with credentials on demand.
#[async_trait]
pub trait ConnectionTokenProvider: Send + Sync {
    async fn fetch_token(&self) -> Result<String>;
    async fn fetch_default_location_id(&self) -> Result<String>;
}

/// The card reader hardware adapter.
///
/// Streams are handed out per subscriber: `discovered_readers` yields batches
/// until discovery ends, `connected_readers` always holds the current set, and
/// the broadcast receivers see events emitted after they subscribe.
#[async_trait]
pub trait CardReaderService: Send + Sync {
    fn start(&self, token_provider: Arc<dyn ConnectionTokenProvider>) -> Result<()>;
    fn discovered_readers(&self) -> mpsc::Receiver<Result<Vec<CardReader>>>;
    async fn cancel_discovery(&self) -> Result<()>;
    async fn connect(&self, reader: CardReader) -> Result<CardReader>;
    async fn disconnect(&self) -> Result<()>;
    fn connected_readers(&self) -> watch::Receiver<Vec<CardReader>>;
    async fn capture_payment(&self, parameters: PaymentParameters) -> Result<PaymentIntent>;
    async fn cancel_payment_intent(&self) -> Result<()>;
    fn reader_events(&self) -> broadcast::Receiver<ReaderEvent>;
    fn software_update_events(&self) -> broadcast::Receiver<SoftwareUpdateEvent>;
    async fn install_update(&self) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

pub type CardReaderServiceRef = Arc<dyn CardReaderService>;
