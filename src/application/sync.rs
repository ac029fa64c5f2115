use super::coordinator::GatewayRemotes;
use crate::domain::SiteId;
use crate::domain::plugin::PaymentPlugin;
use crate::domain::ports::{
    GatewayAccountStoreRef, PluginStoreRef, SiteRemoteRef, SiteSettingStoreRef,
};
use crate::domain::setting::DEFAULT_COUNTRY_KEY;
use crate::error::Result;
use tracing::{debug, info};

/// Pulls the records the onboarding checks need from the backend into the
/// local cache.
pub struct Synchronizer {
    site: SiteRemoteRef,
    remotes: GatewayRemotes,
    plugins: PluginStoreRef,
    accounts: GatewayAccountStoreRef,
    settings: SiteSettingStoreRef,
}

impl Synchronizer {
    pub fn new(
        site: SiteRemoteRef,
        remotes: GatewayRemotes,
        plugins: PluginStoreRef,
        accounts: GatewayAccountStoreRef,
        settings: SiteSettingStoreRef,
    ) -> Self {
        Self {
            site,
            remotes,
            plugins,
            accounts,
            settings,
        }
    }

    /// Syncs plugin inventory, store country and both gateway accounts.
    ///
    /// The cached inventory is replaced as a whole, so plugins removed from
    /// the site disappear from the cache too.
    pub async fn synchronize_site(&self, site_id: SiteId) -> Result<()> {
        let plugins = self.site.load_plugins(site_id).await?;
        let count = plugins.len();
        self.plugins.replace_plugins(site_id, plugins).await?;

        let country = self.site.load_setting(site_id, DEFAULT_COUNTRY_KEY).await?;
        self.settings.upsert_setting(country).await?;

        self.synchronize_accounts(site_id).await?;
        info!(site_id, plugins = count, "site synchronized");
        Ok(())
    }

    /// Loads both gateway accounts concurrently and returns once both loads
    /// have finished.
    ///
    /// A failed load means the plugin is not installed: the cached account for
    /// that gateway is deleted and the failure is not propagated. Only cache
    /// errors are returned.
    pub async fn synchronize_accounts(&self, site_id: SiteId) -> Result<()> {
        let (wcpay, stripe) = tokio::join!(
            self.synchronize_account(site_id, PaymentPlugin::WcPay),
            self.synchronize_account(site_id, PaymentPlugin::Stripe),
        );
        wcpay?;
        stripe?;
        Ok(())
    }

    async fn synchronize_account(&self, site_id: SiteId, plugin: PaymentPlugin) -> Result<()> {
        match self.remotes.get(plugin).load_account(site_id).await {
            Ok(account) => {
                debug!(site_id, %plugin, status = ?account.status, "gateway account loaded");
                self.accounts.upsert_account(account).await
            }
            Err(err) => {
                debug!(site_id, %plugin, error = %err, "no gateway account, dropping cached row");
                self.accounts
                    .delete_account(site_id, plugin.gateway_id())
                    .await
            }
        }
    }
}
