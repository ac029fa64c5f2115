use crate::domain::SiteId;
use crate::domain::account::PaymentGatewayAccount;
use crate::domain::plugin::SitePlugin;
use crate::domain::ports::{GatewayAccountStore, PluginStore, SiteSettingStore};
use crate::domain::setting::SiteSetting;
use crate::error::{CardPresentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub(crate) fn ensure_same_site(site_id: SiteId, plugins: &[SitePlugin]) -> Result<()> {
    match plugins.iter().find(|p| p.site_id != site_id) {
        Some(stray) => Err(CardPresentError::Validation(format!(
            "plugin {} belongs to site {}, not {site_id}",
            stray.plugin, stray.site_id
        ))),
        None => Ok(()),
    }
}

/// A thread-safe in-memory cache of site plugins.
///
/// Keyed by `(site_id, slug)`; upserting the same plugin replaces it.
#[derive(Default, Clone)]
pub struct InMemoryPluginStore {
    plugins: Arc<RwLock<HashMap<(SiteId, String), SitePlugin>>>,
}

impl InMemoryPluginStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PluginStore for InMemoryPluginStore {
    async fn upsert_plugin(&self, plugin: SitePlugin) -> Result<()> {
        let mut plugins = self.plugins.write().await;
        plugins.insert((plugin.site_id, plugin.plugin.clone()), plugin);
        Ok(())
    }

    async fn replace_plugins(&self, site_id: SiteId, plugins: Vec<SitePlugin>) -> Result<()> {
        ensure_same_site(site_id, &plugins)?;
        let mut cached = self.plugins.write().await;
        cached.retain(|(site, _), _| *site != site_id);
        for plugin in plugins {
            cached.insert((site_id, plugin.plugin.clone()), plugin);
        }
        Ok(())
    }

    async fn plugins(&self, site_id: SiteId) -> Result<Vec<SitePlugin>> {
        let plugins = self.plugins.read().await;
        let mut found: Vec<SitePlugin> = plugins
            .values()
            .filter(|p| p.site_id == site_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.plugin.cmp(&b.plugin));
        Ok(found)
    }
}

/// A thread-safe in-memory cache of gateway accounts, one per `(site_id, gateway_id)`.
#[derive(Default, Clone)]
pub struct InMemoryGatewayAccountStore {
    accounts: Arc<RwLock<HashMap<(SiteId, String), PaymentGatewayAccount>>>,
}

impl InMemoryGatewayAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GatewayAccountStore for InMemoryGatewayAccountStore {
    async fn upsert_account(&self, account: PaymentGatewayAccount) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.insert((account.site_id, account.gateway_id.clone()), account);
        Ok(())
    }

    async fn delete_account(&self, site_id: SiteId, gateway_id: &str) -> Result<()> {
        let mut accounts = self.accounts.write().await;
        accounts.remove(&(site_id, gateway_id.to_string()));
        Ok(())
    }

    async fn accounts(&self, site_id: SiteId) -> Result<Vec<PaymentGatewayAccount>> {
        let accounts = self.accounts.read().await;
        let mut found: Vec<PaymentGatewayAccount> = accounts
            .values()
            .filter(|a| a.site_id == site_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.gateway_id.cmp(&b.gateway_id));
        Ok(found)
    }
}

/// A thread-safe in-memory key/value cache of site settings.
#[derive(Default, Clone)]
pub struct InMemorySiteSettingStore {
    settings: Arc<RwLock<HashMap<(SiteId, String), SiteSetting>>>,
}

impl InMemorySiteSettingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SiteSettingStore for InMemorySiteSettingStore {
    async fn upsert_setting(&self, setting: SiteSetting) -> Result<()> {
        let mut settings = self.settings.write().await;
        settings.insert((setting.site_id, setting.key.clone()), setting);
        Ok(())
    }

    async fn setting(&self, site_id: SiteId, key: &str) -> Result<Option<SiteSetting>> {
        let settings = self.settings.read().await;
        Ok(settings.get(&(site_id, key.to_string())).cloned())
    }
}
