use crate::domain::SiteId;
use crate::domain::account::PaymentGatewayAccount;
use crate::domain::plugin::SitePlugin;
use crate::domain::ports::{GatewayAccountStore, PluginStore, SiteSettingStore};
use crate::domain::setting::SiteSetting;
use crate::infrastructure::in_memory::ensure_same_site;
use crate::error::{CardPresentError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for cached site plugins.
pub const CF_PLUGINS: &str = "plugins";
/// Column Family for cached gateway accounts.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for cached site settings.
pub const CF_SETTINGS: &str = "settings";

/// A persistent cache implementation using RocksDB.
///
/// Plugins, gateway accounts and settings live in separate Column Families,
/// keyed `"{site_id}/{name}"` so one site's rows are contiguous.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
}

fn row_key(site_id: SiteId, name: &str) -> Vec<u8> {
    format!("{site_id}/{name}").into_bytes()
}

fn site_prefix(site_id: SiteId) -> Vec<u8> {
    format!("{site_id}/").into_bytes()
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the plugin, account and setting column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_PLUGINS, CF_ACCOUNTS, CF_SETTINGS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self { db: Arc::new(db) })
    }

    fn family(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| CardPresentError::Storage(format!("{name} column family not found")))
    }

    fn put<T: Serialize>(&self, family: &'static str, key: Vec<u8>, value: &T) -> Result<()> {
        let cf = self.family(family)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(cf, key, bytes)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, family: &'static str, key: Vec<u8>) -> Result<Option<T>> {
        let cf = self.family(family)?;
        match self.db.get_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Raw `(key, value)` rows of one site, in key order.
    fn site_rows(
        &self,
        family: &'static str,
        site_id: SiteId,
    ) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.family(family)?;
        let prefix = site_prefix(site_id);
        let mut rows = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix.as_slice(), Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_slice()) {
                break;
            }
            rows.push((key, value));
        }

        Ok(rows)
    }

    fn scan_site<T: DeserializeOwned>(
        &self,
        family: &'static str,
        site_id: SiteId,
    ) -> Result<Vec<T>> {
        self.site_rows(family, site_id)?
            .iter()
            .map(|(_, value)| serde_json::from_slice(value).map_err(CardPresentError::from))
            .collect()
    }
}

#[async_trait]
impl PluginStore for RocksDbStore {
    async fn upsert_plugin(&self, plugin: SitePlugin) -> Result<()> {
        self.put(CF_PLUGINS, row_key(plugin.site_id, &plugin.plugin), &plugin)
    }

    async fn replace_plugins(&self, site_id: SiteId, plugins: Vec<SitePlugin>) -> Result<()> {
        ensure_same_site(site_id, &plugins)?;
        let cf = self.family(CF_PLUGINS)?;
        let mut batch = WriteBatch::default();
        for (key, _) in self.site_rows(CF_PLUGINS, site_id)? {
            batch.delete_cf(cf, key);
        }
        for plugin in &plugins {
            batch.put_cf(cf, row_key(site_id, &plugin.plugin), serde_json::to_vec(plugin)?);
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn plugins(&self, site_id: SiteId) -> Result<Vec<SitePlugin>> {
        self.scan_site(CF_PLUGINS, site_id)
    }
}

#[async_trait]
impl GatewayAccountStore for RocksDbStore {
    async fn upsert_account(&self, account: PaymentGatewayAccount) -> Result<()> {
        self.put(
            CF_ACCOUNTS,
            row_key(account.site_id, &account.gateway_id),
            &account,
        )
    }

    async fn delete_account(&self, site_id: SiteId, gateway_id: &str) -> Result<()> {
        let cf = self.family(CF_ACCOUNTS)?;
        self.db.delete_cf(cf, row_key(site_id, gateway_id))?;
        Ok(())
    }

    async fn accounts(&self, site_id: SiteId) -> Result<Vec<PaymentGatewayAccount>> {
        self.scan_site(CF_ACCOUNTS, site_id)
    }
}

#[async_trait]
impl SiteSettingStore for RocksDbStore {
    async fn upsert_setting(&self, setting: SiteSetting) -> Result<()> {
        self.put(CF_SETTINGS, row_key(setting.site_id, &setting.key), &setting)
    }

    async fn setting(&self, site_id: SiteId, key: &str) -> Result<Option<SiteSetting>> {
        self.get(CF_SETTINGS, row_key(site_id, key))
    }
}
