use card_present::application::coordinator::{GatewayRemotes, confirm_capture};
use card_present::application::onboarding::{
    OnboardingEvaluator, OnboardingRules, OnboardingService,
};
use card_present::application::sync::Synchronizer;
use card_present::config::Config;
use card_present::domain::onboarding::OnboardingState;
use card_present::domain::plugin::PaymentPlugin;
use card_present::domain::ports::{
    GatewayAccountStoreRef, PaymentGatewayRemoteRef, PluginStoreRef, SiteSettingStoreRef,
};
use card_present::domain::setting::{DEFAULT_COUNTRY_KEY, SiteSetting};
use card_present::domain::{OrderId, SiteId};
use card_present::infrastructure::in_memory::{
    InMemoryGatewayAccountStore, InMemoryPluginStore, InMemorySiteSettingStore,
};
use card_present::infrastructure::rest::{RestClient, RestGatewayRemote, RestSiteRemote};
use card_present::interfaces::csv::account_reader::AccountReader;
use card_present::interfaces::csv::plugin_reader::PluginReader;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Path to persistent cache (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import cached records from CSV and print the site's onboarding state.
    Onboarding {
        #[arg(long)]
        site_id: SiteId,

        /// Store location as configured in the shop, e.g. `US:CA`.
        #[arg(long)]
        country: Option<String>,

        /// Plugin inventory CSV.
        #[arg(long)]
        plugins: Option<PathBuf>,

        /// Gateway accounts CSV.
        #[arg(long)]
        accounts: Option<PathBuf>,
    },
    /// Refresh the cache from the backend and print the onboarding state.
    Sync {
        #[arg(long)]
        site_id: SiteId,
    },
    /// Confirm a collected payment with the backend.
    Capture {
        #[arg(long)]
        site_id: SiteId,

        #[arg(long)]
        order_id: OrderId,

        #[arg(long)]
        payment_intent_id: String,

        /// `wcpay` or `stripe`.
        #[arg(long, value_parser = parse_plugin, default_value = "wcpay")]
        plugin: PaymentPlugin,
    },
}

fn parse_plugin(raw: &str) -> std::result::Result<PaymentPlugin, String> {
    match raw {
        "wcpay" => Ok(PaymentPlugin::WcPay),
        "stripe" => Ok(PaymentPlugin::Stripe),
        slug => PaymentPlugin::from_slug(slug).ok_or_else(|| format!("unknown plugin '{slug}'")),
    }
}

struct Cache {
    plugins: PluginStoreRef,
    accounts: GatewayAccountStoreRef,
    settings: SiteSettingStoreRef,
}

impl Cache {
    fn in_memory() -> Self {
        Self {
            plugins: Arc::new(InMemoryPluginStore::new()),
            accounts: Arc::new(InMemoryGatewayAccountStore::new()),
            settings: Arc::new(InMemorySiteSettingStore::new()),
        }
    }

    #[cfg(feature = "storage-rocksdb")]
    fn open(db_path: Option<&Path>) -> Result<Self> {
        use card_present::infrastructure::rocksdb::RocksDbStore;

        let Some(path) = db_path else {
            return Ok(Self::in_memory());
        };
        let store = RocksDbStore::open(path).into_diagnostic()?;
        info!(path = %path.display(), "using persistent cache");
        Ok(Self {
            plugins: Arc::new(store.clone()),
            accounts: Arc::new(store.clone()),
            settings: Arc::new(store),
        })
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    fn open(db_path: Option<&Path>) -> Result<Self> {
        if db_path.is_some() {
            warn!(
                "persistent storage requested via --db-path, but the 'storage-rocksdb' feature \
                 is not enabled; falling back to in-memory storage"
            );
        }
        Ok(Self::in_memory())
    }

    fn onboarding(&self, config: &Config) -> Result<OnboardingService> {
        let rules = OnboardingRules::from_config(&config.onboarding).into_diagnostic()?;
        Ok(OnboardingService::new(
            OnboardingEvaluator::new(rules),
            self.plugins.clone(),
            self.accounts.clone(),
            self.settings.clone(),
        ))
    }

    async fn import(
        &self,
        site_id: SiteId,
        country: Option<String>,
        plugins: Option<&Path>,
        accounts: Option<&Path>,
    ) -> Result<()> {
        if let Some(country) = country {
            self.settings
                .upsert_setting(SiteSetting::new(site_id, DEFAULT_COUNTRY_KEY, country))
                .await
                .into_diagnostic()?;
        }

        // The CSV is the site's full inventory, same as a backend sync.
        if let Some(path) = plugins {
            let reader = PluginReader::new(File::open(path).into_diagnostic()?);
            let mut inventory = Vec::new();
            for plugin in reader.plugins() {
                match plugin {
                    Ok(plugin) if plugin.site_id == site_id => inventory.push(plugin),
                    Ok(plugin) => {
                        warn!(site_id = plugin.site_id, "skipping plugin row for another site")
                    }
                    Err(e) => warn!(error = %e, "skipping unreadable plugin row"),
                }
            }
            self.plugins
                .replace_plugins(site_id, inventory)
                .await
                .into_diagnostic()?;
        }

        if let Some(path) = accounts {
            let reader = AccountReader::new(File::open(path).into_diagnostic()?);
            for account in reader.accounts() {
                match account {
                    Ok(account) if account.site_id == site_id => {
                        self.accounts.upsert_account(account).await.into_diagnostic()?
                    }
                    Ok(account) => {
                        warn!(site_id = account.site_id, "skipping account row for another site")
                    }
                    Err(e) => warn!(error = %e, "skipping unreadable account row"),
                }
            }
        }
        Ok(())
    }
}

fn gateway_remotes(http: &RestClient) -> GatewayRemotes {
    GatewayRemotes::new(
        Arc::new(RestGatewayRemote::new(http.clone(), PaymentPlugin::WcPay)),
        Arc::new(RestGatewayRemote::new(http.clone(), PaymentPlugin::Stripe)),
    )
}

fn report_state(site_id: SiteId, state: &OnboardingState) -> Result<()> {
    if state.is_completed() {
        info!(site_id, "card present payments ready");
    } else {
        info!(site_id, "card present onboarding incomplete");
    }
    print_json(state)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path).into_diagnostic()?,
        None => Config::default(),
    };

    match cli.command {
        Command::Onboarding {
            site_id,
            country,
            plugins,
            accounts,
        } => {
            let cache = Cache::open(cli.db_path.as_deref())?;
            cache
                .import(site_id, country, plugins.as_deref(), accounts.as_deref())
                .await?;
            let state = cache.onboarding(&config)?.state(site_id).await.into_diagnostic()?;
            report_state(site_id, &state)?;
        }
        Command::Sync { site_id } => {
            let cache = Cache::open(cli.db_path.as_deref())?;
            let http = RestClient::new(&config.backend).into_diagnostic()?;
            let synchronizer = Synchronizer::new(
                Arc::new(RestSiteRemote::new(http.clone())),
                gateway_remotes(&http),
                cache.plugins.clone(),
                cache.accounts.clone(),
                cache.settings.clone(),
            );
            synchronizer.synchronize_site(site_id).await.into_diagnostic()?;
            let state = cache.onboarding(&config)?.state(site_id).await.into_diagnostic()?;
            report_state(site_id, &state)?;
        }
        Command::Capture {
            site_id,
            order_id,
            payment_intent_id,
            plugin,
        } => {
            let http = RestClient::new(&config.backend).into_diagnostic()?;
            let remote: PaymentGatewayRemoteRef = gateway_remotes(&http).get(plugin);
            let intent = confirm_capture(&remote, site_id, order_id, &payment_intent_id)
                .await
                .into_diagnostic()?;
            info!(order_id, intent = %intent.id, "payment captured");
            print_json(&intent)?;
        }
    }

    Ok(())
}
