//! REST clients for the store backend.
//!
//! Both payment plugins expose the same set of endpoints under different
//! prefixes (`payments` for WooCommerce Payments, `wc_stripe` for the Stripe
//! extension), so a single [`RestGatewayRemote`] parameterized by plugin
//! serves both.

use crate::config::BackendConfig;
use crate::domain::account::{AccountStatus, PaymentGatewayAccount};
use crate::domain::payment::{
    ConnectionToken, Customer, PaymentIntent, PaymentIntentStatus, ReaderLocation,
    from_minor_units,
};
use crate::domain::plugin::{PaymentPlugin, SitePlugin};
use crate::domain::ports::{PaymentGatewayRemote, SiteRemote};
use crate::domain::setting::SiteSetting;
use crate::domain::{OrderId, SiteId};
use crate::error::{CardPresentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Thin JSON-over-HTTP client for the `wc/v3` namespace.
#[derive(Debug, Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

/// Error body returned by the backend on non-success responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

impl RestClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token: config.api_token.clone(),
        })
    }

    /// Every request is routed to one site: `{base_url}/sites/{site_id}/{path}`.
    fn url(&self, site_id: SiteId, path: &str) -> String {
        format!(
            "{}/sites/{site_id}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, site_id: SiteId, path: &str) -> Result<T> {
        let url = self.url(site_id, path);
        debug!(%url, "GET");
        let response = self.authorize(self.client.get(&url)).send().await?;
        Self::handle_response(response).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        site_id: SiteId,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.url(site_id, path);
        debug!(%url, "POST");
        let response = self
            .authorize(self.client.post(&url).json(body))
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => CardPresentError::from_backend(body.code, body.message),
                Err(_) => CardPresentError::Network(format!("HTTP {status}: {text}")),
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

/// Wire shape of a gateway account.
#[derive(Debug, Deserialize)]
struct RemoteAccount {
    status: AccountStatus,
    #[serde(default)]
    has_pending_requirements: bool,
    #[serde(default)]
    has_overdue_requirements: bool,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    current_deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    statement_descriptor: Option<String>,
    #[serde(default)]
    store_currencies: Option<StoreCurrencies>,
    #[serde(default)]
    is_live: bool,
    #[serde(default)]
    test_mode: bool,
    #[serde(default)]
    card_present_eligible: bool,
}

#[derive(Debug, Deserialize)]
struct StoreCurrencies {
    default: String,
}

impl RemoteAccount {
    fn into_account(self, site_id: SiteId, plugin: PaymentPlugin) -> PaymentGatewayAccount {
        let mut account = PaymentGatewayAccount::new(site_id, plugin.gateway_id());
        account.status = self.status;
        account.has_pending_requirements = self.has_pending_requirements;
        account.has_overdue_requirements = self.has_overdue_requirements;
        account.requirements_deadline = self.current_deadline;
        account.is_live = self.is_live;
        account.is_in_test_mode = self.test_mode;
        account.is_card_present_eligible = self.card_present_eligible;
        account.statement_descriptor = self.statement_descriptor.filter(|d| !d.is_empty());
        if let Some(currencies) = self.store_currencies {
            account.default_currency = currencies.default.to_ascii_lowercase();
        }
        account
    }
}

/// Wire shape of a payment intent; amounts are in minor units.
#[derive(Debug, Deserialize)]
struct RemoteIntent {
    id: String,
    status: PaymentIntentStatus,
    #[serde(with = "chrono::serde::ts_seconds")]
    created: DateTime<Utc>,
    amount: i64,
    currency: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl From<RemoteIntent> for PaymentIntent {
    fn from(remote: RemoteIntent) -> Self {
        Self {
            id: remote.id,
            status: remote.status,
            created: remote.created,
            amount: from_minor_units(remote.amount, &remote.currency),
            currency: remote.currency,
            metadata: remote.metadata,
        }
    }
}

#[derive(Serialize)]
struct CaptureRequest<'a> {
    payment_intent_id: &'a str,
}

#[derive(Serialize)]
struct EmptyBody {}

/// One payment plugin's backend endpoints.
#[derive(Debug, Clone)]
pub struct RestGatewayRemote {
    http: RestClient,
    plugin: PaymentPlugin,
}

impl RestGatewayRemote {
    pub fn new(http: RestClient, plugin: PaymentPlugin) -> Self {
        Self { http, plugin }
    }

    fn prefix(&self) -> &'static str {
        match self.plugin {
            PaymentPlugin::WcPay => "payments",
            PaymentPlugin::Stripe => "wc_stripe",
        }
    }

    pub(crate) fn account_path(&self) -> String {
        match self.plugin {
            PaymentPlugin::WcPay => "payments/accounts".to_string(),
            PaymentPlugin::Stripe => "wc_stripe/account/summary".to_string(),
        }
    }

    pub(crate) fn order_path(&self, order_id: OrderId, action: &str) -> String {
        format!("{}/orders/{order_id}/{action}", self.prefix())
    }

    pub(crate) fn connection_token_path(&self) -> String {
        format!("{}/connection_tokens", self.prefix())
    }

    pub(crate) fn location_path(&self) -> String {
        format!("{}/terminal/locations/store", self.prefix())
    }
}

#[async_trait]
impl PaymentGatewayRemote for RestGatewayRemote {
    async fn load_account(&self, site_id: SiteId) -> Result<PaymentGatewayAccount> {
        let remote: RemoteAccount = self.http.get(site_id, &self.account_path()).await?;
        Ok(remote.into_account(site_id, self.plugin))
    }

    async fn fetch_order_customer(&self, site_id: SiteId, order_id: OrderId) -> Result<Customer> {
        self.http
            .post(site_id, &self.order_path(order_id, "create_customer"), &EmptyBody {})
            .await
    }

    async fn capture_order_payment(
        &self,
        site_id: SiteId,
        order_id: OrderId,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent> {
        let remote: RemoteIntent = self
            .http
            .post(
                site_id,
                &self.order_path(order_id, "capture_terminal_payment"),
                &CaptureRequest { payment_intent_id },
            )
            .await?;
        Ok(remote.into())
    }

    async fn load_connection_token(&self, site_id: SiteId) -> Result<ConnectionToken> {
        self.http
            .post(site_id, &self.connection_token_path(), &EmptyBody {})
            .await
    }

    async fn load_default_reader_location(&self, site_id: SiteId) -> Result<ReaderLocation> {
        self.http.get(site_id, &self.location_path()).await
    }
}

/// Wire shape of an entry in the plugin inventory.
#[derive(Debug, Deserialize)]
struct RemotePlugin {
    plugin: String,
    name: String,
    version: String,
    status: String,
    #[serde(default)]
    network_only: bool,
}

impl RemotePlugin {
    fn into_plugin(self, site_id: SiteId) -> SitePlugin {
        // Inventory entries look like `woocommerce-payments/woocommerce-payments`.
        let slug = self
            .plugin
            .split('/')
            .next()
            .unwrap_or(&self.plugin)
            .to_string();
        SitePlugin {
            site_id,
            plugin: slug,
            display_name: self.name,
            version: self.version,
            is_active: self.status == "active",
            is_network_active: self.status == "network-active" || self.network_only,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RemoteSetting {
    id: String,
    value: String,
}

/// Site-level endpoints: plugin inventory and settings.
#[derive(Debug, Clone)]
pub struct RestSiteRemote {
    http: RestClient,
}

impl RestSiteRemote {
    pub fn new(http: RestClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SiteRemote for RestSiteRemote {
    async fn load_plugins(&self, site_id: SiteId) -> Result<Vec<SitePlugin>> {
        let remote: Vec<RemotePlugin> = self.http.get(site_id, "plugins").await?;
        Ok(remote.into_iter().map(|p| p.into_plugin(site_id)).collect())
    }

    async fn load_setting(&self, site_id: SiteId, key: &str) -> Result<SiteSetting> {
        let remote: RemoteSetting = self.http
            .get(site_id, &format!("settings/general/{key}"))
            .await?;
        Ok(SiteSetting::new(site_id, remote.id, remote.value))
    }
}
