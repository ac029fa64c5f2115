use super::SiteId;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The payment plugins able to drive a card reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPlugin {
    #[serde(rename = "wcpay")]
    WcPay,
    Stripe,
}

impl PaymentPlugin {
    pub const ALL: [PaymentPlugin; 2] = [PaymentPlugin::WcPay, PaymentPlugin::Stripe];

    /// Plugin slug as reported by the site's plugin inventory.
    pub fn slug(&self) -> &'static str {
        match self {
            PaymentPlugin::WcPay => "woocommerce-payments",
            PaymentPlugin::Stripe => "woocommerce-gateway-stripe",
        }
    }

    /// Identifier of the gateway account row owned by this plugin.
    pub fn gateway_id(&self) -> &'static str {
        self.slug()
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentPlugin::WcPay => "WooCommerce Payments",
            PaymentPlugin::Stripe => "WooCommerce Stripe Gateway",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.slug() == slug)
    }
}

impl fmt::Display for PaymentPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A plugin installed on a site, as last synced from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitePlugin {
    pub site_id: SiteId,
    /// Plugin slug, e.g. `woocommerce-payments`.
    pub plugin: String,
    pub display_name: String,
    pub version: String,
    pub is_active: bool,
    pub is_network_active: bool,
}

impl SitePlugin {
    /// Active either on the site itself or across the network.
    pub fn is_enabled(&self) -> bool {
        self.is_active || self.is_network_active
    }
}

/// Parses a plugin version leniently.
///
/// Missing minor or patch components are treated as zero, so `"3.2"` parses as
/// `3.2.0`. Pre-release and build suffixes are kept.
pub fn parse_plugin_version(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches(['v', 'V']);
    let split_at = raw.find(['-', '+']).unwrap_or(raw.len());
    let (core, suffix) = raw.split_at(split_at);

    let components: Vec<&str> = core.split('.').collect();
    if components.is_empty()
        || components.len() > 3
        || components
            .iter()
            .any(|c| c.is_empty() || !c.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let mut normalized = components.join(".");
    for _ in components.len()..3 {
        normalized.push_str(".0");
    }
    normalized.push_str(suffix);
    Version::parse(&normalized).ok()
}
