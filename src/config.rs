//! Configuration for the card-present toolkit.

use crate::error::{CardPresentError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration, usually loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub onboarding: OnboardingConfig,
}

/// Connection settings for the store's REST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the `wc/v3` namespace, e.g. `https://example.com/wp-json/wc/v3`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Eligibility rules for card-present onboarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingConfig {
    /// ISO country codes where in-person payments are available.
    #[serde(default = "default_supported_countries")]
    pub supported_countries: Vec<String>,

    /// Oldest WooCommerce Payments release able to drive a reader.
    #[serde(default = "default_wcpay_min_version")]
    pub wcpay_min_version: String,

    /// Oldest Stripe extension release able to drive a reader.
    #[serde(default = "default_stripe_min_version")]
    pub stripe_min_version: String,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            supported_countries: default_supported_countries(),
            wcpay_min_version: default_wcpay_min_version(),
            stripe_min_version: default_stripe_min_version(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost/wp-json/wc/v3".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_supported_countries() -> Vec<String> {
    vec!["US".to_string(), "CA".to_string()]
}

fn default_wcpay_min_version() -> String {
    "3.2.1".to_string()
}

fn default_stripe_min_version() -> String {
    "5.9.0".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CardPresentError::Config(e.to_string()))
    }
}
