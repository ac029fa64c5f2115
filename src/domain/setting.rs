use super::SiteId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Settings key holding the store's base location, e.g. `US:CA`.
pub const DEFAULT_COUNTRY_KEY: &str = "woocommerce_default_country";

/// A cached key/value site setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSetting {
    pub site_id: SiteId,
    pub key: String,
    pub value: String,
}

impl SiteSetting {
    pub fn new(site_id: SiteId, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            site_id,
            key: key.into(),
            value: value.into(),
        }
    }
}

/// ISO 3166-1 alpha-2 country code, upper-cased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountryCode(String);

impl CountryCode {
    /// Parses a store location value. Only the part before `:` is the
    /// country; the rest is the region.
    pub fn parse(location: &str) -> Option<Self> {
        let country = location.split(':').next()?.trim();
        if country.len() == 2 && country.chars().all(|c| c.is_ascii_alphabetic()) {
            Some(Self(country.to_ascii_uppercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
