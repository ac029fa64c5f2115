use super::SiteId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Gateway account status as reported by the payment backend.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum AccountStatus {
    #[serde(rename = "no_account", alias = "NOACCOUNT")]
    NoAccount,
    #[serde(rename = "restricted")]
    Restricted,
    #[serde(rename = "restricted_soon")]
    RestrictedSoon,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "rejected.fraud")]
    RejectedFraud,
    #[serde(rename = "rejected.terms_of_service")]
    RejectedTermsOfService,
    #[serde(rename = "rejected.listed")]
    RejectedListed,
    #[serde(rename = "rejected.other")]
    RejectedOther,
    #[serde(other, rename = "unknown")]
    Unknown,
}

impl AccountStatus {
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            AccountStatus::RejectedFraud
                | AccountStatus::RejectedTermsOfService
                | AccountStatus::RejectedListed
                | AccountStatus::RejectedOther
        )
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, AccountStatus::Restricted | AccountStatus::RestrictedSoon)
    }
}

/// A payment gateway account for one site and one plugin.
///
/// Rows are keyed by `(site_id, gateway_id)`; the gateway id tells the two
/// supported plugins apart.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentGatewayAccount {
    pub site_id: SiteId,
    pub gateway_id: String,
    pub status: AccountStatus,
    pub has_pending_requirements: bool,
    pub has_overdue_requirements: bool,
    /// Deadline for the pending requirements, when the backend reports one.
    pub requirements_deadline: Option<DateTime<Utc>>,
    pub is_live: bool,
    pub is_in_test_mode: bool,
    pub is_card_present_eligible: bool,
    #[serde(default)]
    pub statement_descriptor: Option<String>,
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

fn default_currency() -> String {
    "usd".to_string()
}

impl PaymentGatewayAccount {
    /// An account that has completed setup and can take live in-person payments.
    pub fn new(site_id: SiteId, gateway_id: impl Into<String>) -> Self {
        Self {
            site_id,
            gateway_id: gateway_id.into(),
            status: AccountStatus::Complete,
            has_pending_requirements: false,
            has_overdue_requirements: false,
            requirements_deadline: None,
            is_live: true,
            is_in_test_mode: false,
            is_card_present_eligible: true,
            statement_descriptor: None,
            default_currency: default_currency(),
        }
    }

    /// Live account while the plugin itself runs in test mode.
    pub fn has_test_mode_mismatch(&self) -> bool {
        self.is_live && self.is_in_test_mode
    }
}
