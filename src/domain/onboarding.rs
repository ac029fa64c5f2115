use super::plugin::PaymentPlugin;
use super::setting::CountryCode;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where a site stands on the way to accepting in-person card payments.
///
/// Computed on demand from cached records and never persisted. Every state
/// other than `Completed` blocks use of the card reader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum OnboardingState {
    GenericError,
    CountryNotSupported { country: CountryCode },
    PluginNotInstalled,
    PluginNotActivated { plugin: PaymentPlugin },
    PluginUnsupportedVersion { plugin: PaymentPlugin },
    PluginSetupNotCompleted,
    PluginInTestModeWithLiveAccount,
    StripeAccountUnderReview,
    StripeAccountPendingRequirement { deadline: Option<DateTime<Utc>> },
    StripeAccountOverdueRequirement,
    StripeAccountRejected,
    /// Both plugins are ready; the merchant has to pick one.
    SelectPlugin,
    Completed,
}

impl OnboardingState {
    pub fn is_completed(&self) -> bool {
        matches!(self, OnboardingState::Completed)
    }
}
