use crate::config::OnboardingConfig;
use crate::domain::SiteId;
use crate::domain::account::{AccountStatus, PaymentGatewayAccount};
use crate::domain::onboarding::OnboardingState;
use crate::domain::plugin::{PaymentPlugin, SitePlugin, parse_plugin_version};
use crate::domain::ports::{GatewayAccountStoreRef, PluginStoreRef, SiteSettingStoreRef};
use crate::domain::setting::{CountryCode, DEFAULT_COUNTRY_KEY};
use crate::error::{CardPresentError, Result};
use semver::Version;
use std::collections::HashSet;
use tracing::debug;

/// Cached records for one site, as read by the evaluator.
#[derive(Debug, Clone, Default)]
pub struct OnboardingInputs {
    /// Raw store location, e.g. `US:CA`.
    pub country: Option<String>,
    pub plugins: Vec<SitePlugin>,
    pub accounts: Vec<PaymentGatewayAccount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PluginStatus {
    NotInstalled,
    NotActivated,
    UnsupportedVersion,
    Ready,
}

/// Countries and plugin versions that qualify for card-present payments.
#[derive(Debug, Clone)]
pub struct OnboardingRules {
    supported_countries: HashSet<String>,
    wcpay_min_version: Version,
    stripe_min_version: Version,
}

impl OnboardingRules {
    pub fn new(
        supported_countries: impl IntoIterator<Item = impl AsRef<str>>,
        wcpay_min_version: Version,
        stripe_min_version: Version,
    ) -> Self {
        Self {
            supported_countries: supported_countries
                .into_iter()
                .map(|c| c.as_ref().trim().to_ascii_uppercase())
                .collect(),
            wcpay_min_version,
            stripe_min_version,
        }
    }

    pub fn from_config(config: &OnboardingConfig) -> Result<Self> {
        let version = |raw: &str| {
            parse_plugin_version(raw).ok_or_else(|| {
                CardPresentError::Config(format!("invalid minimum plugin version '{raw}'"))
            })
        };
        Ok(Self::new(
            &config.supported_countries,
            version(&config.wcpay_min_version)?,
            version(&config.stripe_min_version)?,
        ))
    }

    pub fn supports_country(&self, country: &CountryCode) -> bool {
        self.supported_countries.contains(country.as_str())
    }

    pub fn min_version(&self, plugin: PaymentPlugin) -> &Version {
        match plugin {
            PaymentPlugin::WcPay => &self.wcpay_min_version,
            PaymentPlugin::Stripe => &self.stripe_min_version,
        }
    }
}

impl Default for OnboardingRules {
    fn default() -> Self {
        Self::new(["US", "CA"], Version::new(3, 2, 1), Version::new(5, 9, 0))
    }
}

/// Maps cached site records to exactly one [`OnboardingState`].
///
/// Pure and synchronous: all inputs are already-synced local records.
#[derive(Debug, Clone, Default)]
pub struct OnboardingEvaluator {
    rules: OnboardingRules,
}

impl OnboardingEvaluator {
    pub fn new(rules: OnboardingRules) -> Self {
        Self { rules }
    }

    pub fn evaluate(&self, inputs: &OnboardingInputs) -> OnboardingState {
        let Some(country) = inputs.country.as_deref().and_then(CountryCode::parse) else {
            return OnboardingState::GenericError;
        };
        if !self.rules.supports_country(&country) {
            return OnboardingState::CountryNotSupported { country };
        }

        let wcpay = self.plugin_status(PaymentPlugin::WcPay, &inputs.plugins);
        let stripe = self.plugin_status(PaymentPlugin::Stripe, &inputs.plugins);
        debug!(?wcpay, ?stripe, "plugin status");

        use PluginStatus::*;
        match (wcpay, stripe) {
            (NotInstalled, NotInstalled) => OnboardingState::PluginNotInstalled,
            (Ready, Ready) => OnboardingState::SelectPlugin,
            (Ready, _) => account_state(PaymentPlugin::WcPay, &inputs.accounts),
            (_, Ready) => account_state(PaymentPlugin::Stripe, &inputs.accounts),
            (NotActivated, _) => OnboardingState::PluginNotActivated {
                plugin: PaymentPlugin::WcPay,
            },
            (UnsupportedVersion, _) => OnboardingState::PluginUnsupportedVersion {
                plugin: PaymentPlugin::WcPay,
            },
            (NotInstalled, NotActivated) => OnboardingState::PluginNotActivated {
                plugin: PaymentPlugin::Stripe,
            },
            (NotInstalled, UnsupportedVersion) => OnboardingState::PluginUnsupportedVersion {
                plugin: PaymentPlugin::Stripe,
            },
        }
    }

    fn plugin_status(&self, plugin: PaymentPlugin, plugins: &[SitePlugin]) -> PluginStatus {
        let Some(cached) = plugins.iter().find(|p| p.plugin == plugin.slug()) else {
            return PluginStatus::NotInstalled;
        };
        if !cached.is_enabled() {
            return PluginStatus::NotActivated;
        }
        match parse_plugin_version(&cached.version) {
            Some(version) if &version >= self.rules.min_version(plugin) => PluginStatus::Ready,
            _ => PluginStatus::UnsupportedVersion,
        }
    }
}

fn account_state(plugin: PaymentPlugin, accounts: &[PaymentGatewayAccount]) -> OnboardingState {
    let Some(account) = accounts.iter().find(|a| a.gateway_id == plugin.gateway_id()) else {
        return OnboardingState::PluginSetupNotCompleted;
    };

    let status = account.status;
    if status == AccountStatus::NoAccount {
        return OnboardingState::PluginSetupNotCompleted;
    }
    if status.is_rejected() {
        return OnboardingState::StripeAccountRejected;
    }
    if status.is_restricted() {
        // Overdue wins over pending.
        return if account.has_overdue_requirements {
            OnboardingState::StripeAccountOverdueRequirement
        } else if account.has_pending_requirements {
            OnboardingState::StripeAccountPendingRequirement {
                deadline: account.requirements_deadline,
            }
        } else {
            OnboardingState::StripeAccountUnderReview
        };
    }
    if status == AccountStatus::Unknown || !account.is_card_present_eligible {
        return OnboardingState::GenericError;
    }
    if account.has_test_mode_mismatch() {
        return OnboardingState::PluginInTestModeWithLiveAccount;
    }
    OnboardingState::Completed
}

/// Reads a site's cached records and runs the evaluator over them.
pub struct OnboardingService {
    evaluator: OnboardingEvaluator,
    plugins: PluginStoreRef,
    accounts: GatewayAccountStoreRef,
    settings: SiteSettingStoreRef,
}

impl OnboardingService {
    pub fn new(
        evaluator: OnboardingEvaluator,
        plugins: PluginStoreRef,
        accounts: GatewayAccountStoreRef,
        settings: SiteSettingStoreRef,
    ) -> Self {
        Self {
            evaluator,
            plugins,
            accounts,
            settings,
        }
    }

    pub async fn state(&self, site_id: SiteId) -> Result<OnboardingState> {
        let inputs = OnboardingInputs {
            country: self
                .settings
                .setting(site_id, DEFAULT_COUNTRY_KEY)
                .await?
                .map(|s| s.value),
            plugins: self.plugins.plugins(site_id).await?,
            accounts: self.accounts.accounts(site_id).await?,
        };
        let state = self.evaluator.evaluate(&inputs);
        debug!(site_id, ?state, "onboarding state evaluated");
        Ok(state)
    }
}
