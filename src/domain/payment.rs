use crate::error::CardPresentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A positive monetary amount to charge.
///
/// Ensures that capture requests never carry zero or negative totals.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, CardPresentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(CardPresentError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

/// Currencies the card networks settle without a minor unit.
const ZERO_DECIMAL_CURRENCIES: [&str; 16] = [
    "bif", "clp", "djf", "gnf", "jpy", "kmf", "krw", "mga", "pyg", "rwf", "ugx", "vnd", "vuv",
    "xaf", "xof", "xpf",
];

/// Decimal places of a currency's minor unit.
pub fn currency_exponent(currency: &str) -> u32 {
    let currency = currency.to_ascii_lowercase();
    if ZERO_DECIMAL_CURRENCIES.contains(&currency.as_str()) {
        0
    } else {
        2
    }
}

/// Converts a backend amount in minor units into a decimal amount.
pub fn from_minor_units(amount: i64, currency: &str) -> Decimal {
    Decimal::new(amount, currency_exponent(currency))
}

impl TryFrom<Decimal> for Amount {
    type Error = CardPresentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Everything the reader needs to start collecting a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentParameters {
    pub amount: Amount,
    /// Lower-case ISO 4217 code.
    pub currency: String,
    pub receipt_description: Option<String>,
    pub statement_description: Option<String>,
    pub receipt_email: Option<String>,
    pub customer_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PaymentParameters {
    pub fn new(amount: Amount, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into().to_ascii_lowercase(),
            receipt_description: None,
            statement_description: None,
            receipt_email: None,
            customer_id: None,
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresCapture,
    Processing,
    Canceled,
    Succeeded,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentIntentStatus::RequiresPaymentMethod => "requires_payment_method",
            PaymentIntentStatus::RequiresConfirmation => "requires_confirmation",
            PaymentIntentStatus::RequiresCapture => "requires_capture",
            PaymentIntentStatus::Processing => "processing",
            PaymentIntentStatus::Canceled => "canceled",
            PaymentIntentStatus::Succeeded => "succeeded",
            PaymentIntentStatus::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Result of one capture attempt. Lives only for the duration of the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub status: PaymentIntentStatus,
    pub created: DateTime<Utc>,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
}

/// Short-lived secret the reader SDK uses to talk to the payment processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionToken {
    #[serde(rename = "secret")]
    pub token: String,
    #[serde(default)]
    pub test_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderLocation {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub livemode: bool,
}
