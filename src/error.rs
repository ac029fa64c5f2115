use crate::domain::payment::PaymentIntentStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CardPresentError>;

/// Store configuration problems the backend reports with a recognized code.
///
/// These are surfaced separately so callers can show an actionable message
/// ("fix your store address") instead of a generic failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReaderConfigError {
    #[error("the store address is incomplete")]
    IncompleteStoreAddress { admin_url: Option<String> },
    #[error("the store postal code is invalid")]
    InvalidPostalCode,
}

#[derive(Error, Debug)]
pub enum CardPresentError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Backend error {code}: {message}")]
    Backend { code: String, message: String },
    #[error("Store configuration error: {0}")]
    Configuration(ReaderConfigError),
    #[error("Card reader error: {0}")]
    Hardware(String),
    #[error("Payment intent {intent_id} was not captured (status: {status})")]
    CaptureStatusMismatch {
        intent_id: String,
        status: PaymentIntentStatus,
    },
    #[error("Payment was canceled")]
    PaymentCanceled,
    #[error("Operation rejected: {0}")]
    Busy(&'static str),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration file error: {0}")]
    Config(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{0}")]
    Generic(String),
}

impl CardPresentError {
    /// Maps a backend error code to the most specific error variant.
    pub fn from_backend(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let message = message.into();
        match code.as_str() {
            "store_address_is_incomplete" => {
                // The backend puts the settings URL in the message for this code.
                let admin_url = Some(message)
                    .filter(|m| m.starts_with("http://") || m.starts_with("https://"));
                Self::Configuration(ReaderConfigError::IncompleteStoreAddress { admin_url })
            }
            "postal_code_invalid" => Self::Configuration(ReaderConfigError::InvalidPostalCode),
            _ => Self::Backend { code, message },
        }
    }
}

impl From<reqwest::Error> for CardPresentError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for CardPresentError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
