use serde::{Deserialize, Serialize};

/// Card reader hardware models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderType {
    Chipper2X,
    StripeM2,
    WisePad3,
    Other,
}

impl ReaderType {
    /// Models the app knows how to drive.
    pub const SUPPORTED: [ReaderType; 3] =
        [ReaderType::Chipper2X, ReaderType::StripeM2, ReaderType::WisePad3];

    pub fn is_supported(&self) -> bool {
        Self::SUPPORTED.contains(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    NotConnected,
    Connecting,
    Connected,
}

/// A card reader seen by the hardware adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardReader {
    pub serial: String,
    pub reader_type: ReaderType,
    pub connection_state: ConnectionState,
    pub battery_level: Option<f32>,
    pub software_version: Option<String>,
}

impl CardReader {
    pub fn new(serial: impl Into<String>, reader_type: ReaderType) -> Self {
        Self {
            serial: serial.into(),
            reader_type,
            connection_state: ConnectionState::NotConnected,
            battery_level: None,
            software_version: None,
        }
    }
}

/// Keeps only readers of supported models.
pub fn supported_readers(readers: Vec<CardReader>) -> Vec<CardReader> {
    readers
        .into_iter()
        .filter(|r| r.reader_type.is_supported())
        .collect()
}

/// Status messages a reader emits while collecting a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "message", rename_all = "snake_case")]
pub enum ReaderEvent {
    WaitingForInput,
    InsertCard,
    SwipeCard,
    RemoveCard,
    CardRemoved,
    Processing,
    DisplayMessage(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SoftwareUpdateEvent {
    Available { version: String },
    Started,
    Progress { fraction: f32 },
    Completed,
    Failed { reason: String },
}
