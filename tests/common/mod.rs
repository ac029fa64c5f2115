#![allow(dead_code)]

use async_trait::async_trait;
use card_present::domain::account::PaymentGatewayAccount;
use card_present::domain::payment::{
    ConnectionToken, Customer, PaymentIntent, PaymentIntentStatus, PaymentParameters,
    ReaderLocation,
};
use card_present::domain::ports::{
    CardReaderService, ConnectionTokenProvider, PaymentGatewayRemote,
};
use card_present::domain::reader::{
    CardReader, ConnectionState, ReaderEvent, SoftwareUpdateEvent,
};
use card_present::domain::{OrderId, SiteId};
use card_present::error::{CardPresentError, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, broadcast, mpsc, watch};

/// Scriptable stand-in for the card reader SDK adapter.
///
/// Every trait call is recorded by name so tests can assert ordering.
pub struct FakeCardReader {
    calls: Mutex<Vec<&'static str>>,
    discovered: Mutex<Option<mpsc::Sender<Result<Vec<CardReader>>>>>,
    connected: watch::Sender<Vec<CardReader>>,
    events: broadcast::Sender<ReaderEvent>,
    updates: broadcast::Sender<SoftwareUpdateEvent>,
    capture_script: Mutex<Vec<ReaderEvent>>,
    captured_parameters: Mutex<Vec<PaymentParameters>>,
    hold_next_capture: AtomicBool,
    release: Notify,
    capture_started: Notify,
    fail_start: AtomicBool,
    fail_disconnect: AtomicBool,
    token_provider: Mutex<Option<Arc<dyn ConnectionTokenProvider>>>,
}

impl FakeCardReader {
    pub fn new() -> Self {
        let (connected, _) = watch::channel(Vec::new());
        let (events, _) = broadcast::channel(64);
        let (updates, _) = broadcast::channel(16);
        Self {
            calls: Mutex::new(Vec::new()),
            discovered: Mutex::new(None),
            connected,
            events,
            updates,
            capture_script: Mutex::new(Vec::new()),
            captured_parameters: Mutex::new(Vec::new()),
            hold_next_capture: AtomicBool::new(false),
            release: Notify::new(),
            capture_started: Notify::new(),
            fail_start: AtomicBool::new(false),
            fail_disconnect: AtomicBool::new(false),
            token_provider: Mutex::new(None),
        }
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Pushes one discovery batch to the most recent discovery stream.
    pub async fn emit_discovered(&self, batch: Result<Vec<CardReader>>) -> bool {
        let sender = self.discovered.lock().unwrap().clone();
        match sender {
            Some(tx) => tx.send(batch).await.is_ok(),
            None => false,
        }
    }

    /// Events emitted, in order, at the start of every capture.
    pub fn script_capture_events(&self, events: Vec<ReaderEvent>) {
        *self.capture_script.lock().unwrap() = events;
    }

    /// The next capture blocks until [`FakeCardReader::release_capture`].
    pub fn hold_next_capture(&self) {
        self.hold_next_capture.store(true, Ordering::SeqCst);
    }

    pub fn release_capture(&self) {
        self.release.notify_one();
    }

    pub async fn wait_capture_started(&self) {
        self.capture_started.notified().await;
    }

    pub fn captured_parameters(&self) -> Vec<PaymentParameters> {
        self.captured_parameters.lock().unwrap().clone()
    }

    pub fn fail_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    pub fn fail_disconnect(&self) {
        self.fail_disconnect.store(true, Ordering::SeqCst);
    }

    /// Provider handed over by the last `start` call.
    pub fn token_provider(&self) -> Option<Arc<dyn ConnectionTokenProvider>> {
        self.token_provider.lock().unwrap().clone()
    }

    pub fn emit_update(&self, event: SoftwareUpdateEvent) {
        let _ = self.updates.send(event);
    }
}

#[async_trait]
impl CardReaderService for FakeCardReader {
    fn start(&self, token_provider: Arc<dyn ConnectionTokenProvider>) -> Result<()> {
        self.record("start");
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(CardPresentError::Hardware("terminal not initialized".into()));
        }
        *self.token_provider.lock().unwrap() = Some(token_provider);
        Ok(())
    }

    fn discovered_readers(&self) -> mpsc::Receiver<Result<Vec<CardReader>>> {
        let (tx, rx) = mpsc::channel(8);
        *self.discovered.lock().unwrap() = Some(tx);
        rx
    }

    async fn cancel_discovery(&self) -> Result<()> {
        self.record("cancel_discovery");
        self.discovered.lock().unwrap().take();
        Ok(())
    }

    async fn connect(&self, mut reader: CardReader) -> Result<CardReader> {
        self.record("connect");
        tokio::time::sleep(Duration::from_millis(5)).await;
        reader.connection_state = ConnectionState::Connected;
        self.connected.send_replace(vec![reader.clone()]);
        Ok(reader)
    }

    async fn disconnect(&self) -> Result<()> {
        self.record("disconnect");
        self.connected.send_replace(Vec::new());
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(CardPresentError::Hardware("reader busy".into()));
        }
        Ok(())
    }

    fn connected_readers(&self) -> watch::Receiver<Vec<CardReader>> {
        self.connected.subscribe()
    }

    async fn capture_payment(&self, parameters: PaymentParameters) -> Result<PaymentIntent> {
        self.record("capture_payment");
        self.captured_parameters.lock().unwrap().push(parameters.clone());
        self.capture_started.notify_one();

        let script = self.capture_script.lock().unwrap().clone();
        for event in script {
            let _ = self.events.send(event);
        }
        if self.hold_next_capture.swap(false, Ordering::SeqCst) {
            self.release.notified().await;
        }

        Ok(intent(
            "pi_collected",
            PaymentIntentStatus::RequiresCapture,
            parameters.amount.value(),
            &parameters.currency,
        ))
    }

    async fn cancel_payment_intent(&self) -> Result<()> {
        self.record("cancel_payment_intent");
        Ok(())
    }

    fn reader_events(&self) -> broadcast::Receiver<ReaderEvent> {
        self.events.subscribe()
    }

    fn software_update_events(&self) -> broadcast::Receiver<SoftwareUpdateEvent> {
        self.updates.subscribe()
    }

    async fn install_update(&self) -> Result<()> {
        self.record("install_update");
        let _ = self.updates.send(SoftwareUpdateEvent::Started);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.record("clear");
        Ok(())
    }
}

pub fn intent(
    id: &str,
    status: PaymentIntentStatus,
    amount: rust_decimal::Decimal,
    currency: &str,
) -> PaymentIntent {
    PaymentIntent {
        id: id.to_string(),
        status,
        created: Utc::now(),
        amount,
        currency: currency.to_string(),
        metadata: BTreeMap::new(),
    }
}

/// Backend double for one payment plugin.
pub struct FakeGatewayRemote {
    pub name: &'static str,
    pub capture_status: Mutex<PaymentIntentStatus>,
    pub customer_delay: Mutex<Duration>,
    pub customer_calls: AtomicUsize,
    pub token_calls: AtomicUsize,
}

impl FakeGatewayRemote {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            capture_status: Mutex::new(PaymentIntentStatus::Succeeded),
            customer_delay: Mutex::new(Duration::ZERO),
            customer_calls: AtomicUsize::new(0),
            token_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PaymentGatewayRemote for FakeGatewayRemote {
    async fn load_account(&self, site_id: SiteId) -> Result<PaymentGatewayAccount> {
        Ok(PaymentGatewayAccount::new(site_id, self.name))
    }

    async fn fetch_order_customer(&self, _site_id: SiteId, order_id: OrderId) -> Result<Customer> {
        self.customer_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.customer_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        Ok(Customer {
            id: format!("cus_{order_id}"),
        })
    }

    async fn capture_order_payment(
        &self,
        _site_id: SiteId,
        _order_id: OrderId,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent> {
        let status = *self.capture_status.lock().unwrap();
        Ok(intent(payment_intent_id, status, rust_decimal::Decimal::new(1000, 2), "usd"))
    }

    async fn load_connection_token(&self, _site_id: SiteId) -> Result<ConnectionToken> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ConnectionToken {
            token: format!("{}_token", self.name),
            test_mode: true,
        })
    }

    async fn load_default_reader_location(&self, _site_id: SiteId) -> Result<ReaderLocation> {
        Ok(ReaderLocation {
            id: "tml_1".to_string(),
            display_name: "Main street".to_string(),
            livemode: false,
        })
    }
}

pub fn write_plugins_csv(path: &Path, rows: &[[&str; 6]]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record([
        "site_id",
        "plugin",
        "display_name",
        "version",
        "is_active",
        "is_network_active",
    ])?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_accounts_csv(path: &Path, rows: &[[&str; 9]]) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record([
        "site_id",
        "gateway_id",
        "status",
        "has_pending_requirements",
        "has_overdue_requirements",
        "requirements_deadline",
        "is_live",
        "is_in_test_mode",
        "is_card_present_eligible",
    ])?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
