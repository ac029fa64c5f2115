use super::token_provider::SiteConnectionTokenProvider;
use crate::domain::payment::{PaymentIntent, PaymentIntentStatus, PaymentParameters};
use crate::domain::plugin::PaymentPlugin;
use crate::domain::ports::{CardReaderServiceRef, PaymentGatewayRemoteRef};
use crate::domain::reader::{CardReader, ReaderEvent, SoftwareUpdateEvent, supported_readers};
use crate::domain::{OrderId, SiteId};
use crate::error::{CardPresentError, Result};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Coarse state of a coordinator, derived from what it is tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Discovering,
    Connecting,
    Connected,
    CapturingPayment,
}

/// Handle to a long-lived observation task. Dropping it unsubscribes.
#[must_use = "dropping a Subscription ends it immediately"]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            task: tokio::spawn(future),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Backend clients for both supported plugins.
#[derive(Clone)]
pub struct GatewayRemotes {
    wcpay: PaymentGatewayRemoteRef,
    stripe: PaymentGatewayRemoteRef,
}

impl GatewayRemotes {
    pub fn new(wcpay: PaymentGatewayRemoteRef, stripe: PaymentGatewayRemoteRef) -> Self {
        Self { wcpay, stripe }
    }

    pub fn get(&self, plugin: PaymentPlugin) -> PaymentGatewayRemoteRef {
        match plugin {
            PaymentPlugin::WcPay => self.wcpay.clone(),
            PaymentPlugin::Stripe => self.stripe.clone(),
        }
    }
}

struct PaymentOperation {
    id: u64,
    cancel: oneshot::Sender<()>,
}

#[derive(Default)]
struct Tracking {
    discovery: Option<Subscription>,
    payment: Option<PaymentOperation>,
    connecting: bool,
    next_operation: u64,
}

impl Tracking {
    fn discovering(&self) -> bool {
        self.discovery.as_ref().is_some_and(Subscription::is_active)
    }
}

/// Turns the card reader adapter's continuous streams into discrete
/// operations, with at most one discovery and one capture in flight.
///
/// The coordinator expects to be the only owner of its adapter. Streaming
/// operations spawn onto the current Tokio runtime.
pub struct CardPresentPaymentCoordinator {
    reader: CardReaderServiceRef,
    remotes: GatewayRemotes,
    backend: RwLock<PaymentPlugin>,
    tracking: Mutex<Tracking>,
}

/// Releases the capture slot when a `collect_payment` call ends, including
/// when its future is dropped.
struct PaymentSlot<'a> {
    coordinator: &'a CardPresentPaymentCoordinator,
    id: u64,
}

impl Drop for PaymentSlot<'_> {
    fn drop(&mut self) {
        let mut tracking = self.coordinator.tracking();
        if tracking.payment.as_ref().is_some_and(|op| op.id == self.id) {
            tracking.payment = None;
        }
    }
}

impl CardPresentPaymentCoordinator {
    pub fn new(
        reader: CardReaderServiceRef,
        remotes: GatewayRemotes,
        backend: PaymentPlugin,
    ) -> Self {
        Self {
            reader,
            remotes,
            backend: RwLock::new(backend),
            tracking: Mutex::new(Tracking::default()),
        }
    }

    fn tracking(&self) -> MutexGuard<'_, Tracking> {
        self.tracking.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn active_backend(&self) -> PaymentPlugin {
        *self.backend.read().await
    }

    async fn active_remote(&self) -> PaymentGatewayRemoteRef {
        self.remotes.get(*self.backend.read().await)
    }

    pub fn phase(&self) -> SessionPhase {
        let tracking = self.tracking();
        if tracking.payment.is_some() {
            SessionPhase::CapturingPayment
        } else if tracking.discovering() {
            SessionPhase::Discovering
        } else if tracking.connecting {
            SessionPhase::Connecting
        } else if self.reader.connected_readers().borrow().is_empty() {
            SessionPhase::Idle
        } else {
            SessionPhase::Connected
        }
    }

    /// Starts the adapter for `site_id` and reports discovered readers of
    /// supported models, one call per batch.
    ///
    /// `on_error` fires at most once, after which the subscription ends.
    pub async fn start_discovery<F, E>(
        &self,
        site_id: SiteId,
        mut on_reader_found: F,
        on_error: E,
    ) -> Result<()>
    where
        F: FnMut(Vec<CardReader>) + Send + 'static,
        E: FnOnce(CardPresentError) + Send + 'static,
    {
        let remote = self.active_remote().await;
        let mut tracking = self.tracking();
        if tracking.payment.is_some() {
            return Err(CardPresentError::Busy("a payment is being collected"));
        }

        let provider = Arc::new(SiteConnectionTokenProvider::new(site_id, remote));
        self.reader.start(provider)?;
        let mut batches = self.reader.discovered_readers();

        if tracking.discovery.take().is_some() {
            warn!("replacing active discovery subscription");
        }
        tracking.discovery = Some(Subscription::spawn(async move {
            while let Some(batch) = batches.recv().await {
                match batch {
                    Ok(readers) => on_reader_found(supported_readers(readers)),
                    Err(err) => {
                        on_error(err);
                        return;
                    }
                }
            }
        }));
        debug!(site_id, "reader discovery started");
        Ok(())
    }

    pub async fn cancel_discovery(&self) -> Result<()> {
        let discovery = self.tracking().discovery.take();
        drop(discovery);
        self.reader.cancel_discovery().await
    }

    /// Connects to a discovered reader. Ends the discovery subscription.
    pub async fn connect(&self, reader: CardReader) -> Result<CardReader> {
        {
            let mut tracking = self.tracking();
            tracking.discovery = None;
            tracking.connecting = true;
        }
        debug!(serial = %reader.serial, "connecting to reader");
        let result = self.reader.connect(reader).await;
        self.tracking().connecting = false;
        result
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.reader.disconnect().await
    }

    /// Calls `on_update` with the current connected set and again on every change.
    pub fn observe_connected_readers<F>(&self, mut on_update: F) -> Subscription
    where
        F: FnMut(Vec<CardReader>) + Send + 'static,
    {
        let mut connected = self.reader.connected_readers();
        Subscription::spawn(async move {
            loop {
                let readers = connected.borrow_and_update().clone();
                on_update(readers);
                if connected.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    pub fn observe_software_updates<F>(&self, mut on_event: F) -> Subscription
    where
        F: FnMut(SoftwareUpdateEvent) + Send + 'static,
    {
        let mut events = self.reader.software_update_events();
        Subscription::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => on_event(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "software update events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub async fn install_update(&self) -> Result<()> {
        self.reader.install_update().await
    }

    /// Collects a card payment for `order_id` on the connected reader.
    ///
    /// Reader events are passed to `on_reader_message` in emission order, all
    /// before this call returns. Starting a capture cancels one already in
    /// flight; a canceled capture resolves to [`CardPresentError::PaymentCanceled`].
    pub async fn collect_payment<F>(
        &self,
        site_id: SiteId,
        order_id: OrderId,
        parameters: PaymentParameters,
        mut on_reader_message: F,
    ) -> Result<PaymentIntent>
    where
        F: FnMut(ReaderEvent) + Send,
    {
        let remote = self.active_remote().await;
        let (slot, mut canceled) = self.begin_payment()?;
        debug!(order_id, operation = slot.id, "collecting payment");

        let outcome = self
            .run_capture(
                remote,
                site_id,
                order_id,
                parameters,
                &mut on_reader_message,
                &mut canceled,
            )
            .await;
        drop(slot);

        match &outcome {
            Ok(intent) => debug!(
                order_id,
                intent = %intent.id,
                status = %intent.status,
                "payment collected"
            ),
            Err(err) => debug!(order_id, error = %err, "payment collection ended"),
        }
        outcome
    }

    fn begin_payment(&self) -> Result<(PaymentSlot<'_>, oneshot::Receiver<()>)> {
        let mut tracking = self.tracking();
        if tracking.discovering() {
            return Err(CardPresentError::Busy("reader discovery is in progress"));
        }

        let (cancel, canceled) = oneshot::channel();
        tracking.next_operation += 1;
        let id = tracking.next_operation;
        if let Some(previous) = tracking.payment.replace(PaymentOperation { id, cancel }) {
            warn!(previous = previous.id, "replacing in-flight payment capture");
            let _ = previous.cancel.send(());
        }

        Ok((
            PaymentSlot {
                coordinator: self,
                id,
            },
            canceled,
        ))
    }

    async fn run_capture<F>(
        &self,
        remote: PaymentGatewayRemoteRef,
        site_id: SiteId,
        order_id: OrderId,
        mut parameters: PaymentParameters,
        on_reader_message: &mut F,
        canceled: &mut oneshot::Receiver<()>,
    ) -> Result<PaymentIntent>
    where
        F: FnMut(ReaderEvent) + Send,
    {
        // Subscribe before anything can emit so no event is missed.
        let mut events = self.reader.reader_events();

        if parameters.customer_id.is_none() {
            let customer = tokio::select! {
                biased;
                _ = &mut *canceled => return Err(CardPresentError::PaymentCanceled),
                customer = remote.fetch_order_customer(site_id, order_id) => customer?,
            };
            parameters.customer_id = Some(customer.id);
        }

        let capture = self.reader.capture_payment(parameters);
        tokio::pin!(capture);
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;
                _ = &mut *canceled => return Err(CardPresentError::PaymentCanceled),
                event = events.recv(), if events_open => match event {
                    Ok(event) => on_reader_message(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "reader events lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
                result = &mut capture => {
                    drain_events(&mut events, on_reader_message);
                    return result;
                }
            }
        }
    }

    /// Cancels the tracked capture, then asks the hardware to cancel its
    /// payment intent. A no-op when nothing is in flight.
    pub async fn cancel_payment(&self) -> Result<()> {
        let in_flight = self.tracking().payment.take();
        let Some(operation) = in_flight else {
            debug!("no payment in flight to cancel");
            return Ok(());
        };
        let _ = operation.cancel.send(());
        debug!(operation = operation.id, "payment capture canceled");
        self.reader.cancel_payment_intent().await
    }

    /// Emits the empty set if no reader is connected yet, then the connected
    /// set once a reader connects, then closes.
    pub fn check_card_reader_connected(&self) -> mpsc::Receiver<Vec<CardReader>> {
        let mut connected = self.reader.connected_readers();
        let (tx, rx) = mpsc::channel(2);
        tokio::spawn(async move {
            let mut announced_empty = false;
            loop {
                let readers = connected.borrow_and_update().clone();
                if !readers.is_empty() {
                    let _ = tx.send(readers).await;
                    return;
                }
                if !announced_empty {
                    if tx.send(Vec::new()).await.is_err() {
                        return;
                    }
                    announced_empty = true;
                }
                tokio::select! {
                    changed = connected.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    _ = tx.closed() => return,
                }
            }
        });
        rx
    }

    /// Confirms a collected payment with the backend.
    ///
    /// An intent that comes back in any status other than `succeeded` is a
    /// capture failure, distinct from a transport error.
    pub async fn capture_order_payment(
        &self,
        site_id: SiteId,
        order_id: OrderId,
        payment_intent_id: &str,
    ) -> Result<PaymentIntent> {
        let remote = self.active_remote().await;
        confirm_capture(&remote, site_id, order_id, payment_intent_id).await
    }

    /// Drops tracked operations, disconnects and clears the adapter.
    ///
    /// The adapter is cleared even when the disconnect fails; the disconnect
    /// error is returned afterwards.
    pub async fn reset(&self) -> Result<()> {
        self.release_operations();
        let disconnected = self.reader.disconnect().await;
        self.reader.clear().await?;
        disconnected
    }

    fn release_operations(&self) {
        let mut tracking = self.tracking();
        tracking.discovery = None;
        tracking.connecting = false;
        if let Some(operation) = tracking.payment.take() {
            let _ = operation.cancel.send(());
        }
    }

    /// Makes `plugin` the active backend.
    ///
    /// The selector stays locked until the reset completes, so no operation
    /// can start against either backend in between. A failed reset leaves the
    /// previous backend active.
    pub async fn switch_backend(&self, plugin: PaymentPlugin) -> Result<()> {
        let mut backend = self.backend.write().await;
        if *backend == plugin {
            return Ok(());
        }
        self.reset().await?;
        let previous = std::mem::replace(&mut *backend, plugin);
        info!(from = %previous, to = %plugin, "switched payment backend");
        Ok(())
    }
}

/// Asks `remote` to capture an order's payment intent and checks that it
/// came back `succeeded`.
pub async fn confirm_capture(
    remote: &PaymentGatewayRemoteRef,
    site_id: SiteId,
    order_id: OrderId,
    payment_intent_id: &str,
) -> Result<PaymentIntent> {
    let intent = remote
        .capture_order_payment(site_id, order_id, payment_intent_id)
        .await?;
    if intent.status != PaymentIntentStatus::Succeeded {
        return Err(CardPresentError::CaptureStatusMismatch {
            intent_id: intent.id,
            status: intent.status,
        });
    }
    Ok(intent)
}

fn drain_events<F>(events: &mut broadcast::Receiver<ReaderEvent>, on_reader_message: &mut F)
where
    F: FnMut(ReaderEvent),
{
    loop {
        match events.try_recv() {
            Ok(event) => on_reader_message(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "reader events lagged");
            }
            Err(_) => break,
        }
    }
}
