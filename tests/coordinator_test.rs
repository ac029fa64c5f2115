mod common;

use card_present::application::coordinator::{
    CardPresentPaymentCoordinator, GatewayRemotes, SessionPhase,
};
use card_present::domain::payment::{Amount, PaymentIntentStatus, PaymentParameters};
use card_present::domain::plugin::PaymentPlugin;
use card_present::domain::ports::ConnectionTokenProvider;
use card_present::domain::reader::{CardReader, ReaderEvent, ReaderType, SoftwareUpdateEvent};
use card_present::error::CardPresentError;
use common::{FakeCardReader, FakeGatewayRemote};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

const SITE: i64 = 42;
const ORDER: i64 = 1001;

struct Harness {
    coordinator: Arc<CardPresentPaymentCoordinator>,
    reader: Arc<FakeCardReader>,
    wcpay: Arc<FakeGatewayRemote>,
    stripe: Arc<FakeGatewayRemote>,
}

fn harness() -> Harness {
    let reader = Arc::new(FakeCardReader::new());
    let wcpay = Arc::new(FakeGatewayRemote::new("woocommerce-payments"));
    let stripe = Arc::new(FakeGatewayRemote::new("woocommerce-gateway-stripe"));
    let coordinator = Arc::new(CardPresentPaymentCoordinator::new(
        reader.clone(),
        GatewayRemotes::new(wcpay.clone(), stripe.clone()),
        PaymentPlugin::WcPay,
    ));
    Harness {
        coordinator,
        reader,
        wcpay,
        stripe,
    }
}

fn parameters() -> PaymentParameters {
    PaymentParameters::new(Amount::new(dec!(10.00)).unwrap(), "USD")
}

async fn wait_for_phase(coordinator: &CardPresentPaymentCoordinator, phase: SessionPhase) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while coordinator.phase() != phase {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("phase never reached");
}

#[tokio::test]
async fn test_discovery_reports_only_supported_readers() {
    let h = harness();
    let (tx, mut rx) = mpsc::unbounded_channel();

    h.coordinator
        .start_discovery(SITE, move |readers| tx.send(readers).unwrap(), |_| {})
        .await
        .unwrap();
    assert_eq!(h.coordinator.phase(), SessionPhase::Discovering);

    h.reader
        .emit_discovered(Ok(vec![
            CardReader::new("CHB1", ReaderType::Chipper2X),
            CardReader::new("OLD1", ReaderType::Other),
            CardReader::new("STM2", ReaderType::StripeM2),
        ]))
        .await;

    let batch = rx.recv().await.unwrap();
    let serials: Vec<_> = batch.iter().map(|r| r.serial.as_str()).collect();
    assert_eq!(serials, ["CHB1", "STM2"]);
    assert_eq!(h.reader.calls(), ["start"]);
}

#[tokio::test]
async fn test_discovery_error_fires_once_and_ends_subscription() {
    let h = harness();
    let errors = Arc::new(AtomicUsize::new(0));
    let counter = errors.clone();

    h.coordinator
        .start_discovery(SITE, |_| {}, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

    h.reader
        .emit_discovered(Err(CardPresentError::Hardware("bluetooth off".into())))
        .await;
    wait_for_phase(&h.coordinator, SessionPhase::Idle).await;

    // The stream is gone, so later errors have nowhere to go.
    assert!(
        !h.reader
            .emit_discovered(Err(CardPresentError::Hardware("again".into())))
            .await
    );
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_discovery_start_failure_is_returned() {
    let h = harness();
    h.reader.fail_start();

    let result = h.coordinator.start_discovery(SITE, |_| {}, |_| {}).await;

    assert!(matches!(result, Err(CardPresentError::Hardware(_))));
    assert_eq!(h.coordinator.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_second_discovery_replaces_first() {
    let h = harness();
    let (first_tx, mut first_rx) = mpsc::unbounded_channel();
    let (second_tx, mut second_rx) = mpsc::unbounded_channel();

    h.coordinator
        .start_discovery(SITE, move |readers| first_tx.send(readers).unwrap(), |_| {})
        .await
        .unwrap();
    h.coordinator
        .start_discovery(SITE, move |readers| second_tx.send(readers).unwrap(), |_| {})
        .await
        .unwrap();
    assert_eq!(h.coordinator.phase(), SessionPhase::Discovering);

    assert!(
        h.reader
            .emit_discovered(Ok(vec![CardReader::new("CHB1", ReaderType::Chipper2X)]))
            .await
    );

    let batch = second_rx.recv().await.unwrap();
    assert_eq!(batch[0].serial, "CHB1");

    // The first task was aborted, dropping its callback and the sender inside it.
    let first = tokio::time::timeout(Duration::from_secs(1), first_rx.recv())
        .await
        .expect("first subscription still alive");
    assert!(first.is_none());
    assert_eq!(h.reader.calls(), ["start", "start"]);
}

#[tokio::test]
async fn test_reset_drops_discovery() {
    let h = harness();
    let (tx, mut rx) = mpsc::unbounded_channel();
    h.coordinator
        .start_discovery(SITE, move |readers| tx.send(readers).unwrap(), |_| {})
        .await
        .unwrap();

    h.coordinator.reset().await.unwrap();

    assert_eq!(h.coordinator.phase(), SessionPhase::Idle);
    assert_eq!(h.reader.calls(), ["start", "disconnect", "clear"]);
    let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("discovery subscription still alive");
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_reset_cancels_in_flight_capture() {
    let h = harness();
    h.reader.hold_next_capture();

    let coordinator = h.coordinator.clone();
    let collect = tokio::spawn(async move {
        coordinator
            .collect_payment(SITE, ORDER, parameters(), |_| {})
            .await
    });
    h.reader.wait_capture_started().await;
    assert_eq!(h.coordinator.phase(), SessionPhase::CapturingPayment);

    h.coordinator.reset().await.unwrap();

    assert!(matches!(
        collect.await.unwrap(),
        Err(CardPresentError::PaymentCanceled)
    ));
    assert_eq!(h.coordinator.phase(), SessionPhase::Idle);
    let calls = h.reader.calls();
    assert!(calls.contains(&"disconnect"));
    assert!(calls.contains(&"clear"));
}

#[tokio::test]
async fn test_connect_ends_discovery() {
    let h = harness();
    h.coordinator.start_discovery(SITE, |_| {}, |_| {}).await.unwrap();

    let reader = h
        .coordinator
        .connect(CardReader::new("CHB1", ReaderType::Chipper2X))
        .await
        .unwrap();

    assert_eq!(reader.serial, "CHB1");
    assert_eq!(h.coordinator.phase(), SessionPhase::Connected);
}

#[tokio::test]
async fn test_collect_payment_rejected_while_discovering() {
    let h = harness();
    h.coordinator.start_discovery(SITE, |_| {}, |_| {}).await.unwrap();

    let result = h
        .coordinator
        .collect_payment(SITE, ORDER, parameters(), |_| {})
        .await;

    assert!(matches!(result, Err(CardPresentError::Busy(_))));
    assert!(!h.reader.calls().contains(&"capture_payment"));
}

#[tokio::test]
async fn test_discovery_rejected_while_capturing() {
    let h = harness();
    h.reader.hold_next_capture();

    let coordinator = h.coordinator.clone();
    let collect = tokio::spawn(async move {
        coordinator
            .collect_payment(SITE, ORDER, parameters(), |_| {})
            .await
    });
    h.reader.wait_capture_started().await;

    let result = h.coordinator.start_discovery(SITE, |_| {}, |_| {}).await;
    assert!(matches!(result, Err(CardPresentError::Busy(_))));

    h.reader.release_capture();
    assert!(collect.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_reader_events_arrive_in_order_before_completion() {
    let h = harness();
    let script = vec![
        ReaderEvent::WaitingForInput,
        ReaderEvent::InsertCard,
        ReaderEvent::Processing,
        ReaderEvent::RemoveCard,
        ReaderEvent::CardRemoved,
    ];
    h.reader.script_capture_events(script.clone());

    let mut seen = Vec::new();
    let intent = h
        .coordinator
        .collect_payment(SITE, ORDER, parameters(), |event| seen.push(event))
        .await
        .unwrap();

    assert_eq!(intent.id, "pi_collected");
    assert_eq!(seen, script);
}

#[tokio::test]
async fn test_customer_is_fetched_only_when_missing() {
    let h = harness();

    h.coordinator
        .collect_payment(SITE, ORDER, parameters(), |_| {})
        .await
        .unwrap();
    let mut with_customer = parameters();
    with_customer.customer_id = Some("cus_known".into());
    h.coordinator
        .collect_payment(SITE, ORDER, with_customer, |_| {})
        .await
        .unwrap();

    assert_eq!(h.wcpay.customer_calls.load(Ordering::SeqCst), 1);
    let captured = h.reader.captured_parameters();
    assert_eq!(captured[0].customer_id.as_deref(), Some("cus_1001"));
    assert_eq!(captured[1].customer_id.as_deref(), Some("cus_known"));
}

#[tokio::test]
async fn test_cancel_right_after_collect_never_succeeds() {
    let h = harness();
    h.reader.hold_next_capture();

    let coordinator = h.coordinator.clone();
    let collect = tokio::spawn(async move {
        coordinator
            .collect_payment(SITE, ORDER, parameters(), |_| {})
            .await
    });
    wait_for_phase(&h.coordinator, SessionPhase::CapturingPayment).await;

    h.coordinator.cancel_payment().await.unwrap();
    // Completing the hardware capture afterwards must not change the outcome.
    h.reader.release_capture();

    let result = collect.await.unwrap();
    assert!(matches!(result, Err(CardPresentError::PaymentCanceled)));
    assert!(h.reader.calls().contains(&"cancel_payment_intent"));
    assert_eq!(h.coordinator.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_cancel_during_customer_lookup_skips_capture() {
    let h = harness();
    *h.wcpay.customer_delay.lock().unwrap() = Duration::from_millis(200);

    let coordinator = h.coordinator.clone();
    let collect = tokio::spawn(async move {
        coordinator
            .collect_payment(SITE, ORDER, parameters(), |_| {})
            .await
    });
    wait_for_phase(&h.coordinator, SessionPhase::CapturingPayment).await;
    h.coordinator.cancel_payment().await.unwrap();

    let result = collect.await.unwrap();
    assert!(matches!(result, Err(CardPresentError::PaymentCanceled)));
    assert!(!h.reader.calls().contains(&"capture_payment"));
}

#[tokio::test]
async fn test_new_collect_cancels_previous_one() {
    let h = harness();
    h.reader.hold_next_capture();

    let coordinator = h.coordinator.clone();
    let first = tokio::spawn(async move {
        coordinator
            .collect_payment(SITE, ORDER, parameters(), |_| {})
            .await
    });
    h.reader.wait_capture_started().await;

    let second = h
        .coordinator
        .collect_payment(SITE, ORDER + 1, parameters(), |_| {})
        .await;

    assert!(matches!(
        first.await.unwrap(),
        Err(CardPresentError::PaymentCanceled)
    ));
    assert!(second.is_ok());
}

#[tokio::test]
async fn test_dropped_collect_releases_capture_slot() {
    let h = harness();
    h.reader.hold_next_capture();

    let timed_out = tokio::time::timeout(
        Duration::from_millis(50),
        h.coordinator.collect_payment(SITE, ORDER, parameters(), |_| {}),
    )
    .await;

    assert!(timed_out.is_err());
    assert_eq!(h.coordinator.phase(), SessionPhase::Idle);
    h.coordinator.start_discovery(SITE, |_| {}, |_| {}).await.unwrap();
}

#[tokio::test]
async fn test_cancel_without_payment_is_noop() {
    let h = harness();
    h.coordinator.cancel_payment().await.unwrap();
    assert!(h.reader.calls().is_empty());
}

#[tokio::test]
async fn test_check_connected_emits_empty_then_reader_then_closes() {
    let h = harness();
    let mut checks = h.coordinator.check_card_reader_connected();

    assert_eq!(checks.recv().await, Some(vec![]));

    h.coordinator
        .connect(CardReader::new("WP3", ReaderType::WisePad3))
        .await
        .unwrap();

    let connected = checks.recv().await.unwrap();
    assert_eq!(connected.len(), 1);
    assert_eq!(connected[0].serial, "WP3");
    assert_eq!(checks.recv().await, None);
}

#[tokio::test]
async fn test_check_connected_with_reader_already_connected() {
    let h = harness();
    h.coordinator
        .connect(CardReader::new("WP3", ReaderType::WisePad3))
        .await
        .unwrap();

    let mut checks = h.coordinator.check_card_reader_connected();
    assert_eq!(checks.recv().await.map(|r| r.len()), Some(1));
    assert_eq!(checks.recv().await, None);
}

#[tokio::test]
async fn test_observers_follow_connection_and_updates() {
    let h = harness();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _connected = h
        .coordinator
        .observe_connected_readers(move |readers| tx.send(readers.len()).unwrap());
    let (update_tx, mut updates) = mpsc::unbounded_channel();
    let _updates = h
        .coordinator
        .observe_software_updates(move |event| update_tx.send(event).unwrap());

    assert_eq!(rx.recv().await, Some(0));
    h.coordinator
        .connect(CardReader::new("CHB1", ReaderType::Chipper2X))
        .await
        .unwrap();
    assert_eq!(rx.recv().await, Some(1));

    h.reader.emit_update(SoftwareUpdateEvent::Available {
        version: "2.1.0".into(),
    });
    h.coordinator.install_update().await.unwrap();
    assert!(matches!(
        updates.recv().await,
        Some(SoftwareUpdateEvent::Available { .. })
    ));
    assert_eq!(updates.recv().await, Some(SoftwareUpdateEvent::Started));
}

#[tokio::test]
async fn test_capture_order_payment_checks_status() {
    let h = harness();
    let intent = h
        .coordinator
        .capture_order_payment(SITE, ORDER, "pi_1")
        .await
        .unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Succeeded);

    *h.wcpay.capture_status.lock().unwrap() = PaymentIntentStatus::RequiresCapture;
    let result = h.coordinator.capture_order_payment(SITE, ORDER, "pi_2").await;
    match result {
        Err(CardPresentError::CaptureStatusMismatch { intent_id, status }) => {
            assert_eq!(intent_id, "pi_2");
            assert_eq!(status, PaymentIntentStatus::RequiresCapture);
        }
        other => panic!("expected a status mismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn test_switch_backend_disconnects_before_switching() {
    let h = harness();
    h.coordinator
        .connect(CardReader::new("CHB1", ReaderType::Chipper2X))
        .await
        .unwrap();
    h.reader.clear_calls();

    h.coordinator.switch_backend(PaymentPlugin::Stripe).await.unwrap();

    assert_eq!(h.reader.calls(), ["disconnect", "clear"]);
    assert_eq!(h.coordinator.active_backend().await, PaymentPlugin::Stripe);
    assert_eq!(h.coordinator.phase(), SessionPhase::Idle);

    // Later operations go to the new backend.
    h.coordinator.capture_order_payment(SITE, ORDER, "pi_3").await.unwrap();
    *h.stripe.capture_status.lock().unwrap() = PaymentIntentStatus::Canceled;
    assert!(h.coordinator.capture_order_payment(SITE, ORDER, "pi_4").await.is_err());
}

#[tokio::test]
async fn test_switch_to_same_backend_is_noop() {
    let h = harness();
    h.coordinator.switch_backend(PaymentPlugin::WcPay).await.unwrap();
    assert!(h.reader.calls().is_empty());
}

#[tokio::test]
async fn test_failed_reset_keeps_previous_backend() {
    let h = harness();
    h.reader.fail_disconnect();

    let result = h.coordinator.switch_backend(PaymentPlugin::Stripe).await;

    assert!(matches!(result, Err(CardPresentError::Hardware(_))));
    assert_eq!(h.reader.calls(), ["disconnect", "clear"]);
    assert_eq!(h.coordinator.active_backend().await, PaymentPlugin::WcPay);
}

#[tokio::test]
async fn test_switch_backend_cancels_in_flight_capture() {
    let h = harness();
    h.reader.hold_next_capture();

    let coordinator = h.coordinator.clone();
    let collect = tokio::spawn(async move {
        coordinator
            .collect_payment(SITE, ORDER, parameters(), |_| {})
            .await
    });
    h.reader.wait_capture_started().await;

    h.coordinator.switch_backend(PaymentPlugin::Stripe).await.unwrap();

    assert!(matches!(
        collect.await.unwrap(),
        Err(CardPresentError::PaymentCanceled)
    ));
}

#[tokio::test]
async fn test_discovery_uses_active_backend_for_tokens() {
    let h = harness();
    h.coordinator.switch_backend(PaymentPlugin::Stripe).await.unwrap();
    h.coordinator.start_discovery(SITE, |_| {}, |_| {}).await.unwrap();

    let provider = h.reader.token_provider().unwrap();
    assert_eq!(provider.fetch_token().await.unwrap(), "woocommerce-gateway-stripe_token");
    assert_eq!(provider.fetch_default_location_id().await.unwrap(), "tml_1");
    assert_eq!(h.stripe.token_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.wcpay.token_calls.load(Ordering::SeqCst), 0);
}
