mod support;

use chrono::Utc;

use fulfillment_engine::{
    db_types::{AttemptKind, OrderId, OrderStatusType, PaymentStatus},
    events::EventProducers,
    helpers::calculate_hmac,
    traits::FulfillmentDatabase,
    CallbackHeaders,
    CallbackRejection,
    OrderFlowApi,
    PaymentsApi,
    PaymentsApiError,
    ReconcilerConfig,
    SqliteDatabase,
    VerifyClaim,
};
use sfg_common::{Rial, Secret};
use support::{cod_terms, in_zone_terms, new_test_db, place_request, seed_customer, seed_vendor, GatewayScript, MockGateway};

const CALLBACK_SECRET: &str = "callback-secret";

fn reconciler_config() -> ReconcilerConfig {
    ReconcilerConfig {
        callback_secret: Some(Secret::new(CALLBACK_SECRET.to_string())),
        enforce_signature: true,
        ..Default::default()
    }
}

async fn setup(order_id: &str) -> (SqliteDatabase, PaymentsApi<SqliteDatabase, MockGateway>, MockGateway, OrderId) {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-1", None).await;
    seed_customer(&db, "cust-1").await;
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = flow.place_order(place_request(order_id, "cust-1", "vend-1", in_zone_terms())).await.expect("placed");
    let gateway = MockGateway::with_script(GatewayScript {
        verify_amount: Some(Rial::from(500_000)),
        ..Default::default()
    });
    let api = PaymentsApi::new(db.clone(), gateway.clone(), EventProducers::default(), reconciler_config());
    (db, api, gateway, order.order_id)
}

fn signed_headers(body: &[u8]) -> CallbackHeaders {
    CallbackHeaders {
        signature: Some(calculate_hmac(CALLBACK_SECRET, body)),
        timestamp: Some(Utc::now().timestamp().to_string()),
    }
}

#[tokio::test]
async fn request_then_verify_settles_the_payment() {
    let (db, api, gateway, oid) = setup("pay-1").await;
    let session = api.request_payment(&oid, "cust-1").await.expect("session");
    assert_eq!(session.payment.status, PaymentStatus::Pending);
    assert_eq!(session.payment.amount, Rial::from(500_000));
    assert!(session.pay_link.as_deref().unwrap_or_default().contains(&session.payment.track_id));
    assert_eq!(gateway.request_calls(), 1);

    let outcome = api.verify(&session.payment.track_id, &VerifyClaim::default()).await.expect("verified");
    assert!(outcome.success);
    assert!(!outcome.already_terminal);
    assert_eq!(outcome.payment.status, PaymentStatus::Paid);
    assert!(outcome.payment.verified_at.is_some());
    assert_eq!(outcome.payment.ref_number.as_deref(), Some("REF-1"));

    let order = db.fetch_order_by_order_id(&oid).await.expect("query").expect("exists");
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.status, OrderStatusType::Placed);

    // The settlement appended a "payment confirmed" note without changing the status.
    let history = db.fetch_history_for_order(&oid).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].status, OrderStatusType::Placed);
    assert_eq!(history[1].note.as_deref(), Some("payment confirmed"));

    // The ledger holds the request and verify interactions, raw responses included.
    let attempts = db.fetch_payment_attempts(outcome.payment.id).await.expect("ledger");
    let kinds: Vec<AttemptKind> = attempts.iter().map(|a| a.kind).collect();
    assert_eq!(kinds, vec![AttemptKind::Request, AttemptKind::Verify]);
    assert_eq!(attempts[1].raw_response["result"], 100);
}

#[tokio::test]
async fn verify_is_idempotent_once_paid() {
    let (_db, api, gateway, oid) = setup("pay-2").await;
    let session = api.request_payment(&oid, "cust-1").await.expect("session");
    let track = session.payment.track_id.clone();
    api.verify(&track, &VerifyClaim::default()).await.expect("first verify");
    assert_eq!(gateway.verify_calls(), 1);

    let outcome = api.verify(&track, &VerifyClaim::default()).await.expect("second verify");
    assert!(outcome.success);
    assert!(outcome.already_terminal);
    assert_eq!(outcome.payment.status, PaymentStatus::Paid);
    // No extra gateway round-trip happened.
    assert_eq!(gateway.verify_calls(), 1);
}

#[tokio::test]
async fn amount_mismatch_never_settles() {
    let (db, api, gateway, oid) = setup("pay-3").await;
    let session = api.request_payment(&oid, "cust-1").await.expect("session");
    gateway.set_script(GatewayScript { verify_amount: Some(Rial::from(999_999)), ..Default::default() });

    let outcome = api.verify(&session.payment.track_id, &VerifyClaim::default()).await.expect("verify ran");
    assert!(!outcome.success);
    assert_eq!(outcome.payment.status, PaymentStatus::Failed);
    let order = db.fetch_order_by_order_id(&oid).await.expect("query").expect("exists");
    assert_eq!(order.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn order_correlation_mismatch_never_settles() {
    let (_db, api, _gateway, oid) = setup("pay-4").await;
    let session = api.request_payment(&oid, "cust-1").await.expect("session");
    let claim = VerifyClaim { order_id: Some(OrderId::from("someone-elses-order".to_string())), ..Default::default() };
    let outcome = api.verify(&session.payment.track_id, &claim).await.expect("verify ran");
    assert!(!outcome.success);
    assert_eq!(outcome.payment.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn gateway_rejection_fails_the_cycle_and_surfaces() {
    let (db, api, gateway, oid) = setup("pay-5").await;
    gateway.set_script(GatewayScript {
        accept_requests: false,
        reject_message: Some("merchant disabled".to_string()),
        ..Default::default()
    });
    let err = api.request_payment(&oid, "cust-1").await.expect_err("rejected");
    assert!(matches!(err, PaymentsApiError::GatewayRejected(_)));

    let payment = db.fetch_payment_for_order(&oid).await.expect("query").expect("row exists");
    assert_eq!(payment.status, PaymentStatus::Failed);
    let order = db.fetch_order_by_order_id(&oid).await.expect("query").expect("exists");
    assert_eq!(order.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn failed_cycles_are_retried_on_the_same_row() {
    let (db, api, gateway, oid) = setup("pay-6").await;
    gateway.set_script(GatewayScript { unreachable: true, ..Default::default() });
    let err = api.request_payment(&oid, "cust-1").await.expect_err("unreachable");
    assert!(matches!(err, PaymentsApiError::GatewayUnreachable(_)));
    let failed = db.fetch_payment_for_order(&oid).await.expect("query").expect("row");
    assert_eq!(failed.status, PaymentStatus::Failed);

    gateway.set_script(GatewayScript { verify_amount: Some(Rial::from(500_000)), ..Default::default() });
    let session = api.request_payment(&oid, "cust-1").await.expect("retry accepted");
    assert_eq!(session.payment.id, failed.id);
    assert_eq!(session.payment.status, PaymentStatus::Pending);
    assert_eq!(session.payment.track_id, failed.track_id);
}

#[tokio::test]
async fn cod_orders_never_open_a_payment_cycle() {
    let db = new_test_db().await;
    seed_vendor(&db, "vend-1", None).await;
    seed_customer(&db, "cust-1").await;
    let flow = OrderFlowApi::new(db.clone(), EventProducers::default());
    let order = flow.place_order(place_request("pay-7", "cust-1", "vend-1", cod_terms())).await.expect("placed");
    let api = PaymentsApi::new(db, MockGateway::default(), EventProducers::default(), reconciler_config());
    let err = api.request_payment(&order.order_id, "cust-1").await.expect_err("no payment needed");
    assert!(matches!(err, PaymentsApiError::PaymentNotRequired(_)));
}

#[tokio::test]
async fn payment_requests_check_ownership() {
    let (_db, api, _gateway, oid) = setup("pay-8").await;
    let err = api.request_payment(&oid, "cust-2").await.expect_err("not the owner");
    assert!(matches!(err, PaymentsApiError::OrderNotFound(_)));
}

//--------------------------------------     Callbacks         -------------------------------------------------------

#[tokio::test]
async fn signed_fresh_callback_settles_the_payment() {
    let (db, api, _gateway, oid) = setup("cb-1").await;
    let session = api.request_payment(&oid, "cust-1").await.expect("session");
    let body = format!(
        r#"{{"trackId":"{}","amount":500000,"success":"1","orderId":"{}"}}"#,
        session.payment.track_id,
        oid.as_str()
    );
    let outcome = api.handle_callback(body.as_bytes(), &signed_headers(body.as_bytes())).await.expect("accepted");
    assert!(outcome.success);
    assert_eq!(outcome.payment_status, PaymentStatus::Paid);
    let order = db.fetch_order_by_order_id(&oid).await.expect("query").expect("exists");
    assert_eq!(order.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn tampered_signatures_are_always_rejected() {
    let (db, api, _gateway, oid) = setup("cb-2").await;
    let session = api.request_payment(&oid, "cust-1").await.expect("session");
    let body = format!(r#"{{"trackId":"{}","amount":500000,"success":"1"}}"#, session.payment.track_id);
    let mut headers = signed_headers(body.as_bytes());
    headers.signature = Some(calculate_hmac("wrong-secret", body.as_bytes()));

    let err = api.handle_callback(body.as_bytes(), &headers).await.expect_err("bad signature");
    assert!(matches!(err, CallbackRejection::SignatureInvalid));
    // Nothing moved.
    let payment = db.fetch_payment_for_order(&oid).await.expect("query").expect("row");
    assert_eq!(payment.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn missing_signature_is_rejected_when_a_secret_is_configured() {
    let (_db, api, _gateway, oid) = setup("cb-3").await;
    let session = api.request_payment(&oid, "cust-1").await.expect("session");
    let body = format!(r#"{{"trackId":"{}","amount":500000,"success":"1"}}"#, session.payment.track_id);
    let headers = CallbackHeaders { signature: None, timestamp: Some(Utc::now().timestamp().to_string()) };
    let err = api.handle_callback(body.as_bytes(), &headers).await.expect_err("unsigned");
    assert!(matches!(err, CallbackRejection::SignatureMissing));
}

#[tokio::test]
async fn replayed_callbacks_are_rejected_the_second_time() {
    let (_db, api, _gateway, oid) = setup("cb-4").await;
    let session = api.request_payment(&oid, "cust-1").await.expect("session");
    let body = format!(r#"{{"trackId":"{}","amount":500000,"success":"1"}}"#, session.payment.track_id);
    let headers = signed_headers(body.as_bytes());

    api.handle_callback(body.as_bytes(), &headers).await.expect("first delivery");
    let err = api.handle_callback(body.as_bytes(), &headers).await.expect_err("replay");
    assert!(matches!(err, CallbackRejection::ReplayDetected));
}

#[tokio::test]
async fn stale_callbacks_are_rejected() {
    let (_db, api, _gateway, oid) = setup("cb-5").await;
    let session = api.request_payment(&oid, "cust-1").await.expect("session");
    let body = format!(r#"{{"trackId":"{}","amount":500000,"success":"1"}}"#, session.payment.track_id);
    let mut headers = signed_headers(body.as_bytes());
    headers.timestamp = Some((Utc::now().timestamp() - 3600).to_string());
    let err = api.handle_callback(body.as_bytes(), &headers).await.expect_err("stale");
    assert!(matches!(err, CallbackRejection::StaleCallback));
}

#[tokio::test]
async fn callback_amount_mismatch_fails_closed() {
    let (db, api, gateway, oid) = setup("cb-6").await;
    let session = api.request_payment(&oid, "cust-1").await.expect("session");
    let body = format!(r#"{{"trackId":"{}","amount":123,"success":"1"}}"#, session.payment.track_id);
    let outcome = api.handle_callback(body.as_bytes(), &signed_headers(body.as_bytes())).await.expect("processed");
    assert!(!outcome.success);
    assert_eq!(outcome.payment_status, PaymentStatus::Failed);
    // The gateway was never consulted for a mismatched callback.
    assert_eq!(gateway.verify_calls(), 0);
    let order = db.fetch_order_by_order_id(&oid).await.expect("query").expect("exists");
    assert_eq!(order.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn callbacks_on_settled_payments_are_no_ops() {
    let (_db, api, gateway, oid) = setup("cb-7").await;
    let session = api.request_payment(&oid, "cust-1").await.expect("session");
    api.verify(&session.payment.track_id, &VerifyClaim::default()).await.expect("settled");
    assert_eq!(gateway.verify_calls(), 1);

    let body = format!(r#"{{"trackId":"{}","amount":500000,"success":"1"}}"#, session.payment.track_id);
    let outcome = api.handle_callback(body.as_bytes(), &signed_headers(body.as_bytes())).await.expect("no-op");
    assert!(outcome.success);
    assert_eq!(outcome.payment_status, PaymentStatus::Paid);
    assert_eq!(gateway.verify_calls(), 1);
}

#[tokio::test]
async fn callbacks_reporting_failure_fail_the_cycle() {
    let (db, api, _gateway, oid) = setup("cb-8").await;
    let session = api.request_payment(&oid, "cust-1").await.expect("session");
    let body = format!(r#"{{"trackId":"{}","amount":500000,"success":"0"}}"#, session.payment.track_id);
    let outcome = api.handle_callback(body.as_bytes(), &signed_headers(body.as_bytes())).await.expect("processed");
    assert!(!outcome.success);
    let payment = db.fetch_payment_for_order(&oid).await.expect("query").expect("row");
    assert_eq!(payment.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn production_without_a_secret_refuses_callbacks() {
    let db = new_test_db().await;
    let config = ReconcilerConfig { callback_secret: None, enforce_signature: true, ..Default::default() };
    let api = PaymentsApi::new(db, MockGateway::default(), EventProducers::default(), config);
    let headers = CallbackHeaders { signature: None, timestamp: Some(Utc::now().timestamp().to_string()) };
    let err = api.handle_callback(br#"{"trackId":"t","amount":1,"success":"1"}"#, &headers).await.expect_err("refused");
    assert!(matches!(err, CallbackRejection::SecretNotConfigured));
}

#[tokio::test]
async fn unknown_track_ids_report_not_found() {
    let (_db, api, _gateway, _oid) = setup("cb-9").await;
    let err = api.verify("no-such-track", &VerifyClaim::default()).await.expect_err("missing");
    assert!(matches!(err, PaymentsApiError::PaymentNotFound(_)));
}
