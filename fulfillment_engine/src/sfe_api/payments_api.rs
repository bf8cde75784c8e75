use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;
use serde_json::{json, Value};

use sfg_common::Secret;

use crate::{
    db_types::{AttemptKind, NewPaymentAttempt, Order, OrderId, OrderStatusType, Payment, PaymentStatus},
    events::{EventProducers, PaymentFailedEvent, PaymentSettledEvent},
    helpers::{verify_hmac, ReplayGuard},
    sfe_api::errors::{CallbackRejection, PaymentsApiError},
    traits::{AuditEvent, AuditRecorder, FulfillmentDatabase, PaymentGatewayClient},
};

/// Reconciliation policy knobs. The callback secret and signature enforcement come straight from configuration:
/// running without a secret is only tolerated outside production.
#[derive(Clone)]
pub struct ReconcilerConfig {
    pub callback_secret: Option<Secret<String>>,
    /// Signatures are mandatory when true. Set from the production flag.
    pub enforce_signature: bool,
    /// Maximum skew, in either direction, between the callback timestamp header and the server clock.
    pub freshness_window: Duration,
    /// How long a processed callback's dedup key stays claimed.
    pub replay_ttl: std::time::Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            callback_secret: None,
            enforce_signature: false,
            freshness_window: Duration::seconds(300),
            replay_ttl: std::time::Duration::from_secs(600),
        }
    }
}

/// What a verify caller may assert about the payment. The correlation id is optional; when supplied it must match
/// the payment's order. The raw payload is kept for the attempt ledger when the gateway cannot be reached.
#[derive(Debug, Clone, Default)]
pub struct VerifyClaim {
    pub order_id: Option<OrderId>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub payment: Payment,
    pub success: bool,
    /// True when the payment was already in a terminal state and no gateway call was made.
    pub already_terminal: bool,
}

#[derive(Debug, Clone)]
pub struct PaymentSession {
    pub payment: Payment,
    pub pay_link: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub payment_status: PaymentStatus,
    pub success: bool,
}

/// The signature and timestamp headers accompanying a gateway callback, extracted by the transport layer.
#[derive(Debug, Clone, Default)]
pub struct CallbackHeaders {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
}

/// `PaymentsApi` drives the request → gateway → verify/callback payment protocol with idempotency and replay
/// protection. Three entry points share one reconciliation core; concurrent races on the same payment are settled
/// by the storage transaction plus the terminal-state checks here — whoever commits first wins and the loser
/// becomes a no-op.
#[derive(Clone)]
pub struct PaymentsApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
    replay_guard: ReplayGuard,
    config: ReconcilerConfig,
}

impl<B, G> Debug for PaymentsApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentsApi")
    }
}

impl<B, G> PaymentsApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers, config: ReconcilerConfig) -> Self {
        let replay_guard = ReplayGuard::new(config.replay_ttl);
        Self { db, gateway, producers, replay_guard, config }
    }
}

impl<B, G> PaymentsApi<B, G>
where
    B: FulfillmentDatabase + AuditRecorder,
    G: PaymentGatewayClient,
{
    /// Start (or restart) a payment cycle for an order.
    ///
    /// Preconditions: the order belongs to the caller, requires an online payment, is not already paid, and is
    /// still PLACED. The payment row is upserted to PENDING before the gateway is contacted, so there is always a
    /// persisted trace of the attempt. A gateway failure marks the cycle FAILED and surfaces the error; it is
    /// never silently retried here.
    pub async fn request_payment(&self, order_id: &OrderId, customer_id: &str) -> Result<PaymentSession, PaymentsApiError> {
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .filter(|o| o.customer_id == customer_id)
            .ok_or_else(|| PaymentsApiError::OrderNotFound(order_id.clone()))?;
        match order.payment_status {
            PaymentStatus::None => return Err(PaymentsApiError::PaymentNotRequired(order_id.clone())),
            PaymentStatus::Paid => return Err(PaymentsApiError::AlreadyPaid(order_id.clone())),
            PaymentStatus::Pending | PaymentStatus::Failed => {},
        }
        if order.status != OrderStatusType::Placed {
            return Err(PaymentsApiError::OrderNotPayable(order_id.clone()));
        }
        let track_id = match self.db.fetch_payment_for_order(order_id).await? {
            Some(existing) => existing.track_id,
            None => new_track_id(order_id),
        };
        let payment = self
            .db
            .upsert_pending_payment(order_id, customer_id, self.gateway.provider(), &track_id, order.total_price)
            .await?;
        debug!("🔄️💳️ Payment cycle for order {order_id} upserted with track id {track_id}");

        match self.gateway.request_payment(order.total_price, &track_id, order_id).await {
            Ok(response) if response.accepted => {
                self.append_attempt(&payment, AttemptKind::Request, PaymentStatus::Pending, response.raw).await?;
                self.audit(
                    "payment_requested",
                    AuditEvent::for_order(order_id)
                        .with_customer(customer_id)
                        .with_metadata(json!({ "provider": self.gateway.provider(), "trackId": track_id })),
                )
                .await;
                Ok(PaymentSession { payment, pay_link: response.pay_link })
            },
            Ok(response) => {
                let message = response.message.unwrap_or_else(|| "Payment gateway rejected request".to_string());
                warn!("🔄️💳️ Gateway rejected payment request for {order_id}: {message}");
                self.append_attempt(&payment, AttemptKind::Request, PaymentStatus::Failed, response.raw).await?;
                self.mark_cycle_failed(&track_id).await?;
                Err(PaymentsApiError::GatewayRejected(message))
            },
            Err(e) => {
                warn!("🔄️💳️ Gateway unreachable for payment request on {order_id}: {e}");
                self.append_attempt(&payment, AttemptKind::Request, PaymentStatus::Failed, json!({ "error": e.to_string() }))
                    .await?;
                self.mark_cycle_failed(&track_id).await?;
                Err(PaymentsApiError::GatewayUnreachable(e.to_string()))
            },
        }
    }

    /// Verify a payment against the gateway.
    ///
    /// Idempotent: a payment that is already PAID (or terminally FAILED) is returned immediately without another
    /// gateway round-trip. Otherwise settlement requires all three of: a successful provider result, a matching
    /// amount, and a matching order correlation when one is claimed. Every call appends a ledger row with the raw
    /// response, success or not.
    pub async fn verify(&self, track_id: &str, claim: &VerifyClaim) -> Result<VerifyOutcome, PaymentsApiError> {
        let payment = self
            .db
            .fetch_payment_by_track_id(track_id)
            .await?
            .ok_or_else(|| PaymentsApiError::PaymentNotFound(track_id.to_string()))?;
        match payment.status {
            PaymentStatus::Paid => {
                trace!("🔄️💳️ Verify on already-paid track {track_id} is a no-op");
                return Ok(VerifyOutcome { payment, success: true, already_terminal: true });
            },
            PaymentStatus::Failed => {
                trace!("🔄️💳️ Verify on failed track {track_id}; a new request cycle is needed first");
                return Ok(VerifyOutcome { payment, success: false, already_terminal: true });
            },
            _ => {},
        }
        self.reconcile(payment, claim).await
    }

    /// Handle a gateway webhook.
    ///
    /// The order of the gate checks matters and every one fails closed:
    /// 1. signature over the raw body (mandatory in production),
    /// 2. timestamp freshness,
    /// 3. payload parse,
    /// 4. replay dedup on `(track id, signature)`,
    /// 5. exact field match (amount, order correlation) against the stored payment.
    ///
    /// A mismatch marks the payment FAILED rather than being ignored. A matching, successful callback delegates to
    /// the same reconciliation core as `verify` (the replay guard was already applied above).
    pub async fn handle_callback(
        &self,
        raw_body: &[u8],
        headers: &CallbackHeaders,
    ) -> Result<CallbackOutcome, CallbackRejection> {
        let signature = self.check_signature(raw_body, headers)?;
        self.check_freshness(headers)?;
        let payload = CallbackPayload::parse(raw_body)?;
        let dedup_key = format!("{}:{signature}", payload.track_id);
        if !self.replay_guard.check_and_set(&dedup_key) {
            warn!("🔐️ Replayed callback for track id {}", payload.track_id);
            return Err(CallbackRejection::ReplayDetected);
        }

        let payment = self
            .db
            .fetch_payment_by_track_id(&payload.track_id)
            .await?
            .ok_or_else(|| CallbackRejection::PaymentNotFound(payload.track_id.clone()))?;
        self.append_attempt(&payment, AttemptKind::Callback, PaymentStatus::Pending, payload.raw.clone()).await?;

        if payment.status == PaymentStatus::Paid {
            trace!("🔄️💳️ Callback on already-paid track {} is a no-op", payment.track_id);
            return Ok(CallbackOutcome { payment_status: PaymentStatus::Paid, success: true });
        }

        let amount_matches = payload.amount == payment.amount.value();
        let order_matches = payload.order_id.as_ref().map(|oid| *oid == payment.order_id).unwrap_or(true);
        if !amount_matches || !order_matches {
            warn!(
                "🔐️ Callback field mismatch for track {} (amount ok: {amount_matches}, order ok: {order_matches}); failing closed",
                payment.track_id
            );
            self.mark_cycle_failed(&payment.track_id).await?;
            return Ok(CallbackOutcome { payment_status: PaymentStatus::Failed, success: false });
        }
        if !payload.success {
            debug!("🔄️💳️ Callback reports failure for track {}", payment.track_id);
            self.mark_cycle_failed(&payment.track_id).await?;
            return Ok(CallbackOutcome { payment_status: PaymentStatus::Failed, success: false });
        }

        let claim = VerifyClaim { order_id: payload.order_id.clone(), raw: payload.raw };
        let outcome = self.reconcile(payment, &claim).await?;
        Ok(CallbackOutcome { payment_status: outcome.payment.status, success: outcome.success })
    }

    /// The shared reconciliation core. Expects a non-terminal payment; callers handle idempotency first.
    async fn reconcile(&self, payment: Payment, claim: &VerifyClaim) -> Result<VerifyOutcome, PaymentsApiError> {
        let track_id = payment.track_id.clone();
        let verification = match self.gateway.verify_payment(&track_id).await {
            Ok(v) => v,
            Err(e) => {
                warn!("🔄️💳️ Gateway unreachable during verify of {track_id}: {e}");
                self.append_attempt(
                    &payment,
                    AttemptKind::Verify,
                    PaymentStatus::Failed,
                    json!({ "error": e.to_string(), "payload": claim.raw }),
                )
                .await?;
                self.mark_cycle_failed(&track_id).await?;
                return Err(PaymentsApiError::GatewayUnreachable(e.to_string()));
            },
        };
        let amount_matches = verification.amount == Some(payment.amount);
        let order_matches = claim.order_id.as_ref().map(|oid| *oid == payment.order_id).unwrap_or(true);
        let settled = verification.success && amount_matches && order_matches;
        if settled {
            let (payment, order) =
                self.db.settle_payment(&track_id, verification.ref_number.as_deref()).await?;
            self.append_attempt(&payment, AttemptKind::Verify, PaymentStatus::Paid, verification.raw).await?;
            info!("🔄️💳️ Payment {track_id} settled for order {}", order.order_id);
            self.call_payment_settled_hook(&payment, &order).await;
            self.audit(
                "payment_verified",
                AuditEvent::for_order(&order.order_id)
                    .with_customer(&*payment.customer_id)
                    .with_vendor(&*order.vendor_id)
                    .with_metadata(json!({ "trackId": track_id })),
            )
            .await;
            Ok(VerifyOutcome { payment, success: true, already_terminal: false })
        } else {
            debug!(
                "🔄️💳️ Verify refused for {track_id}: provider success {}, amount ok {amount_matches}, order ok {order_matches}",
                verification.success
            );
            let (payment, order) = self.db.fail_payment(&track_id).await?;
            self.append_attempt(&payment, AttemptKind::Verify, PaymentStatus::Failed, verification.raw).await?;
            self.call_payment_failed_hook(&payment, &order).await;
            self.audit(
                "payment_failed",
                AuditEvent::for_order(&order.order_id)
                    .with_customer(&*payment.customer_id)
                    .with_metadata(json!({ "trackId": track_id })),
            )
            .await;
            Ok(VerifyOutcome { payment, success: false, already_terminal: false })
        }
    }

    fn check_signature(&self, raw_body: &[u8], headers: &CallbackHeaders) -> Result<String, CallbackRejection> {
        match &self.config.callback_secret {
            Some(secret) => {
                let signature = headers.signature.as_deref().ok_or(CallbackRejection::SignatureMissing)?;
                if verify_hmac(secret.reveal(), raw_body, signature) {
                    trace!("🔐️ Callback signature verified");
                    Ok(signature.to_string())
                } else {
                    warn!("🔐️ Invalid callback signature");
                    Err(CallbackRejection::SignatureInvalid)
                }
            },
            None if self.config.enforce_signature => Err(CallbackRejection::SecretNotConfigured),
            None => {
                warn!("🔐️ No callback secret configured; accepting unsigned callback outside production");
                Ok("unsigned".to_string())
            },
        }
    }

    fn check_freshness(&self, headers: &CallbackHeaders) -> Result<(), CallbackRejection> {
        let ts = headers
            .timestamp
            .as_deref()
            .and_then(|t| t.trim().parse::<i64>().ok())
            .ok_or(CallbackRejection::StaleCallback)?;
        let skew = (Utc::now().timestamp() - ts).abs();
        if skew > self.config.freshness_window.num_seconds() {
            warn!("🔐️ Stale callback: {skew}s of skew");
            return Err(CallbackRejection::StaleCallback);
        }
        Ok(())
    }

    async fn mark_cycle_failed(&self, track_id: &str) -> Result<(Payment, Order), PaymentsApiError> {
        let (payment, order) = self.db.fail_payment(track_id).await?;
        self.call_payment_failed_hook(&payment, &order).await;
        self.audit(
            "payment_failed",
            AuditEvent::for_order(&order.order_id)
                .with_customer(&*payment.customer_id)
                .with_metadata(json!({ "trackId": track_id })),
        )
        .await;
        Ok((payment, order))
    }

    async fn append_attempt(
        &self,
        payment: &Payment,
        kind: AttemptKind,
        status: PaymentStatus,
        raw_response: Value,
    ) -> Result<(), PaymentsApiError> {
        self.db
            .insert_payment_attempt(NewPaymentAttempt {
                payment_id: payment.id,
                kind,
                track_id: payment.track_id.clone(),
                amount: payment.amount,
                status,
                raw_response,
            })
            .await?;
        Ok(())
    }

    async fn call_payment_settled_hook(&self, payment: &Payment, order: &Order) {
        for emitter in &self.producers.payment_settled_producer {
            emitter.publish_event(PaymentSettledEvent { payment: payment.clone(), order: order.clone() }).await;
        }
    }

    async fn call_payment_failed_hook(&self, payment: &Payment, order: &Order) {
        for emitter in &self.producers.payment_failed_producer {
            emitter.publish_event(PaymentFailedEvent { payment: payment.clone(), order: order.clone() }).await;
        }
    }

    async fn audit(&self, event_name: &str, event: AuditEvent) {
        if let Err(e) = self.db.record(event_name, event).await {
            warn!("🔄️💳️ Could not record audit event {event_name}: {e}");
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

fn new_track_id(order_id: &OrderId) -> String {
    let prefix: String = order_id.as_str().chars().take(6).collect();
    let nonce: u16 = rand::random();
    format!("{}{nonce:04x}-{prefix}", Utc::now().timestamp_millis())
}

/// The minimum callback payload: track id, amount, optional order correlation and a success flag. Providers are
/// inconsistent about casing and types, so parsing is deliberately lenient about shape and strict about content.
#[derive(Debug, Clone)]
struct CallbackPayload {
    track_id: String,
    amount: i64,
    order_id: Option<OrderId>,
    success: bool,
    raw: Value,
}

impl CallbackPayload {
    fn parse(raw_body: &[u8]) -> Result<Self, CallbackRejection> {
        let raw: Value = serde_json::from_slice(raw_body)
            .map_err(|e| CallbackRejection::MalformedPayload(e.to_string()))?;
        let track_id = ["trackId", "trackid", "trackID"]
            .iter()
            .find_map(|k| value_as_string(&raw[*k]))
            .ok_or_else(|| CallbackRejection::MalformedPayload("trackId is required".to_string()))?;
        let amount = value_as_i64(&raw["amount"])
            .ok_or_else(|| CallbackRejection::MalformedPayload("amount is required".to_string()))?;
        let order_id = value_as_string(&raw["orderId"]).map(OrderId::from);
        let success = matches!(value_as_string(&raw["success"]).as_deref(), Some("1") | Some("true"))
            || raw["success"] == json!(1)
            || raw["success"] == json!(true)
            || value_as_i64(&raw["result"]) == Some(100);
        Ok(Self { track_id, amount, order_id, success, raw })
    }
}

fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn callback_payload_accepts_provider_quirks() {
        let p = CallbackPayload::parse(br#"{"trackid":"171-ord1","amount":"500000","success":"1"}"#).unwrap();
        assert_eq!(p.track_id, "171-ord1");
        assert_eq!(p.amount, 500_000);
        assert!(p.success);
        assert!(p.order_id.is_none());

        let p = CallbackPayload::parse(br#"{"trackId":"x","amount":1000,"result":100,"orderId":"ord-9"}"#).unwrap();
        assert!(p.success);
        assert_eq!(p.order_id, Some(OrderId::from("ord-9".to_string())));
    }

    #[test]
    fn callback_payload_rejects_missing_fields() {
        assert!(matches!(
            CallbackPayload::parse(br#"{"amount":1000}"#),
            Err(CallbackRejection::MalformedPayload(_))
        ));
        assert!(matches!(
            CallbackPayload::parse(br#"{"trackId":"x"}"#),
            Err(CallbackRejection::MalformedPayload(_))
        ));
        assert!(matches!(CallbackPayload::parse(b"not json"), Err(CallbackRejection::MalformedPayload(_))));
    }

    #[test]
    fn failure_flags_parse_as_failure() {
        let p = CallbackPayload::parse(br#"{"trackId":"x","amount":10,"success":"0"}"#).unwrap();
        assert!(!p.success);
        let p = CallbackPayload::parse(br#"{"trackId":"x","amount":10,"result":102}"#).unwrap();
        assert!(!p.success);
    }

    #[test]
    fn track_ids_embed_the_order_prefix() {
        let t = new_track_id(&OrderId::from("ord-42abc99".to_string()));
        assert!(t.ends_with("-ord-42"));
    }
}
