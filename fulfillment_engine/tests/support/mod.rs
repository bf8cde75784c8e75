//! Shared scaffolding for the engine integration tests: throwaway migrated databases, seed data, and scripted
//! gateway/channel doubles.
#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
    Mutex,
};

use fulfillment_engine::{
    db_types::{
        AddressSnapshot,
        CourierStatus,
        Customer,
        DeliveryProvider,
        DeliveryType,
        NewLineItem,
        OrderId,
        PricingBreakdown,
        SettlementType,
        Vendor,
    },
    matching::MatchTerms,
    traits::{
        ChannelError,
        ChatProvider,
        ChatTarget,
        GatewayError,
        GatewayPaymentRequest,
        GatewayVerification,
        PaymentGatewayClient,
        ProviderReceipt,
        SmsProvider,
    },
    PlaceOrderRequest,
    SqliteDatabase,
};
use sfg_common::Rial;

pub async fn new_test_db() -> SqliteDatabase {
    let _ = env_logger::try_init();
    let url = format!("sqlite://{}/sofra_it_{}.db", std::env::temp_dir().display(), rand::random::<u64>());
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating test database");
    db.migrate().await.expect("Error running migrations");
    db
}

pub async fn seed_vendor(db: &SqliteDatabase, id: &str, max_daily_orders: Option<i64>) {
    let vendor = Vendor {
        id: id.to_string(),
        name: format!("Vendor {id}"),
        lat: 35.6892,
        lng: 51.3890,
        service_radius_km: 5.0,
        is_active: true,
        max_daily_orders,
        chat_id: Some(format!("chat-{id}")),
    };
    db.upsert_vendor(&vendor).await.expect("Error seeding vendor");
}

pub async fn seed_customer(db: &SqliteDatabase, id: &str) {
    let customer = Customer {
        id: id.to_string(),
        mobile: "09120000000".to_string(),
        chat_id: Some(format!("chat-{id}")),
        is_active: true,
    };
    db.upsert_customer(&customer).await.expect("Error seeding customer");
}

pub fn in_zone_terms() -> MatchTerms {
    MatchTerms {
        delivery_type: DeliveryType::InZoneInternal,
        delivery_provider: DeliveryProvider::InHouse,
        delivery_fee: Rial::from(0),
        distance_km: 1.2,
        courier_status: CourierStatus::Pending,
        settlement: SettlementType::Prepaid,
        pricing: PricingBreakdown {
            base_fee: Rial::from(0),
            per_km_rate: Rial::from(0),
            peak_multiplier: 1.0,
            estimated_fee: Rial::from(0),
            distance_km: 1.2,
        },
    }
}

pub fn cod_terms() -> MatchTerms {
    MatchTerms {
        delivery_type: DeliveryType::OutOfZoneCourier,
        delivery_provider: DeliveryProvider::Courier,
        delivery_fee: Rial::from(250_000),
        distance_km: 12.0,
        courier_status: CourierStatus::Requested,
        settlement: SettlementType::Cod,
        pricing: PricingBreakdown {
            base_fee: Rial::from(100_000),
            per_km_rate: Rial::from(12_500),
            peak_multiplier: 1.0,
            estimated_fee: Rial::from(250_000),
            distance_km: 12.0,
        },
    }
}

pub fn place_request(order_id: &str, customer_id: &str, vendor_id: &str, terms: MatchTerms) -> PlaceOrderRequest {
    PlaceOrderRequest {
        order_id: OrderId::from(order_id.to_string()),
        customer_id: customer_id.to_string(),
        vendor_id: vendor_id.to_string(),
        items: vec![NewLineItem { variant_id: "variant-1".to_string(), quantity: 2, unit_price: Rial::from(250_000) }],
        address: AddressSnapshot {
            title: "Home".to_string(),
            lat: 35.70,
            lng: 51.40,
            full_address: "No. 1, Azadi St, Tehran".to_string(),
        },
        terms,
        scheduled_at: None,
    }
}

//--------------------------------------    MockGateway        -------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GatewayScript {
    pub accept_requests: bool,
    pub reject_message: Option<String>,
    pub verify_success: bool,
    pub verify_amount: Option<Rial>,
    pub ref_number: Option<String>,
    pub unreachable: bool,
}

impl Default for GatewayScript {
    fn default() -> Self {
        Self {
            accept_requests: true,
            reject_message: None,
            verify_success: true,
            verify_amount: None,
            ref_number: Some("REF-1".to_string()),
            unreachable: false,
        }
    }
}

/// A scripted stand-in for the payment gateway that counts its calls.
#[derive(Clone, Default)]
pub struct MockGateway {
    script: Arc<Mutex<GatewayScript>>,
    request_calls: Arc<AtomicU32>,
    verify_calls: Arc<AtomicU32>,
}

impl MockGateway {
    pub fn with_script(script: GatewayScript) -> Self {
        Self { script: Arc::new(Mutex::new(script)), ..Default::default() }
    }

    pub fn set_script(&self, script: GatewayScript) {
        *self.script.lock().expect("gateway script lock") = script;
    }

    pub fn request_calls(&self) -> u32 {
        self.request_calls.load(Ordering::SeqCst)
    }

    pub fn verify_calls(&self) -> u32 {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

impl PaymentGatewayClient for MockGateway {
    fn provider(&self) -> &'static str {
        "ZIBAL"
    }

    async fn request_payment(
        &self,
        amount: Rial,
        track_id: &str,
        _order_id: &OrderId,
    ) -> Result<GatewayPaymentRequest, GatewayError> {
        self.request_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().expect("gateway script lock").clone();
        if script.unreachable {
            return Err(GatewayError::Unreachable("connection refused".to_string()));
        }
        Ok(GatewayPaymentRequest {
            accepted: script.accept_requests,
            message: script.reject_message,
            pay_link: Some(format!("https://gateway.zibal.ir/start/{track_id}")),
            raw: serde_json::json!({ "result": if script.accept_requests { 100 } else { 102 }, "amount": amount.value() }),
        })
    }

    async fn verify_payment(&self, track_id: &str) -> Result<GatewayVerification, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().expect("gateway script lock").clone();
        if script.unreachable {
            return Err(GatewayError::Unreachable("connection refused".to_string()));
        }
        Ok(GatewayVerification {
            success: script.verify_success,
            amount: script.verify_amount,
            ref_number: script.ref_number,
            paid_at: Some("2024-06-12T09:00:00Z".to_string()),
            raw: serde_json::json!({ "result": if script.verify_success { 100 } else { 201 }, "trackId": track_id }),
        })
    }
}

//--------------------------------------  ScriptedChannel      -------------------------------------------------------

/// A channel double usable as both the chat and the SMS provider. Fails the first `fail_first` calls, succeeds
/// afterwards.
#[derive(Clone, Default)]
pub struct ScriptedChannel {
    fail_first: Arc<AtomicU32>,
    calls: Arc<AtomicU32>,
}

impl ScriptedChannel {
    pub fn failing_first(n: u32) -> Self {
        Self { fail_first: Arc::new(AtomicU32::new(n)), calls: Arc::new(AtomicU32::new(0)) }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn attempt(&self, kind: &str) -> Result<ProviderReceipt, ChannelError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first.load(Ordering::SeqCst) {
            Err(ChannelError::Unreachable(format!("{kind} provider timed out")))
        } else {
            Ok(ProviderReceipt {
                provider_message_id: Some(format!("msg-{call}")),
                provider_status: Some("SENT".to_string()),
            })
        }
    }
}

impl ChatProvider for ScriptedChannel {
    async fn send_message(
        &self,
        _chat_id: &str,
        _message: &str,
        _target: ChatTarget,
    ) -> Result<ProviderReceipt, ChannelError> {
        self.attempt("chat")
    }
}

impl SmsProvider for ScriptedChannel {
    async fn send_sms(&self, _phone: &str, _message: &str) -> Result<ProviderReceipt, ChannelError> {
        self.attempt("sms")
    }
}
