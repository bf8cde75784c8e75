use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fulfillment_engine::db_types::{AddressSnapshot, CourierStatus, NewLineItem, OrderStatusType, SettlementType};
use sfg_common::Rial;

/// One cart line as submitted by the storefront. The unit price is the menu snapshot resolved upstream; totals are
/// always recomputed server-side from these lines, never taken from the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub variant_id: String,
    pub quantity: i64,
    pub unit_price: i64,
}

impl From<CartItem> for NewLineItem {
    fn from(item: CartItem) -> Self {
        NewLineItem { variant_id: item.variant_id, quantity: item.quantity, unit_price: Rial::from(item.unit_price) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressBody {
    pub title: String,
    pub lat: f64,
    pub lng: f64,
    pub full_address: String,
}

impl From<AddressBody> for AddressSnapshot {
    fn from(a: AddressBody) -> Self {
        AddressSnapshot { title: a.title, lat: a.lat, lng: a.lng, full_address: a.full_address }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    /// Optional externally assigned order id; one is generated when absent.
    pub order_id: Option<String>,
    pub vendor_id: String,
    pub items: Vec<CartItem>,
    /// The caller's resolved default address, as returned by the address service.
    pub address: AddressBody,
    #[serde(default = "default_settlement")]
    pub settlement: SettlementType,
    /// Explicit acknowledgement that an out-of-zone delivery is settled cash-on-delivery.
    #[serde(default)]
    pub cod_confirmed: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
}

fn default_settlement() -> SettlementType {
    SettlementType::Prepaid
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionRequest {
    pub status: OrderStatusType,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRequestBody {
    pub order_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequestBody {
    pub track_id: String,
    /// Optional order correlation; when present it must match the payment's order.
    pub order_id: Option<String>,
}

/// What the courier service posts to the webhook when a delivery progresses.
#[derive(Debug, Clone, Deserialize)]
pub struct CourierWebhookBody {
    pub order_id: String,
    pub event: CourierEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CourierEvent {
    Assigned,
    PickedUp,
    Delivered,
}

impl CourierEvent {
    /// The order status each courier event drives the state machine towards.
    pub fn order_status(&self) -> OrderStatusType {
        match self {
            Self::Assigned => OrderStatusType::CourierAssigned,
            Self::PickedUp => OrderStatusType::OutForDelivery,
            Self::Delivered => OrderStatusType::Delivered,
        }
    }

    /// The courier-leg status persisted alongside the order transition.
    pub fn courier_status(&self) -> CourierStatus {
        match self {
            Self::Assigned => CourierStatus::Assigned,
            Self::PickedUp => CourierStatus::PickedUp,
            Self::Delivered => CourierStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failure<S: Into<String>>(message: S) -> Self {
        Self { success: false, message: message.into() }
    }
}
