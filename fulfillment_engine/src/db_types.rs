use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use sfg_common::Rial;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(pub String);

//--------------------------------------        OrderId        -------------------------------------------------------
/// The public identifier of an order, as handed out to customers, vendors and payment correlations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The short suffix used in customer-facing copy.
    pub fn short(&self) -> &str {
        let n = self.0.len();
        &self.0[n.saturating_sub(6)..]
    }
}

//--------------------------------------   OrderStatusType     -------------------------------------------------------
/// The order state machine states. The wire representation is the SCREAMING_SNAKE string for each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// A cart that has been persisted but not yet submitted.
    Draft,
    /// The order has been submitted and priced. This is the entry state for fulfillment.
    Placed,
    VendorAccepted,
    /// Terminal. The vendor declined the order.
    VendorRejected,
    Preparing,
    Ready,
    CourierAssigned,
    OutForDelivery,
    /// Terminal. The order reached the customer.
    Delivered,
    /// Terminal. Cancelled by the customer (while still pending) or by an admin.
    Cancelled,
}

impl OrderStatusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Placed => "PLACED",
            Self::VendorAccepted => "VENDOR_ACCEPTED",
            Self::VendorRejected => "VENDOR_REJECTED",
            Self::Preparing => "PREPARING",
            Self::Ready => "READY",
            Self::CourierAssigned => "COURIER_ASSIGNED",
            Self::OutForDelivery => "OUT_FOR_DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// The adjacency table for the order state machine. This is the sole source of truth for transition legality;
    /// actor authorization is layered on top of it, never instead of it.
    pub fn next_states(&self) -> &'static [OrderStatusType] {
        use OrderStatusType::*;
        match self {
            Draft => &[Placed, Cancelled],
            Placed => &[VendorAccepted, VendorRejected, Cancelled],
            VendorAccepted => &[Preparing, Cancelled],
            Preparing => &[Ready, Cancelled],
            Ready => &[CourierAssigned, Cancelled],
            CourierAssigned => &[OutForDelivery, Cancelled],
            OutForDelivery => &[Delivered, Cancelled],
            VendorRejected | Delivered | Cancelled => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next_states().is_empty()
    }

    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        self.next_states().contains(&next)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "PLACED" => Ok(Self::Placed),
            "VENDOR_ACCEPTED" => Ok(Self::VendorAccepted),
            "VENDOR_REJECTED" => Ok(Self::VendorRejected),
            "PREPARING" => Ok(Self::Preparing),
            "READY" => Ok(Self::Ready),
            "COURIER_ASSIGNED" => Ok(Self::CourierAssigned),
            "OUT_FOR_DELIVERY" => Ok(Self::OutForDelivery),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------    PaymentStatus      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// No online payment applies to this order (cash-on-delivery settlement).
    None,
    Pending,
    /// Terminal. Once a payment is PAID, every further verify or callback becomes a no-op.
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
        }
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(Self::None),
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "FAILED" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

//--------------------------------------    DeliveryType       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryType {
    /// The customer is within the vendor's service radius; the vendor's own courier delivers.
    InZoneInternal,
    /// The customer is beyond the service radius; a third-party courier delivers, settled cash-on-delivery.
    OutOfZoneCourier,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InZoneInternal => "IN_ZONE_INTERNAL",
            Self::OutOfZoneCourier => "OUT_OF_ZONE_COURIER",
        }
    }
}

impl Display for DeliveryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_ZONE_INTERNAL" => Ok(Self::InZoneInternal),
            "OUT_OF_ZONE_COURIER" => Ok(Self::OutOfZoneCourier),
            s => Err(ConversionError(format!("Invalid delivery type: {s}"))),
        }
    }
}

//--------------------------------------  DeliveryProvider     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryProvider {
    InHouse,
    Courier,
}

impl DeliveryProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InHouse => "IN_HOUSE",
            Self::Courier => "COURIER",
        }
    }
}

impl Display for DeliveryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryProvider {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_HOUSE" => Ok(Self::InHouse),
            "COURIER" => Ok(Self::Courier),
            s => Err(ConversionError(format!("Invalid delivery provider: {s}"))),
        }
    }
}

//--------------------------------------   CourierStatus       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CourierStatus {
    Pending,
    Requested,
    Assigned,
    PickedUp,
    Completed,
}

impl CourierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Requested => "REQUESTED",
            Self::Assigned => "ASSIGNED",
            Self::PickedUp => "PICKED_UP",
            Self::Completed => "COMPLETED",
        }
    }
}

impl Display for CourierStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourierStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "REQUESTED" => Ok(Self::Requested),
            "ASSIGNED" => Ok(Self::Assigned),
            "PICKED_UP" => Ok(Self::PickedUp),
            "COMPLETED" => Ok(Self::Completed),
            s => Err(ConversionError(format!("Invalid courier status: {s}"))),
        }
    }
}

//--------------------------------------   SettlementType      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementType {
    /// Paid online through the gateway before fulfillment starts.
    Prepaid,
    /// Collected by the courier on delivery. Mandatory for out-of-zone deliveries.
    Cod,
}

impl SettlementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepaid => "PREPAID",
            Self::Cod => "COD",
        }
    }
}

impl Display for SettlementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PREPAID" => Ok(Self::Prepaid),
            "COD" => Ok(Self::Cod),
            s => Err(ConversionError(format!("Invalid settlement type: {s}"))),
        }
    }
}

//--------------------------------------      ActorType        -------------------------------------------------------
/// Who performed an operation. Used for transition authorization and recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    Customer,
    Vendor,
    Admin,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "CUSTOMER",
            Self::Vendor => "VENDOR",
            Self::Admin => "ADMIN",
            Self::System => "SYSTEM",
        }
    }
}

impl Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CUSTOMER" => Ok(Self::Customer),
            "VENDOR" => Ok(Self::Vendor),
            "ADMIN" => Ok(Self::Admin),
            "SYSTEM" => Ok(Self::System),
            s => Err(ConversionError(format!("Invalid actor type: {s}"))),
        }
    }
}

/// An authenticated actor, as resolved by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub actor_type: ActorType,
    /// Customer id, vendor id or admin user id, depending on `actor_type`.
    pub id: String,
}

impl Actor {
    pub fn customer<S: Into<String>>(id: S) -> Self {
        Self { actor_type: ActorType::Customer, id: id.into() }
    }

    pub fn vendor<S: Into<String>>(id: S) -> Self {
        Self { actor_type: ActorType::Vendor, id: id.into() }
    }

    pub fn admin<S: Into<String>>(id: S) -> Self {
        Self { actor_type: ActorType::Admin, id: id.into() }
    }
}

//--------------------------------------  AddressSnapshot      -------------------------------------------------------
/// An immutable copy of the delivery address, taken at order time and decoupled from the live address record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressSnapshot {
    pub title: String,
    pub lat: f64,
    pub lng: f64,
    pub full_address: String,
}

//-------------------------------------- PricingBreakdown      -------------------------------------------------------
/// The inputs and result of the delivery fee calculation, persisted with the order for audit and dispute
/// resolution. Never recomputed after order placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingBreakdown {
    pub base_fee: Rial,
    pub per_km_rate: Rial,
    pub peak_multiplier: f64,
    pub estimated_fee: Rial,
    pub distance_km: f64,
}

//--------------------------------------        Order          -------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: String,
    pub vendor_id: String,
    pub status: OrderStatusType,
    pub payment_status: PaymentStatus,
    pub delivery_type: DeliveryType,
    pub delivery_provider: DeliveryProvider,
    pub courier_status: CourierStatus,
    pub settlement: SettlementType,
    pub subtotal: Rial,
    pub delivery_fee: Rial,
    /// Always recomputed server-side as `subtotal + delivery_fee`. Client-supplied totals are never trusted.
    pub total_price: Rial,
    pub currency: String,
    pub address: AddressSnapshot,
    pub pricing: PricingBreakdown,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      NewOrder         -------------------------------------------------------
/// Everything needed to persist a freshly placed order. All fields are already resolved by the time this struct is
/// built: the address snapshot comes from the address collaborator, the line items carry unit price snapshots, and
/// the delivery terms come out of the vendor matcher. Totals are computed by the lifecycle, not supplied by clients.
#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub customer_id: String,
    pub vendor_id: String,
    pub status: OrderStatusType,
    pub payment_status: PaymentStatus,
    pub delivery_type: DeliveryType,
    pub delivery_provider: DeliveryProvider,
    pub courier_status: CourierStatus,
    pub settlement: SettlementType,
    pub subtotal: Rial,
    pub delivery_fee: Rial,
    pub total_price: Rial,
    pub currency: String,
    pub address: AddressSnapshot,
    pub pricing: PricingBreakdown,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub items: Vec<NewLineItem>,
}

//--------------------------------------      LineItem         -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub variant_id: String,
    pub quantity: i64,
    /// Snapshot of the menu variant price at order time. Prices are never re-read live.
    pub unit_price: Rial,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineItem {
    pub id: i64,
    pub order_pk: i64,
    pub variant_id: String,
    pub quantity: i64,
    pub unit_price: Rial,
}

//-------------------------------------- OrderStatusHistory    -------------------------------------------------------
/// Append-only. One row per transition; never mutated or deleted. Doubles as the audit trail and the source for
/// SLA timing metrics downstream.
#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusHistory {
    pub id: i64,
    pub order_id: OrderId,
    pub status: OrderStatusType,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------       Payment         -------------------------------------------------------
/// At most one live payment row per order. Created via upsert keyed on the order; a FAILED payment is reused by the
/// next request cycle, a PAID payment is permanently terminal.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: OrderId,
    pub customer_id: String,
    pub provider: String,
    pub track_id: String,
    pub amount: Rial,
    pub status: PaymentStatus,
    pub verified_at: Option<DateTime<Utc>>,
    pub ref_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   PaymentAttempt      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptKind {
    Request,
    Verify,
    Callback,
}

impl AttemptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "REQUEST",
            Self::Verify => "VERIFY",
            Self::Callback => "CALLBACK",
        }
    }
}

impl Display for AttemptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUEST" => Ok(Self::Request),
            "VERIFY" => Ok(Self::Verify),
            "CALLBACK" => Ok(Self::Callback),
            s => Err(ConversionError(format!("Invalid attempt kind: {s}"))),
        }
    }
}

/// Append-only ledger of every interaction with the payment gateway. The raw provider response is stored verbatim
/// for forensic replay. Rows are never updated.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentAttempt {
    pub id: i64,
    pub payment_id: i64,
    pub kind: AttemptKind,
    pub track_id: String,
    pub amount: Rial,
    pub status: PaymentStatus,
    pub raw_response: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPaymentAttempt {
    pub payment_id: i64,
    pub kind: AttemptKind,
    pub track_id: String,
    pub amount: Rial,
    pub status: PaymentStatus,
    pub raw_response: serde_json::Value,
}

//--------------------------------------  NotificationRecord   -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationChannel {
    Chat,
    Sms,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "CHAT",
            Self::Sms => "SMS",
        }
    }
}

impl Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationChannel {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CHAT" => Ok(Self::Chat),
            "SMS" => Ok(Self::Sms),
            s => Err(ConversionError(format!("Invalid notification channel: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

impl Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid notification status: {s}"))),
        }
    }
}

/// Write-ahead record for a notification dispatch. Created in PENDING state *before* any network call is attempted,
/// so a crash mid-send always leaves an auditable, retryable trace.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub channel: NotificationChannel,
    pub recipient: String,
    pub message: String,
    pub event_name: Option<String>,
    pub order_id: Option<OrderId>,
    pub customer_id: Option<String>,
    pub vendor_id: Option<String>,
    pub status: NotificationStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub provider_message_id: Option<String>,
    pub provider_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct Correlation {
    pub event_name: Option<String>,
    pub order_id: Option<OrderId>,
    pub customer_id: Option<String>,
    pub vendor_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewNotificationRecord {
    pub channel: NotificationChannel,
    pub recipient: String,
    pub message: String,
    pub correlation: Correlation,
}

//--------------------------------------     DeadLetter        -------------------------------------------------------
/// A notification that exhausted its retry budget. Kept with the original payload for manual operator inspection;
/// never silently dropped.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub id: i64,
    pub notification_id: i64,
    pub channel: NotificationChannel,
    pub recipient: String,
    pub message: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------       Vendor          -------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct Vendor {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub service_radius_km: f64,
    pub is_active: bool,
    pub max_daily_orders: Option<i64>,
    pub chat_id: Option<String>,
}

//--------------------------------------      Customer         -------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
pub struct Customer {
    pub id: String,
    pub mobile: String,
    pub chat_id: Option<String>,
    pub is_active: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_status_round_trips_wire_strings() {
        for s in [
            "DRAFT",
            "PLACED",
            "VENDOR_ACCEPTED",
            "VENDOR_REJECTED",
            "PREPARING",
            "READY",
            "COURIER_ASSIGNED",
            "OUT_FOR_DELIVERY",
            "DELIVERED",
            "CANCELLED",
        ] {
            let status: OrderStatusType = s.parse().expect("valid status");
            assert_eq!(status.to_string(), s);
        }
        assert!("PAID".parse::<OrderStatusType>().is_err());
    }

    #[test]
    fn terminal_states_have_no_successors() {
        use OrderStatusType::*;
        for terminal in [VendorRejected, Delivered, Cancelled] {
            assert!(terminal.is_terminal());
        }
        for live in [Draft, Placed, VendorAccepted, Preparing, Ready, CourierAssigned, OutForDelivery] {
            assert!(!live.is_terminal());
        }
    }

    #[test]
    fn short_order_id_is_last_six_chars() {
        let oid = OrderId::from("ord-93ab41f2".to_string());
        assert_eq!(oid.short(), "ab41f2");
        assert_eq!(OrderId::from("ab1".to_string()).short(), "ab1");
    }
}
