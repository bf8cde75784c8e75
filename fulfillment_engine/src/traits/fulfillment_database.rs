use thiserror::Error;

use crate::db_types::{
    CourierStatus,
    Customer,
    DeadLetter,
    LineItem,
    NewNotificationRecord,
    NewOrder,
    NewPaymentAttempt,
    NotificationRecord,
    Order,
    OrderId,
    OrderStatusHistory,
    OrderStatusType,
    Payment,
    PaymentAttempt,
    Vendor,
};

/// This trait defines the storage behaviour required by the fulfillment engine.
///
/// This behaviour includes:
/// * Persisting orders, line items and the append-only status history
/// * Applying status transitions atomically with their history rows
/// * The payment upsert / attempt-ledger / settlement protocol
/// * Write-ahead notification records and the dead-letter store
///
/// State-mutating sequences that touch Order + Payment + History together run inside a single transaction owned by
/// the implementation. Concurrent callers race on that boundary: whichever commits first wins and the loser
/// observes the already-terminal state.
#[allow(async_fn_in_trait)]
pub trait FulfillmentDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Persists a new order, its line items, and the initial status history row in a single atomic transaction.
    /// Fails if an order with the same `order_id` already exists.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, FulfillmentDbError>;

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, FulfillmentDbError>;

    async fn fetch_order_items(&self, order: &Order) -> Result<Vec<LineItem>, FulfillmentDbError>;

    /// Orders for a customer, most recent first.
    async fn fetch_orders_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, FulfillmentDbError>;

    /// Applies a status transition: updates the order row and appends the history row in one transaction. Legality
    /// and authorization have already been checked by the lifecycle; this call only persists.
    async fn update_order_status(
        &self,
        order_id: &OrderId,
        next: OrderStatusType,
        note: Option<&str>,
    ) -> Result<Order, FulfillmentDbError>;

    async fn fetch_history_for_order(&self, order_id: &OrderId) -> Result<Vec<OrderStatusHistory>, FulfillmentDbError>;

    /// Updates the courier leg of an order without touching the state machine.
    async fn update_courier_status(
        &self,
        order_id: &OrderId,
        courier_status: CourierStatus,
    ) -> Result<(), FulfillmentDbError>;

    /// Same-day order count for a vendor, excluding cancelled and rejected orders. Used to enforce daily capacity.
    async fn count_vendor_orders_today(&self, vendor_id: &str) -> Result<i64, FulfillmentDbError>;

    async fn fetch_vendor(&self, vendor_id: &str) -> Result<Option<Vendor>, FulfillmentDbError>;

    async fn fetch_customer(&self, customer_id: &str) -> Result<Option<Customer>, FulfillmentDbError>;

    /// Creates or refreshes the payment row for an order and marks it PENDING. At most one live payment row exists
    /// per order; a FAILED row is reused by the next request cycle.
    async fn upsert_pending_payment(
        &self,
        order_id: &OrderId,
        customer_id: &str,
        provider: &str,
        track_id: &str,
        amount: sfg_common::Rial,
    ) -> Result<Payment, FulfillmentDbError>;

    async fn fetch_payment_by_track_id(&self, track_id: &str) -> Result<Option<Payment>, FulfillmentDbError>;

    async fn fetch_payment_for_order(&self, order_id: &OrderId) -> Result<Option<Payment>, FulfillmentDbError>;

    /// Appends a row to the payment attempt ledger. The ledger is append-only; rows are never updated.
    async fn insert_payment_attempt(&self, attempt: NewPaymentAttempt) -> Result<(), FulfillmentDbError>;

    /// The attempt ledger for a payment, oldest first. Read-only; used for dispute forensics.
    async fn fetch_payment_attempts(&self, payment_id: i64) -> Result<Vec<PaymentAttempt>, FulfillmentDbError>;

    /// Marks the payment PAID and the order's payment status PAID in one atomic transaction. If the order is still
    /// PLACED, a "payment confirmed" history note is appended without changing the status.
    ///
    /// Returns the settled payment and the updated order.
    async fn settle_payment(
        &self,
        track_id: &str,
        ref_number: Option<&str>,
    ) -> Result<(Payment, Order), FulfillmentDbError>;

    /// Marks the payment and the order's payment status FAILED in one atomic transaction.
    async fn fail_payment(&self, track_id: &str) -> Result<(Payment, Order), FulfillmentDbError>;

    /// Persists the write-ahead notification record in PENDING state. This must happen before any network call.
    async fn insert_notification(&self, record: NewNotificationRecord) -> Result<NotificationRecord, FulfillmentDbError>;

    /// Records the outcome of one delivery attempt: increments the attempt counter, sets SENT or FAILED, and stores
    /// the provider receipt or the error.
    async fn record_notification_attempt(
        &self,
        notification_id: i64,
        outcome: AttemptOutcome,
    ) -> Result<NotificationRecord, FulfillmentDbError>;

    async fn fetch_notification(&self, notification_id: i64) -> Result<Option<NotificationRecord>, FulfillmentDbError>;

    /// Copies a notification that exhausted its retries into the dead-letter store, along with the failure reason.
    async fn push_dead_letter(&self, record: &NotificationRecord, reason: &str) -> Result<(), FulfillmentDbError>;

    /// Dead letters awaiting operator inspection, oldest first.
    async fn fetch_dead_letters(&self) -> Result<Vec<DeadLetter>, FulfillmentDbError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), FulfillmentDbError> {
        Ok(())
    }
}

/// The result of a single notification delivery attempt, as recorded against the write-ahead record.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Delivered { provider_message_id: Option<String>, provider_status: Option<String> },
    Failed { error: String },
}

#[derive(Debug, Clone, Error)]
pub enum FulfillmentDbError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested payment does not exist for track id {0}")]
    PaymentNotFound(String),
    #[error("The requested vendor {0} does not exist")]
    VendorNotFound(String),
    #[error("The requested notification record {0} does not exist")]
    NotificationNotFound(i64),
    #[error("Could not encode or decode a stored value. {0}")]
    EncodingError(String),
}

impl From<sqlx::Error> for FulfillmentDbError {
    fn from(e: sqlx::Error) -> Self {
        FulfillmentDbError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for FulfillmentDbError {
    fn from(e: serde_json::Error) -> Self {
        FulfillmentDbError::EncodingError(e.to_string())
    }
}
