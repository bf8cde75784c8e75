use std::fmt::Debug;

use log::*;
use sqlx::SqlitePool;

use sfg_common::Rial;

use crate::{
    db::sqlite::{accounts, db_url, event_log, new_pool, notifications, orders, payments},
    db_types::{
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
        PaymentStatus,
        Vendor,
    },
    traits::{AttemptOutcome, AuditError, AuditEvent, AuditRecorder, FulfillmentDatabase, FulfillmentDbError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL from the environment.
    pub async fn new(max_connections: u32) -> Result<Self, FulfillmentDbError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, FulfillmentDbError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Applies the embedded migrations. Called once at startup.
    pub async fn migrate(&self) -> Result<(), FulfillmentDbError> {
        sqlx::migrate!("./src/db/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| FulfillmentDbError::DatabaseError(e.to_string()))?;
        info!("🗃️ Migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Upserts a vendor record. The engine only reads vendors; this exists for provisioning and tests.
    pub async fn upsert_vendor(&self, vendor: &Vendor) -> Result<(), FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(
            r#"
                INSERT INTO vendors (id, name, lat, lng, service_radius_km, is_active, max_daily_orders, chat_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO UPDATE SET
                    name = excluded.name,
                    lat = excluded.lat,
                    lng = excluded.lng,
                    service_radius_km = excluded.service_radius_km,
                    is_active = excluded.is_active,
                    max_daily_orders = excluded.max_daily_orders,
                    chat_id = excluded.chat_id;
            "#,
        )
        .bind(&vendor.id)
        .bind(&vendor.name)
        .bind(vendor.lat)
        .bind(vendor.lng)
        .bind(vendor.service_radius_km)
        .bind(vendor.is_active)
        .bind(vendor.max_daily_orders)
        .bind(&vendor.chat_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Upserts a customer record. As with vendors, for provisioning and tests.
    pub async fn upsert_customer(&self, customer: &Customer) -> Result<(), FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query(
            r#"
                INSERT INTO customers (id, mobile, chat_id, is_active)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE SET
                    mobile = excluded.mobile,
                    chat_id = excluded.chat_id,
                    is_active = excluded.is_active;
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.mobile)
        .bind(&customer.chat_id)
        .bind(customer.is_active)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

impl FulfillmentDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, FulfillmentDbError> {
        let mut tx = self.pool.begin().await?;
        let pk = orders::insert_order(&order, &mut tx).await?;
        let saved = orders::fetch_order_by_order_id(&order.order_id, &mut tx)
            .await?
            .ok_or_else(|| FulfillmentDbError::OrderNotFound(order.order_id.clone()))?;
        tx.commit().await?;
        debug!("🗃️ Order {} has been saved in the DB with id {pk}", order.order_id);
        Ok(saved)
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_order_id(order_id, &mut conn).await
    }

    async fn fetch_order_items(&self, order: &Order) -> Result<Vec<LineItem>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_items(order.id, &mut conn).await
    }

    async fn fetch_orders_for_customer(&self, customer_id: &str) -> Result<Vec<Order>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders_for_customer(customer_id, &mut conn).await
    }

    async fn update_order_status(
        &self,
        order_id: &OrderId,
        next: OrderStatusType,
        note: Option<&str>,
    ) -> Result<Order, FulfillmentDbError> {
        let mut tx = self.pool.begin().await?;
        orders::update_order_status(order_id, next, &mut tx).await?;
        orders::append_history(order_id, next, note, &mut tx).await?;
        let updated = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| FulfillmentDbError::OrderNotFound(order_id.clone()))?;
        tx.commit().await?;
        trace!("🗃️ Order {order_id} is now {next}");
        Ok(updated)
    }

    async fn fetch_history_for_order(&self, order_id: &OrderId) -> Result<Vec<OrderStatusHistory>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_history(order_id, &mut conn).await
    }

    async fn update_courier_status(
        &self,
        order_id: &OrderId,
        courier_status: CourierStatus,
    ) -> Result<(), FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_courier_status(order_id, courier_status, &mut conn).await
    }

    async fn count_vendor_orders_today(&self, vendor_id: &str) -> Result<i64, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        orders::count_vendor_orders_today(vendor_id, &mut conn).await
    }

    async fn fetch_vendor(&self, vendor_id: &str) -> Result<Option<Vendor>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        accounts::fetch_vendor(vendor_id, &mut conn).await
    }

    async fn fetch_customer(&self, customer_id: &str) -> Result<Option<Customer>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        accounts::fetch_customer(customer_id, &mut conn).await
    }

    async fn upsert_pending_payment(
        &self,
        order_id: &OrderId,
        customer_id: &str,
        provider: &str,
        track_id: &str,
        amount: Rial,
    ) -> Result<Payment, FulfillmentDbError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::upsert_pending(order_id, customer_id, provider, track_id, amount, &mut tx).await?;
        orders::update_payment_status_for_order(order_id, PaymentStatus::Pending.as_str(), &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Payment row for order {order_id} is PENDING with track id {track_id}");
        Ok(payment)
    }

    async fn fetch_payment_by_track_id(&self, track_id: &str) -> Result<Option<Payment>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_by_track_id(track_id, &mut conn).await
    }

    async fn fetch_payment_for_order(&self, order_id: &OrderId) -> Result<Option<Payment>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_by_order(order_id, &mut conn).await
    }

    async fn insert_payment_attempt(&self, attempt: NewPaymentAttempt) -> Result<(), FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        payments::insert_attempt(&attempt, &mut conn).await
    }

    async fn fetch_payment_attempts(&self, payment_id: i64) -> Result<Vec<PaymentAttempt>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_attempts(payment_id, &mut conn).await
    }

    async fn settle_payment(
        &self,
        track_id: &str,
        ref_number: Option<&str>,
    ) -> Result<(Payment, Order), FulfillmentDbError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::fetch_by_track_id(track_id, &mut tx)
            .await?
            .ok_or_else(|| FulfillmentDbError::PaymentNotFound(track_id.to_string()))?;
        payments::update_status(track_id, PaymentStatus::Paid, ref_number, &mut tx).await?;
        orders::update_payment_status_for_order(&payment.order_id, PaymentStatus::Paid.as_str(), &mut tx).await?;
        let order = orders::fetch_order_by_order_id(&payment.order_id, &mut tx)
            .await?
            .ok_or_else(|| FulfillmentDbError::OrderNotFound(payment.order_id.clone()))?;
        if order.status == OrderStatusType::Placed {
            orders::append_history(&payment.order_id, OrderStatusType::Placed, Some("payment confirmed"), &mut tx)
                .await?;
        }
        let payment = payments::fetch_by_track_id(track_id, &mut tx)
            .await?
            .ok_or_else(|| FulfillmentDbError::PaymentNotFound(track_id.to_string()))?;
        tx.commit().await?;
        debug!("🗃️ Payment {track_id} marked PAID for order {}", order.order_id);
        Ok((payment, order))
    }

    async fn fail_payment(&self, track_id: &str) -> Result<(Payment, Order), FulfillmentDbError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::fetch_by_track_id(track_id, &mut tx)
            .await?
            .ok_or_else(|| FulfillmentDbError::PaymentNotFound(track_id.to_string()))?;
        payments::update_status(track_id, PaymentStatus::Failed, None, &mut tx).await?;
        orders::update_payment_status_for_order(&payment.order_id, PaymentStatus::Failed.as_str(), &mut tx).await?;
        let order = orders::fetch_order_by_order_id(&payment.order_id, &mut tx)
            .await?
            .ok_or_else(|| FulfillmentDbError::OrderNotFound(payment.order_id.clone()))?;
        let payment = payments::fetch_by_track_id(track_id, &mut tx)
            .await?
            .ok_or_else(|| FulfillmentDbError::PaymentNotFound(track_id.to_string()))?;
        tx.commit().await?;
        debug!("🗃️ Payment {track_id} marked FAILED for order {}", order.order_id);
        Ok((payment, order))
    }

    async fn insert_notification(&self, record: NewNotificationRecord) -> Result<NotificationRecord, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        notifications::insert(&record, &mut conn).await
    }

    async fn record_notification_attempt(
        &self,
        notification_id: i64,
        outcome: AttemptOutcome,
    ) -> Result<NotificationRecord, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        notifications::record_attempt(notification_id, &outcome, &mut conn).await
    }

    async fn fetch_notification(&self, notification_id: i64) -> Result<Option<NotificationRecord>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        notifications::fetch(notification_id, &mut conn).await
    }

    async fn push_dead_letter(&self, record: &NotificationRecord, reason: &str) -> Result<(), FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        notifications::push_dead_letter(record, reason, &mut conn).await
    }

    async fn fetch_dead_letters(&self) -> Result<Vec<DeadLetter>, FulfillmentDbError> {
        let mut conn = self.pool.acquire().await?;
        notifications::fetch_dead_letters(&mut conn).await
    }

    async fn close(&mut self) -> Result<(), FulfillmentDbError> {
        self.pool.close().await;
        Ok(())
    }
}

impl AuditRecorder for SqliteDatabase {
    async fn record(&self, event_name: &str, event: AuditEvent) -> Result<(), AuditError> {
        let mut conn = self.pool.acquire().await.map_err(|e| AuditError::StorageError(e.to_string()))?;
        event_log::insert_event(event_name, &event, &mut conn)
            .await
            .map_err(|e| AuditError::StorageError(e.to_string()))?;
        trace!("🗃️ {event_name} recorded");
        Ok(())
    }
}
