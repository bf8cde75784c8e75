//! Manual row decoding for records that carry enums or JSON columns. Wire enums are stored as their
//! SCREAMING_SNAKE strings; snapshots and raw provider responses are stored as JSON text.
use std::str::FromStr;

use sqlx::{sqlite::SqliteRow, FromRow, Row};

use crate::db_types::{
    AddressSnapshot,
    AttemptKind,
    Customer,
    DeadLetter,
    LineItem,
    NotificationChannel,
    NotificationRecord,
    NotificationStatus,
    Order,
    OrderStatusHistory,
    OrderStatusType,
    Payment,
    PaymentAttempt,
    PaymentStatus,
    PricingBreakdown,
    Vendor,
};

fn decode_err(column: &str, source: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::ColumnDecode { index: column.to_string(), source: Box::new(source) }
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| decode_err(column, e))
}

fn parse_json<T: serde::de::DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).map_err(|e| decode_err(column, e))
}

impl FromRow<'_, SqliteRow> for Order {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Order {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            customer_id: row.try_get("customer_id")?,
            vendor_id: row.try_get("vendor_id")?,
            status: parse_column::<OrderStatusType>(row, "status")?,
            payment_status: parse_column::<PaymentStatus>(row, "payment_status")?,
            delivery_type: parse_column(row, "delivery_type")?,
            delivery_provider: parse_column(row, "delivery_provider")?,
            courier_status: parse_column(row, "courier_status")?,
            settlement: parse_column(row, "settlement")?,
            subtotal: row.try_get("subtotal")?,
            delivery_fee: row.try_get("delivery_fee")?,
            total_price: row.try_get("total_price")?,
            currency: row.try_get("currency")?,
            address: parse_json::<AddressSnapshot>(row, "address")?,
            pricing: parse_json::<PricingBreakdown>(row, "pricing")?,
            scheduled_at: row.try_get("scheduled_at")?,
            note: row.try_get("note")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for LineItem {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(LineItem {
            id: row.try_get("id")?,
            order_pk: row.try_get("order_pk")?,
            variant_id: row.try_get("variant_id")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for OrderStatusHistory {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(OrderStatusHistory {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            status: parse_column(row, "status")?,
            note: row.try_get("note")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for Payment {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Payment {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            customer_id: row.try_get("customer_id")?,
            provider: row.try_get("provider")?,
            track_id: row.try_get("track_id")?,
            amount: row.try_get("amount")?,
            status: parse_column(row, "status")?,
            verified_at: row.try_get("verified_at")?,
            ref_number: row.try_get("ref_number")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for PaymentAttempt {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(PaymentAttempt {
            id: row.try_get("id")?,
            payment_id: row.try_get("payment_id")?,
            kind: parse_column::<AttemptKind>(row, "kind")?,
            track_id: row.try_get("track_id")?,
            amount: row.try_get("amount")?,
            status: parse_column(row, "status")?,
            raw_response: parse_json(row, "raw_response")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for NotificationRecord {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(NotificationRecord {
            id: row.try_get("id")?,
            channel: parse_column::<NotificationChannel>(row, "channel")?,
            recipient: row.try_get("recipient")?,
            message: row.try_get("message")?,
            event_name: row.try_get("event_name")?,
            order_id: row.try_get("order_id")?,
            customer_id: row.try_get("customer_id")?,
            vendor_id: row.try_get("vendor_id")?,
            status: parse_column::<NotificationStatus>(row, "status")?,
            attempts: row.try_get("attempts")?,
            last_error: row.try_get("last_error")?,
            provider_message_id: row.try_get("provider_message_id")?,
            provider_status: row.try_get("provider_status")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for DeadLetter {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(DeadLetter {
            id: row.try_get("id")?,
            notification_id: row.try_get("notification_id")?,
            channel: parse_column::<NotificationChannel>(row, "channel")?,
            recipient: row.try_get("recipient")?,
            message: row.try_get("message")?,
            reason: row.try_get("reason")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for Vendor {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Vendor {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            lat: row.try_get("lat")?,
            lng: row.try_get("lng")?,
            service_radius_km: row.try_get("service_radius_km")?,
            is_active: row.try_get("is_active")?,
            max_daily_orders: row.try_get("max_daily_orders")?,
            chat_id: row.try_get("chat_id")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for Customer {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Customer {
            id: row.try_get("id")?,
            mobile: row.try_get("mobile")?,
            chat_id: row.try_get("chat_id")?,
            is_active: row.try_get("is_active")?,
        })
    }
}
