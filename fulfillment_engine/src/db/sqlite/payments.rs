use log::*;
use sqlx::SqliteConnection;

use sfg_common::Rial;

use crate::{
    db_types::{NewPaymentAttempt, OrderId, Payment, PaymentAttempt, PaymentStatus},
    traits::FulfillmentDbError,
};

/// Creates or refreshes the single payment row for an order and resets it to PENDING. The upsert keyed on
/// `order_id` is what guarantees at most one live payment row per order: a retried cycle reuses the row instead of
/// creating a second one.
pub async fn upsert_pending(
    order_id: &OrderId,
    customer_id: &str,
    provider: &str,
    track_id: &str,
    amount: Rial,
    conn: &mut SqliteConnection,
) -> Result<Payment, FulfillmentDbError> {
    sqlx::query(
        r#"
            INSERT INTO payments (order_id, customer_id, provider, track_id, amount, status)
            VALUES ($1, $2, $3, $4, $5, 'PENDING')
            ON CONFLICT (order_id) DO UPDATE SET
                provider = excluded.provider,
                track_id = excluded.track_id,
                amount = excluded.amount,
                status = 'PENDING',
                verified_at = NULL,
                ref_number = NULL,
                updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(order_id)
    .bind(customer_id)
    .bind(provider)
    .bind(track_id)
    .bind(amount)
    .execute(&mut *conn)
    .await?;
    fetch_by_order(order_id, conn)
        .await?
        .ok_or_else(|| FulfillmentDbError::PaymentNotFound(track_id.to_string()))
}

pub async fn fetch_by_track_id(track_id: &str, conn: &mut SqliteConnection) -> Result<Option<Payment>, FulfillmentDbError> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE track_id = $1")
        .bind(track_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_by_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Payment>, FulfillmentDbError> {
    let payment = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(payment)
}

pub async fn insert_attempt(attempt: &NewPaymentAttempt, conn: &mut SqliteConnection) -> Result<(), FulfillmentDbError> {
    let raw = serde_json::to_string(&attempt.raw_response)?;
    sqlx::query(
        r#"
            INSERT INTO payment_attempts (payment_id, kind, track_id, amount, status, raw_response)
            VALUES ($1, $2, $3, $4, $5, $6);
        "#,
    )
    .bind(attempt.payment_id)
    .bind(attempt.kind.as_str())
    .bind(&attempt.track_id)
    .bind(attempt.amount)
    .bind(attempt.status.as_str())
    .bind(raw)
    .execute(&mut *conn)
    .await?;
    trace!("🗃️ Payment attempt ({}) appended for track {}", attempt.kind, attempt.track_id);
    Ok(())
}

pub async fn fetch_attempts(payment_id: i64, conn: &mut SqliteConnection) -> Result<Vec<PaymentAttempt>, FulfillmentDbError> {
    let attempts =
        sqlx::query_as::<_, PaymentAttempt>("SELECT * FROM payment_attempts WHERE payment_id = $1 ORDER BY id ASC")
            .bind(payment_id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(attempts)
}

/// Moves the payment to a terminal-or-retryable status. Only the payment row; the order columns are handled by the
/// caller inside the same transaction.
pub async fn update_status(
    track_id: &str,
    status: PaymentStatus,
    ref_number: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentDbError> {
    let result = match status {
        PaymentStatus::Paid => {
            sqlx::query(
                r#"
                    UPDATE payments
                    SET status = 'PAID',
                        verified_at = CURRENT_TIMESTAMP,
                        ref_number = COALESCE($1, ref_number),
                        updated_at = CURRENT_TIMESTAMP
                    WHERE track_id = $2;
                "#,
            )
            .bind(ref_number)
            .bind(track_id)
            .execute(&mut *conn)
            .await?
        },
        other => {
            sqlx::query("UPDATE payments SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE track_id = $2")
                .bind(other.as_str())
                .bind(track_id)
                .execute(&mut *conn)
                .await?
        },
    };
    if result.rows_affected() == 0 {
        return Err(FulfillmentDbError::PaymentNotFound(track_id.to_string()));
    }
    Ok(())
}
