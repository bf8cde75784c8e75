use sqlx::SqliteConnection;

use crate::{
    db_types::{DeadLetter, NewNotificationRecord, NotificationRecord},
    traits::{AttemptOutcome, FulfillmentDbError},
};

pub async fn insert(
    record: &NewNotificationRecord,
    conn: &mut SqliteConnection,
) -> Result<NotificationRecord, FulfillmentDbError> {
    let result = sqlx::query(
        r#"
            INSERT INTO notifications (channel, recipient, message, event_name, order_id, customer_id, vendor_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7);
        "#,
    )
    .bind(record.channel.as_str())
    .bind(&record.recipient)
    .bind(&record.message)
    .bind(&record.correlation.event_name)
    .bind(&record.correlation.order_id)
    .bind(&record.correlation.customer_id)
    .bind(&record.correlation.vendor_id)
    .execute(&mut *conn)
    .await?;
    let id = result.last_insert_rowid();
    fetch(id, conn).await?.ok_or(FulfillmentDbError::NotificationNotFound(id))
}

pub async fn fetch(id: i64, conn: &mut SqliteConnection) -> Result<Option<NotificationRecord>, FulfillmentDbError> {
    let record = sqlx::query_as::<_, NotificationRecord>("SELECT * FROM notifications WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(record)
}

pub async fn record_attempt(
    id: i64,
    outcome: &AttemptOutcome,
    conn: &mut SqliteConnection,
) -> Result<NotificationRecord, FulfillmentDbError> {
    let result = match outcome {
        AttemptOutcome::Delivered { provider_message_id, provider_status } => {
            sqlx::query(
                r#"
                    UPDATE notifications
                    SET status = 'SENT',
                        attempts = attempts + 1,
                        last_error = NULL,
                        provider_message_id = $1,
                        provider_status = $2,
                        updated_at = CURRENT_TIMESTAMP
                    WHERE id = $3;
                "#,
            )
            .bind(provider_message_id)
            .bind(provider_status)
            .bind(id)
            .execute(&mut *conn)
            .await?
        },
        AttemptOutcome::Failed { error } => {
            sqlx::query(
                r#"
                    UPDATE notifications
                    SET status = 'FAILED',
                        attempts = attempts + 1,
                        last_error = $1,
                        updated_at = CURRENT_TIMESTAMP
                    WHERE id = $2;
                "#,
            )
            .bind(error)
            .bind(id)
            .execute(&mut *conn)
            .await?
        },
    };
    if result.rows_affected() == 0 {
        return Err(FulfillmentDbError::NotificationNotFound(id));
    }
    fetch(id, conn).await?.ok_or(FulfillmentDbError::NotificationNotFound(id))
}

/// Copies the original payload into the dead-letter table. The source record stays in place; the dead letter is
/// the operator-facing queue.
pub async fn push_dead_letter(
    record: &NotificationRecord,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentDbError> {
    sqlx::query(
        r#"
            INSERT INTO dead_letters (notification_id, channel, recipient, message, reason)
            VALUES ($1, $2, $3, $4, $5);
        "#,
    )
    .bind(record.id)
    .bind(record.channel.as_str())
    .bind(&record.recipient)
    .bind(&record.message)
    .bind(reason)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn fetch_dead_letters(conn: &mut SqliteConnection) -> Result<Vec<DeadLetter>, FulfillmentDbError> {
    let rows = sqlx::query_as::<_, DeadLetter>("SELECT * FROM dead_letters ORDER BY id ASC")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}
