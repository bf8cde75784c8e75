use sqlx::SqliteConnection;

use crate::traits::{AuditEvent, FulfillmentDbError};

/// Appends one row to the event log. Append-only; nothing reads it back through the engine.
pub async fn insert_event(
    event_name: &str,
    event: &AuditEvent,
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentDbError> {
    let metadata = serde_json::to_string(&event.metadata)?;
    sqlx::query(
        r#"
            INSERT INTO event_log (event_name, order_id, customer_id, vendor_id, actor_type, metadata)
            VALUES ($1, $2, $3, $4, $5, $6);
        "#,
    )
    .bind(event_name)
    .bind(&event.order_id)
    .bind(&event.customer_id)
    .bind(&event.vendor_id)
    .bind(event.actor_type.map(|a| a.as_str()))
    .bind(metadata)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
