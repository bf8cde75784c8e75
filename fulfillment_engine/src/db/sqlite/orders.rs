use log::*;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CourierStatus, LineItem, NewOrder, Order, OrderId, OrderStatusHistory, OrderStatusType},
    traits::FulfillmentDbError,
};

/// Inserts the order row, its line items and the initial history entry using the given connection. This is not
/// atomic on its own; the caller embeds it in a transaction and passes `&mut *tx` as the connection argument.
pub async fn insert_order(order: &NewOrder, conn: &mut SqliteConnection) -> Result<i64, FulfillmentDbError> {
    if order_exists(&order.order_id, &mut *conn).await?.is_some() {
        return Err(FulfillmentDbError::OrderAlreadyExists(order.order_id.clone()));
    }
    let address = serde_json::to_string(&order.address)?;
    let pricing = serde_json::to_string(&order.pricing)?;
    let result = sqlx::query(
        r#"
            INSERT INTO orders (
                order_id, customer_id, vendor_id, status, payment_status,
                delivery_type, delivery_provider, courier_status, settlement,
                subtotal, delivery_fee, total_price, currency, address, pricing, scheduled_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16);
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.customer_id)
    .bind(&order.vendor_id)
    .bind(order.status.as_str())
    .bind(order.payment_status.as_str())
    .bind(order.delivery_type.as_str())
    .bind(order.delivery_provider.as_str())
    .bind(order.courier_status.as_str())
    .bind(order.settlement.as_str())
    .bind(order.subtotal)
    .bind(order.delivery_fee)
    .bind(order.total_price)
    .bind(&order.currency)
    .bind(address)
    .bind(pricing)
    .bind(order.scheduled_at)
    .execute(&mut *conn)
    .await?;
    let order_pk = result.last_insert_rowid();
    for item in &order.items {
        sqlx::query("INSERT INTO order_items (order_pk, variant_id, quantity, unit_price) VALUES ($1, $2, $3, $4)")
            .bind(order_pk)
            .bind(&item.variant_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *conn)
            .await?;
    }
    append_history(&order.order_id, order.status, None, &mut *conn).await?;
    trace!("🗃️ Order {} saved with pk {order_pk}", order.order_id);
    Ok(order_pk)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, FulfillmentDbError> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE order_id = $1 LIMIT 1")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(order)
}

pub async fn order_exists(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<i64>, FulfillmentDbError> {
    let id: Option<i64> = sqlx::query_scalar("SELECT id FROM orders WHERE order_id = $1")
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(id)
}

pub async fn fetch_orders_for_customer(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, FulfillmentDbError> {
    let orders =
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE customer_id = $1 ORDER BY created_at DESC, id DESC")
            .bind(customer_id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(orders)
}

pub async fn fetch_order_items(order_pk: i64, conn: &mut SqliteConnection) -> Result<Vec<LineItem>, FulfillmentDbError> {
    let items = sqlx::query_as::<_, LineItem>("SELECT * FROM order_items WHERE order_pk = $1 ORDER BY id ASC")
        .bind(order_pk)
        .fetch_all(&mut *conn)
        .await?;
    Ok(items)
}

/// Updates the order status column. The caller is responsible for appending the matching history row in the same
/// transaction.
pub async fn update_order_status(
    order_id: &OrderId,
    status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentDbError> {
    let result = sqlx::query("UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2")
        .bind(status.as_str())
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(FulfillmentDbError::OrderNotFound(order_id.clone()));
    }
    Ok(())
}

pub async fn update_payment_status_for_order(
    order_id: &OrderId,
    payment_status: &str,
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentDbError> {
    let result =
        sqlx::query("UPDATE orders SET payment_status = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2")
            .bind(payment_status)
            .bind(order_id)
            .execute(&mut *conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(FulfillmentDbError::OrderNotFound(order_id.clone()));
    }
    Ok(())
}

pub async fn update_courier_status(
    order_id: &OrderId,
    courier_status: CourierStatus,
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentDbError> {
    let result =
        sqlx::query("UPDATE orders SET courier_status = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2")
            .bind(courier_status.as_str())
            .bind(order_id)
            .execute(&mut *conn)
            .await?;
    if result.rows_affected() == 0 {
        return Err(FulfillmentDbError::OrderNotFound(order_id.clone()));
    }
    Ok(())
}

pub async fn append_history(
    order_id: &OrderId,
    status: OrderStatusType,
    note: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentDbError> {
    sqlx::query("INSERT INTO order_status_history (order_id, status, note) VALUES ($1, $2, $3)")
        .bind(order_id)
        .bind(status.as_str())
        .bind(note)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn fetch_history(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<OrderStatusHistory>, FulfillmentDbError> {
    let rows = sqlx::query_as::<_, OrderStatusHistory>(
        "SELECT * FROM order_status_history WHERE order_id = $1 ORDER BY id ASC",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Same-day order count for the vendor, excluding cancelled and rejected orders. The day boundary follows the
/// database clock (UTC).
pub async fn count_vendor_orders_today(
    vendor_id: &str,
    conn: &mut SqliteConnection,
) -> Result<i64, FulfillmentDbError> {
    let count: i64 = sqlx::query_scalar(
        r#"
            SELECT COUNT(*) FROM orders
            WHERE vendor_id = $1
              AND created_at >= datetime('now', 'start of day')
              AND status NOT IN ('CANCELLED', 'VENDOR_REJECTED');
        "#,
    )
    .bind(vendor_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}
