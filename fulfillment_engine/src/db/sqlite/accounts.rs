use sqlx::SqliteConnection;

use crate::{
    db_types::{Customer, Vendor},
    traits::FulfillmentDbError,
};

pub async fn fetch_vendor(vendor_id: &str, conn: &mut SqliteConnection) -> Result<Option<Vendor>, FulfillmentDbError> {
    let vendor = sqlx::query_as::<_, Vendor>("SELECT * FROM vendors WHERE id = $1")
        .bind(vendor_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(vendor)
}

pub async fn fetch_customer(
    customer_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Customer>, FulfillmentDbError> {
    let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(customer)
}
