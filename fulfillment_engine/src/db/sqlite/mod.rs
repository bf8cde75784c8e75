//! Sqlite backend for the fulfillment engine.
//!
//! Each table has its own query module with free functions taking a `&mut SqliteConnection`, so they can be
//! composed inside transactions opened by the trait implementation in [`db`]. None of these functions open
//! transactions themselves.
mod accounts;
mod db;
mod event_log;
mod notifications;
mod orders;
mod payments;
mod rows;

use std::{env, str::FromStr};

use log::*;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

pub use db::SqliteDatabase;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/sofra.db";

pub fn db_url() -> String {
    env::var("SFG_DATABASE_URL").ok().unwrap_or_else(|| {
        warn!("🗃️ SFG_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}");
        DEFAULT_DATABASE_URL.to_string()
    })
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true).foreign_keys(true);
    SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await
}
