//! # SQLite store internals
//!
//! Low-level database interactions, kept as simple functions that accept a
//! `&mut SqliteConnection`. Callers obtain a connection from the pool, or open a transaction
//! and pass `&mut *tx`, without any other changes.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod cursors;
pub mod meta;
pub mod orders;

const SQLITE_DB_URL: &str = "sqlite://data/recon_store.db";

pub fn db_url() -> String {
    let result = env::var("TPR_DATABASE_URL").unwrap_or_else(|_| {
        info!("TPR_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
