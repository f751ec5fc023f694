use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{db_types::Cursors, traits::StoreError};

pub async fn fetch_cursors(conn: &mut SqliteConnection) -> Result<Cursors, StoreError> {
    let (payment, order): (i64, i64) =
        sqlx::query_as("SELECT payment_updated_at, order_updated_at FROM cursors WHERE id = 1")
            .fetch_one(conn)
            .await?;
    Ok(Cursors { payment_updated_at: from_unix(payment)?, order_updated_at: from_unix(order)? })
}

pub async fn set_order_cursor(to: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), StoreError> {
    sqlx::query("UPDATE cursors SET order_updated_at = $1 WHERE id = 1")
        .bind(to.timestamp())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_payment_cursor(to: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), StoreError> {
    sqlx::query("UPDATE cursors SET payment_updated_at = $1 WHERE id = 1")
        .bind(to.timestamp())
        .execute(conn)
        .await?;
    Ok(())
}

fn from_unix(ts: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(ts, 0).ok_or_else(|| StoreError::DatabaseError(format!("Invalid cursor timestamp: {ts}")))
}
