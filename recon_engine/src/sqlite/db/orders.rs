use chrono::{DateTime, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatus, PaymentStage},
    traits::StoreError,
};

pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, StoreError> {
    if fetch_order(&order.id, conn).await?.is_some() {
        return Err(StoreError::OrderAlreadyExists(order.id));
    }
    let inserted: Order = sqlx::query_as("INSERT INTO orders (id, total_price, currency) VALUES ($1, $2, $3) RETURNING *")
        .bind(&order.id)
        .bind(order.total_price)
        .bind(&order.currency)
        .fetch_one(&mut *conn)
        .await?;
    sqlx::query("INSERT INTO order_meta (order_id) VALUES ($1)").bind(&inserted.id).execute(&mut *conn).await?;
    sqlx::query("INSERT INTO order_status_history (order_id, status, note) VALUES ($1, $2, 'Order created')")
        .bind(&inserted.id)
        .bind(OrderStatus::Pending)
        .execute(&mut *conn)
        .await?;
    debug!("📝️ Order {} inserted", inserted.id);
    Ok(inserted)
}

pub async fn fetch_order(id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await
}

/// Fetches the order only while it is still in a pre-settlement status.
pub async fn fetch_open_order(id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM orders WHERE id = $1 AND status IN ('Pending', 'AwaitingConfirmation', 'MultiToken')",
    )
    .bind(id.as_str())
    .fetch_optional(conn)
    .await
}

/// Completed/Canceled orders modified at or after `since` that the reconciliation has not
/// finished with. The inclusive comparison keeps the at-least-once guarantee at the cursor
/// boundary.
pub async fn actionable_orders_since(
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT o.* FROM orders o
        LEFT JOIN order_meta m ON m.order_id = o.id
        WHERE o.status IN ('Completed', 'Canceled')
          AND unixepoch(o.updated_at) >= $1
          AND (m.processing_completed IS NULL OR m.processing_completed = 'no')
        ORDER BY o.updated_at ASC, o.id ASC
        "#,
    )
    .bind(since.timestamp())
    .fetch_all(conn)
    .await
}

pub async fn orders_with_status(
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT o.* FROM orders o
        LEFT JOIN order_meta m ON m.order_id = o.id
        WHERE o.status = $1
          AND (m.processing_completed IS NULL OR m.processing_completed = 'no')
        ORDER BY o.updated_at ASC
        "#,
    )
    .bind(status)
    .fetch_all(conn)
    .await
}

pub async fn orders_in_stage(stage: PaymentStage, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT o.* FROM orders o
        JOIN order_meta m ON m.order_id = o.id
        WHERE m.payment_status = $1
          AND (m.processing_completed IS NULL OR m.processing_completed = 'no')
        ORDER BY o.updated_at ASC
        "#,
    )
    .bind(stage)
    .fetch_all(conn)
    .await
}

pub async fn retryable_orders(conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT o.* FROM orders o
        JOIN order_meta m ON m.order_id = o.id
        WHERE m.transient_error = 'yes'
          AND (m.hard_error IS NULL OR m.hard_error = 'no')
          AND (m.processing_completed IS NULL OR m.processing_completed = 'no')
        ORDER BY o.updated_at ASC
        "#,
    )
    .fetch_all(conn)
    .await
}

/// Transitions the order status and appends the history row. Call inside a transaction.
pub async fn update_order_status(
    id: &OrderId,
    status: OrderStatus,
    note: &str,
    conn: &mut SqliteConnection,
) -> Result<Order, StoreError> {
    let order: Option<Order> =
        sqlx::query_as("UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *")
            .bind(status)
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await?;
    let order = order.ok_or_else(|| StoreError::OrderNotFound(id.clone()))?;
    sqlx::query("INSERT INTO order_status_history (order_id, status, note) VALUES ($1, $2, $3)")
        .bind(id.as_str())
        .bind(status)
        .bind(note)
        .execute(&mut *conn)
        .await?;
    debug!("📝️ Order {id} moved to {status}");
    Ok(order)
}
