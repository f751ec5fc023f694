use sqlx::SqliteConnection;
use tpr_common::Flag;

use crate::db_types::{DataSource, HardFault, OrderId, OrderMeta, PaymentStage, TransientFault};

pub async fn fetch_meta(id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<OrderMeta>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM order_meta WHERE order_id = $1").bind(id.as_str()).fetch_optional(conn).await
}

/// Creates the metadata row if (and only if) the order exists. All the update functions below
/// are no-ops for ids without an order, which is what the jobs rely on.
async fn ensure_meta_row(id: &OrderId, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO order_meta (order_id) SELECT id FROM orders WHERE id = $1")
        .bind(id.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn save_addresses(id: &OrderId, addresses: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    ensure_meta_row(id, conn).await?;
    sqlx::query("UPDATE order_meta SET addresses = $1 WHERE order_id = $2")
        .bind(addresses)
        .bind(id.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_data_source(id: &OrderId, source: DataSource, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    ensure_meta_row(id, conn).await?;
    sqlx::query("UPDATE order_meta SET data_source = $1 WHERE order_id = $2")
        .bind(source)
        .bind(id.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_payment_stage(id: &OrderId, stage: PaymentStage, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    ensure_meta_row(id, conn).await?;
    sqlx::query("UPDATE order_meta SET payment_status = $1 WHERE order_id = $2")
        .bind(stage)
        .bind(id.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_processing_completed(id: &OrderId, done: Flag, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    ensure_meta_row(id, conn).await?;
    sqlx::query("UPDATE order_meta SET processing_completed = $1 WHERE order_id = $2")
        .bind(done)
        .bind(id.as_str())
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn record_operation_started(
    id: &OrderId,
    txid: &str,
    stage: PaymentStage,
    source: DataSource,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    ensure_meta_row(id, conn).await?;
    sqlx::query(
        r#"
        UPDATE order_meta
        SET txid = $1, payment_status = $2, processing_completed = 'no', data_source = $3
        WHERE order_id = $4
        "#,
    )
    .bind(txid)
    .bind(stage)
    .bind(source)
    .bind(id.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn record_transient_fault(
    id: &OrderId,
    fault: &TransientFault,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    ensure_meta_row(id, conn).await?;
    sqlx::query(
        r#"
        UPDATE order_meta
        SET transient_error = 'yes',
            transient_error_code = $1,
            transient_error_msg = $2,
            retry_action = $3,
            transient_error_count = $4
        WHERE order_id = $5
        "#,
    )
    .bind(&fault.code)
    .bind(&fault.message)
    .bind(fault.action.to_string())
    .bind(fault.count)
    .bind(id.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn record_hard_fault(id: &OrderId, fault: &HardFault, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    ensure_meta_row(id, conn).await?;
    sqlx::query(
        r#"
        UPDATE order_meta
        SET hard_error = 'yes',
            hard_error_code = $1,
            hard_error_msg = $2,
            retry_action = COALESCE($3, retry_action)
        WHERE order_id = $4
        "#,
    )
    .bind(&fault.code)
    .bind(&fault.message)
    .bind(fault.action.map(|a| a.to_string()))
    .bind(id.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn clear_transient_fault(id: &OrderId, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE order_meta
        SET transient_error = NULL,
            transient_error_code = NULL,
            transient_error_msg = NULL,
            transient_error_count = 0,
            retry_action = NULL
        WHERE order_id = $1
        "#,
    )
    .bind(id.as_str())
    .execute(conn)
    .await?;
    Ok(())
}
