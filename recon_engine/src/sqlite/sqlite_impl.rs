//! `SqliteStore` is the concrete [`ReconciliationStore`] backend.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tpr_common::Flag;

use super::db::{cursors, meta, new_pool, orders};
use crate::{
    db_types::{
        Cursors,
        DataSource,
        HardFault,
        NewOrder,
        Order,
        OrderId,
        OrderMeta,
        OrderStatus,
        PaymentStage,
        TransientFault,
    },
    traits::{ReconciliationStore, StoreError},
};

#[derive(Clone)]
pub struct SqliteStore {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteStore ({:?})", self.pool)
    }
}

impl SqliteStore {
    /// Connects to the store. Use `max_connections = 1` for in-memory databases, since every
    /// connection to `sqlite::memory:` is a distinct database.
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))
    }
}

impl ReconciliationStore for SqliteStore {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order(id, &mut conn).await?)
    }

    async fn fetch_open_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_open_order(id, &mut conn).await?)
    }

    async fn actionable_orders_since(&self, since: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::actionable_orders_since(since, &mut conn).await?)
    }

    async fn orders_with_status(&self, status: OrderStatus) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::orders_with_status(status, &mut conn).await?)
    }

    async fn orders_in_stage(&self, stage: PaymentStage) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::orders_in_stage(stage, &mut conn).await?)
    }

    async fn retryable_orders(&self) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::retryable_orders(&mut conn).await?)
    }

    async fn update_order_status(&self, id: &OrderId, status: OrderStatus, note: &str) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::update_order_status(id, status, note, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_meta(&self, id: &OrderId) -> Result<OrderMeta, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let meta = meta::fetch_meta(id, &mut conn).await?;
        Ok(meta.unwrap_or_else(|| OrderMeta::new(id.clone())))
    }

    async fn save_addresses(&self, id: &OrderId, addresses: &str) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(meta::save_addresses(id, addresses, &mut conn).await?)
    }

    async fn set_data_source(&self, id: &OrderId, source: DataSource) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(meta::set_data_source(id, source, &mut conn).await?)
    }

    async fn set_payment_stage(&self, id: &OrderId, stage: PaymentStage) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(meta::set_payment_stage(id, stage, &mut conn).await?)
    }

    async fn set_processing_completed(&self, id: &OrderId, done: Flag) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(meta::set_processing_completed(id, done, &mut conn).await?)
    }

    async fn record_operation_started(
        &self,
        id: &OrderId,
        txid: &str,
        stage: PaymentStage,
        source: DataSource,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(meta::record_operation_started(id, txid, stage, source, &mut conn).await?)
    }

    async fn record_transient_fault(&self, id: &OrderId, fault: &TransientFault) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(meta::record_transient_fault(id, fault, &mut conn).await?)
    }

    async fn record_hard_fault(&self, id: &OrderId, fault: &HardFault) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(meta::record_hard_fault(id, fault, &mut conn).await?)
    }

    async fn clear_transient_fault(&self, id: &OrderId) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(meta::clear_transient_fault(id, &mut conn).await?)
    }

    async fn cursors(&self) -> Result<Cursors, StoreError> {
        let mut conn = self.pool.acquire().await?;
        cursors::fetch_cursors(&mut conn).await
    }

    async fn set_order_cursor(&self, to: DateTime<Utc>) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        cursors::set_order_cursor(to, &mut conn).await
    }

    async fn set_payment_cursor(&self, to: DateTime<Utc>) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        cursors::set_payment_cursor(to, &mut conn).await
    }
}
