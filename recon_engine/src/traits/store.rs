use chrono::{DateTime, Utc};
use thiserror::Error;
use tpr_common::Flag;

use crate::db_types::{
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
};

/// Backend trait for the order store and its reconciliation metadata.
///
/// Every mutation is a single-row read-modify-write; the jobs rely on the store for atomicity
/// per order, never on in-memory locks. All fault-recording calls are no-ops for ids that do
/// not correspond to an order.
#[allow(async_fn_in_trait)]
pub trait ReconciliationStore: Clone {
    /// Inserts a new order in `Pending` status together with its empty metadata row.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError>;

    async fn fetch_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError>;

    /// Fetches the order only if it is still in a pre-settlement status
    /// (Pending / AwaitingConfirmation / MultiToken).
    async fn fetch_open_order(&self, id: &OrderId) -> Result<Option<Order>, StoreError>;

    /// Orders in Completed or Canceled status, modified at or after `since`, whose processing
    /// is not completed. Ordered by modification time.
    async fn actionable_orders_since(&self, since: DateTime<Utc>) -> Result<Vec<Order>, StoreError>;

    /// Orders currently in `status` whose processing is not completed, oldest modification
    /// first.
    async fn orders_with_status(&self, status: OrderStatus) -> Result<Vec<Order>, StoreError>;

    /// Orders whose metadata sits in the given payment stage and whose processing is not
    /// completed, oldest modification first.
    async fn orders_in_stage(&self, stage: PaymentStage) -> Result<Vec<Order>, StoreError>;

    /// Orders with a transient error, no hard error, and processing not completed, oldest
    /// modification first. The retry job's work queue.
    async fn retryable_orders(&self) -> Result<Vec<Order>, StoreError>;

    /// Transitions the order status and appends a history entry, in one transaction.
    async fn update_order_status(&self, id: &OrderId, status: OrderStatus, note: &str) -> Result<Order, StoreError>;

    /// Returns the metadata row for the order, or the all-unset default if none exists.
    async fn fetch_meta(&self, id: &OrderId) -> Result<OrderMeta, StoreError>;

    /// Persists the payment's address map (JSON) onto the order's metadata.
    async fn save_addresses(&self, id: &OrderId, addresses: &str) -> Result<(), StoreError>;

    async fn set_data_source(&self, id: &OrderId, source: DataSource) -> Result<(), StoreError>;

    async fn set_payment_stage(&self, id: &OrderId, stage: PaymentStage) -> Result<(), StoreError>;

    async fn set_processing_completed(&self, id: &OrderId, done: Flag) -> Result<(), StoreError>;

    /// Records a freshly issued settle/refund operation: txid, in-flight stage,
    /// `processing_completed = no` and the acting job, in one write.
    async fn record_operation_started(
        &self,
        id: &OrderId,
        txid: &str,
        stage: PaymentStage,
        source: DataSource,
    ) -> Result<(), StoreError>;

    async fn record_transient_fault(&self, id: &OrderId, fault: &TransientFault) -> Result<(), StoreError>;

    async fn record_hard_fault(&self, id: &OrderId, fault: &HardFault) -> Result<(), StoreError>;

    /// Clears all transient-fault fields and the retry action. Hard-fault fields are never
    /// cleared here.
    async fn clear_transient_fault(&self, id: &OrderId) -> Result<(), StoreError>;

    async fn cursors(&self) -> Result<Cursors, StoreError>;

    async fn set_order_cursor(&self, to: DateTime<Utc>) -> Result<(), StoreError>;

    async fn set_payment_cursor(&self, to: DateTime<Utc>) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("Cannot insert order {0}, it already exists")]
    OrderAlreadyExists(OrderId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}
