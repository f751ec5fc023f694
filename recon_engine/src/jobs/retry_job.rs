//! The retry job.
//!
//! Re-drives orders parked with a transient error by replaying the recorded retry action.
//! `syncOrder` and `syncPayment` re-enter the full per-order procedures, guards included.
//! `settle` and `refund` re-invoke the gateway call directly: the guard chain already routed
//! the order here as its sole legal next action.
use std::sync::Arc;

use log::*;

use super::{JobError, OrdersJob, PaymentsJob};
use crate::{
    balance::resolve_balance,
    config::ReconConfig,
    db_types::{DataSource, Order, RetryAction},
    faults::{FaultLog, MAX_RETRIES},
    traits::{PaymentGatewayApi, ReconciliationStore, StoreError},
};

pub struct RetryJob<B, G> {
    store: B,
    gateway: Arc<G>,
    faults: FaultLog<B>,
    orders_job: OrdersJob<B, G>,
    payments_job: PaymentsJob<B, G>,
}

impl<B, G> RetryJob<B, G>
where
    B: ReconciliationStore,
    G: PaymentGatewayApi,
{
    pub fn new(store: B, gateway: Arc<G>, config: ReconConfig) -> Self {
        Self {
            faults: FaultLog::new(store.clone()),
            orders_job: OrdersJob::new(store.clone(), gateway.clone(), config.clone()),
            payments_job: PaymentsJob::new(store.clone(), gateway.clone(), config),
            store,
            gateway,
        }
    }

    pub async fn execute(&self) -> Result<(), JobError> {
        let source = DataSource::Retry;
        info!("🔁️ Retry job: looking for orders with transient errors");
        let orders = self.store.retryable_orders().await?;
        for order in orders {
            let meta = self.store.fetch_meta(&order.id).await?;
            let count = self.faults.check_retry_count(&order.id).await?;
            if count > MAX_RETRIES {
                warn!("🔁️ Order {} exhausted its retry budget, escalated to a hard error", order.id);
                continue;
            }
            let Some(action) = meta.retry_action() else {
                warn!("🔁️ Order {} has unrecognised retry action {:?}, dead-lettered", order.id, meta.retry_action);
                continue;
            };
            debug!("🔁️ Order {}: replaying action {action} (attempt count {count})", order.id);
            match action {
                RetryAction::SyncOrder => self.orders_job.sync_order(&order, source).await?,
                RetryAction::SyncPayment => self.payments_job.sync_payment(None, &order.id, source).await?,
                RetryAction::Settle | RetryAction::Refund => self.redrive_operation(&order, action, source).await?,
            }
        }
        Ok(())
    }

    /// Re-resolves the balance and re-invokes the settle/refund call directly, skipping the
    /// status guard chain.
    async fn redrive_operation(
        &self,
        order: &Order,
        action: RetryAction,
        source: DataSource,
    ) -> Result<(), StoreError> {
        let resolved = match resolve_balance(self.gateway.as_ref(), order, None).await {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!("🔁️ Could not resolve balance for order {}: {e}", order.id);
                return Ok(());
            },
        };
        if resolved.ambiguous {
            warn!("🔁️ Order {} resolved as multi-token, not re-driving {action}", order.id);
            return Ok(());
        }
        match action {
            RetryAction::Settle => self.orders_job.settle_order(order, &resolved, source).await,
            RetryAction::Refund => self.orders_job.refund_order(order, &resolved, source).await,
            _ => Ok(()),
        }
    }
}
