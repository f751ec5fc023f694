//! The inbound sync ("payments puller").
//!
//! Pages through gateway payments updated since the payment cursor and advances matching
//! open orders to Processing once sufficient funds have arrived.
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use gateway_client::Payment;
use log::*;
use serde_json::Value;
use tpr_common::{is_set, Flag};

use super::{mark_multi_token, JobError};
use crate::{
    balance::{resolve_balance, BalanceError},
    config::ReconConfig,
    db_types::{DataSource, OrderId, OrderStatus, PaymentStage, RetryAction},
    faults::{codes, FaultLog},
    traits::{PaymentGatewayApi, ReconciliationStore, StoreError},
};

const PAYMENT_RECEIVED_NOTE: &str =
    "Payment received in the temporary wallet. Change the status to Completed for settlement.";

pub struct PaymentsJob<B, G> {
    store: B,
    gateway: Arc<G>,
    faults: FaultLog<B>,
    config: ReconConfig,
}

impl<B, G> PaymentsJob<B, G>
where
    B: ReconciliationStore,
    G: PaymentGatewayApi,
{
    pub fn new(store: B, gateway: Arc<G>, config: ReconConfig) -> Self {
        let faults = FaultLog::new(store.clone());
        Self { store, gateway, faults, config }
    }

    /// Pages through updated payments and applies each to its order. A page fetch failure
    /// aborts the invocation with the cursor unadvanced, so the next run replays the batch.
    pub async fn execute(&self) -> Result<(), JobError> {
        let source = DataSource::Payments;
        let cursor = self.store.cursors().await?.payment_updated_at;
        info!("📥️ Payments job: looking for payments updated after {cursor}");
        let mut max_seen: Option<DateTime<Utc>> = None;
        let mut next_token: Option<String> = None;
        let mut pages = 0u32;
        loop {
            let page = self.gateway.list_payments(cursor, next_token.take()).await?;
            for payment in page.results {
                max_seen = Some(max_seen.map_or(payment.updated_at, |m| m.max(payment.updated_at)));
                let id = OrderId::from(payment.id.clone());
                debug!("📥️ Payments job: processing payment {id} updated at {}", payment.updated_at);
                self.sync_payment(Some(payment), &id, source).await?;
            }
            pages += 1;
            match page.next_token {
                Some(token) if !token.is_empty() => {
                    if pages >= self.config.max_pages {
                        warn!(
                            "📥️ Payment listing did not terminate after {pages} pages, stopping here. The cursor \
                             still advances; anything unseen is picked up next run."
                        );
                        break;
                    }
                    next_token = Some(token);
                },
                _ => break,
            }
        }
        if let Some(seen) = max_seen {
            let next = seen + Duration::seconds(1);
            self.store.set_payment_cursor(next).await?;
            info!("📥️ Payments job: payment cursor advanced to {next}");
        }
        Ok(())
    }

    /// The per-payment procedure. `payment` is `None` when re-driven by the retry job, in
    /// which case the balance resolver refetches it from the gateway.
    pub(crate) async fn sync_payment(
        &self,
        payment: Option<Payment>,
        id: &OrderId,
        source: DataSource,
    ) -> Result<(), StoreError> {
        let Some(order) = self.store.fetch_open_order(id).await? else {
            trace!("📥️ No open order matches payment {id}");
            return Ok(());
        };
        let meta = self.store.fetch_meta(&order.id).await?;
        if is_set(meta.hard_error)
            || (is_set(meta.transient_error) && meta.retry_action() != Some(RetryAction::SyncPayment))
        {
            debug!(
                "📥️ Skipping order {}, hard error or mismatched retry action ({:?})",
                order.id, meta.retry_action
            );
            return Ok(());
        }
        if is_set(meta.processing_completed) {
            debug!("📥️ Skipping order {}, processing already completed", order.id);
            return Ok(());
        }
        if meta.payment_status.map(PaymentStage::blocks_inbound_sync).unwrap_or(false) {
            debug!(
                "📥️ Skipping order {}, gateway operations in progress or finished ({:?})",
                order.id, meta.payment_status
            );
            return Ok(());
        }
        let age = Utc::now().signed_duration_since(order.updated_at);
        if age < self.config.collision_window
            && source == DataSource::Payments
            && meta.data_source == Some(DataSource::Orders)
        {
            let msg = "Deferred: the orders job updated this order recently; will be retried";
            info!("📥️ Order {}: {msg}", order.id);
            self.faults.record_transient(&order.id, RetryAction::SyncPayment, codes::PAYMENTS_COLLISION, msg).await?;
            return Ok(());
        }

        let resolved = match resolve_balance(self.gateway.as_ref(), &order, payment).await {
            Ok(resolved) => resolved,
            Err(BalanceError::PaymentNotFound(_)) => return Ok(()),
            Err(e) => {
                warn!("📥️ Token balance error for order {}: {e}", order.id);
                return Ok(());
            },
        };
        if resolved.addresses != Value::Null {
            self.store.save_addresses(&order.id, &resolved.addresses.to_string()).await?;
        }
        if resolved.ambiguous {
            mark_multi_token(&self.store, &order).await?;
            return Ok(());
        }
        let received = resolved.received();
        if !resolved.balances.is_empty() && received >= order.total_price {
            self.store.update_order_status(&order.id, OrderStatus::Processing, PAYMENT_RECEIVED_NOTE).await?;
            self.store.set_payment_stage(&order.id, PaymentStage::PaymentReceived).await?;
            self.store.set_processing_completed(&order.id, Flag::No).await?;
            self.store.set_data_source(&order.id, source).await?;
            info!("📥️ Order {} received {received}, moved to Processing", order.id);
        }
        Ok(())
    }
}
