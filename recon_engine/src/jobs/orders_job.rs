//! The outbound sync ("orders pusher").
//!
//! Pushes local order-status transitions out to the gateway: Completed orders are settled,
//! Canceled orders are refunded, in-flight operations are polled to completion, unconfirmed
//! orders are failed after the cut-off, and partially refunded payments are driven until no
//! balance remains.
use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use gateway_client::{RefundRequest, SettleRequest};
use log::*;
use tpr_common::{is_set, Flag};

use super::{mark_multi_token, JobError};
use crate::{
    balance::{resolve_balance, BalanceError, ResolvedBalance},
    config::ReconConfig,
    db_types::{DataSource, Order, OrderStatus, PaymentStage, RetryAction},
    faults::{codes, FaultLog},
    traits::{PaymentGatewayApi, ReconciliationStore, StoreError},
};

/// Gateway function names that return funds to the payer. Operations with any other function
/// name do not count towards refund completion.
const REFUND_FUNC_NAMES: [&str; 2] = ["createAndRefundWallet", "refundWallet"];

const CUTOFF_NOTE: &str = "Payment confirmation not received before the cut-off time.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Settle,
    Refund,
}

pub struct OrdersJob<B, G> {
    store: B,
    gateway: Arc<G>,
    faults: FaultLog<B>,
    config: ReconConfig,
}

impl<B, G> OrdersJob<B, G>
where
    B: ReconciliationStore,
    G: PaymentGatewayApi,
{
    pub fn new(store: B, gateway: Arc<G>, config: ReconConfig) -> Self {
        let faults = FaultLog::new(store.clone());
        Self { store, gateway, faults, config }
    }

    /// Runs all outbound phases once. Store failures abort the invocation (leaving the cursor
    /// unadvanced); gateway failures are contained to the order they occurred on.
    pub async fn execute(&self) -> Result<(), JobError> {
        let source = DataSource::Orders;
        let cursor = self.store.cursors().await?.order_updated_at;
        info!("📤️ Orders job: looking for orders modified after {cursor}");
        let orders = self.store.actionable_orders_since(cursor).await?;
        let mut max_seen: Option<DateTime<Utc>> = None;
        for order in &orders {
            max_seen = Some(max_seen.map_or(order.updated_at, |m| m.max(order.updated_at)));
            debug!("📤️ Orders job: processing order {}", order.id);
            self.sync_order(order, source).await?;
        }
        if let Some(seen) = max_seen {
            let next = seen + Duration::seconds(1);
            self.store.set_order_cursor(next).await?;
            info!("📤️ Orders job: order cursor advanced to {next}");
        }
        self.verify_operations(Operation::Settle, source).await?;
        self.fail_unconfirmed_orders().await?;
        self.verify_operations(Operation::Refund, source).await?;
        self.verify_complete_refunds(source).await?;
        Ok(())
    }

    /// The per-order outbound procedure. Also re-entered by the retry job (with
    /// `source = Retry`), which is why the collision guard checks the running source.
    pub(crate) async fn sync_order(&self, order: &Order, source: DataSource) -> Result<(), StoreError> {
        let meta = self.store.fetch_meta(&order.id).await?;
        if is_set(meta.hard_error) {
            debug!("📤️ Skipping order {}, hard error found", order.id);
            return Ok(());
        }
        if is_set(meta.transient_error) && meta.retry_action() != Some(RetryAction::SyncOrder) {
            debug!(
                "📤️ Skipping order {}, a transient error with retry action {:?} owns it",
                order.id, meta.retry_action
            );
            return Ok(());
        }
        if is_set(meta.processing_completed) {
            debug!("📤️ Skipping order {}, processing already completed", order.id);
            return Ok(());
        }
        if meta.payment_status.map(PaymentStage::is_in_flight).unwrap_or(false) {
            return Ok(());
        }
        let age = Utc::now().signed_duration_since(order.updated_at);
        if age < self.config.collision_window
            && source == DataSource::Orders
            && meta.data_source == Some(DataSource::Payments)
        {
            let msg = "Deferred: the payments job updated this order recently; will be retried";
            info!("📤️ Order {}: {msg}", order.id);
            self.faults.record_transient(&order.id, RetryAction::SyncOrder, codes::ORDERS_COLLISION, msg).await?;
            return Ok(());
        }

        let resolved = match resolve_balance(self.gateway.as_ref(), order, None).await {
            Ok(resolved) => resolved,
            Err(BalanceError::PaymentNotFound(_)) => {
                debug!("📤️ Order {} has no payment on the gateway yet", order.id);
                return Ok(());
            },
            Err(e) => {
                warn!("📤️ Token balance error for order {}: {e}", order.id);
                return Ok(());
            },
        };
        if resolved.ambiguous {
            mark_multi_token(&self.store, order).await?;
            return Ok(());
        }
        if resolved.balances.is_empty() {
            debug!("📤️ Order {} has no funds to act on yet", order.id);
            return Ok(());
        }
        match order.status {
            OrderStatus::Completed => self.settle_order(order, &resolved, source).await,
            OrderStatus::Canceled => self.refund_order(order, &resolved, source).await,
            other => {
                trace!("📤️ Order {} in status {other} needs no outbound action", order.id);
                Ok(())
            },
        }
    }

    /// Issues the settle call for a Completed order and records the in-flight operation.
    pub(crate) async fn settle_order(
        &self,
        order: &Order,
        resolved: &ResolvedBalance,
        source: DataSource,
    ) -> Result<(), StoreError> {
        let Some(balance) = resolved.balances.first() else {
            return Ok(());
        };
        // gateway rate limit
        tokio::time::sleep(self.config.settle_delay).await;
        let req = SettleRequest { amount: order.total_price, token: balance.addr.clone() };
        match self.gateway.settle_payment(order.id.as_str(), &balance.chain, &req).await {
            Ok(op) => {
                self.store
                    .record_operation_started(&order.id, &op.txid, PaymentStage::SettleInProgress, source)
                    .await?;
                self.faults.clear(&order.id).await?;
                info!("📤️ Settlement requested for order {}, txid {}", order.id, op.txid);
            },
            Err(e) => {
                warn!("📤️ Settle call failed for order {}: {e}", order.id);
                self.faults
                    .record_transient(&order.id, RetryAction::SyncOrder, codes::SETTLE_CALL_FAILED, &e.to_string())
                    .await?;
            },
        }
        Ok(())
    }

    /// Issues a refund for the first remaining balance of a Canceled order. The data source is
    /// stamped even when the call fails, so the collision guard sees the attempt.
    pub(crate) async fn refund_order(
        &self,
        order: &Order,
        resolved: &ResolvedBalance,
        source: DataSource,
    ) -> Result<(), StoreError> {
        let Some(balance) = resolved.balances.iter().find(|b| b.balance.is_positive()) else {
            return Ok(());
        };
        // gateway rate limit
        tokio::time::sleep(self.config.settle_delay).await;
        let req = RefundRequest { token: balance.addr.clone() };
        match self.gateway.refund_payment(order.id.as_str(), &balance.chain, &req).await {
            Ok(op) => {
                self.store
                    .record_operation_started(&order.id, &op.txid, PaymentStage::RefundInProgress, source)
                    .await?;
                self.faults.clear(&order.id).await?;
                info!("📤️ Refund requested for order {}, txid {}", order.id, op.txid);
            },
            Err(e) => {
                warn!("📤️ Refund call failed for order {}: {e}", order.id);
                self.faults
                    .record_transient(&order.id, RetryAction::SyncOrder, codes::REFUND_CALL_FAILED, &e.to_string())
                    .await?;
            },
        }
        self.store.set_data_source(&order.id, source).await?;
        Ok(())
    }

    /// Polls every in-flight operation of the given kind and applies the resolution. A failed
    /// settle is retried indefinitely (merchant funds are at stake); a failed refund is
    /// terminal, protecting against a double refund.
    async fn verify_operations(&self, operation: Operation, source: DataSource) -> Result<(), StoreError> {
        let (in_progress, completed, failed) = match operation {
            Operation::Settle => (PaymentStage::SettleInProgress, PaymentStage::Settled, PaymentStage::SettleFailed),
            Operation::Refund => (PaymentStage::RefundInProgress, PaymentStage::Refunded, PaymentStage::RefundFailed),
        };
        let orders = self.store.orders_in_stage(in_progress).await?;
        for order in orders {
            let meta = self.store.fetch_meta(&order.id).await?;
            let Some(txid) = meta.txid else {
                info!("📤️ Order {} is in {in_progress} but has no txid recorded", order.id);
                continue;
            };
            let op = match self.gateway.get_payment_operation(order.id.as_str(), &txid).await {
                Ok(op) => op,
                Err(e) => {
                    info!("📤️ Could not poll operation {txid} for order {}: {e}", order.id);
                    continue;
                },
            };
            match op.status {
                // still pending on chain
                None => {},
                Some(Flag::Yes) => {
                    self.store.set_payment_stage(&order.id, completed).await?;
                    if operation == Operation::Settle {
                        self.store.set_processing_completed(&order.id, Flag::Yes).await?;
                    }
                    self.store.set_data_source(&order.id, source).await?;
                    info!("📤️ Order {} operation {txid} resolved: {completed}", order.id);
                },
                Some(Flag::No) => {
                    self.store.set_payment_stage(&order.id, failed).await?;
                    match operation {
                        Operation::Settle => {
                            self.faults
                                .record_transient(
                                    &order.id,
                                    RetryAction::Settle,
                                    codes::SETTLE_OP_FAILED,
                                    "Settle operation failed on the gateway",
                                )
                                .await?;
                        },
                        Operation::Refund => {
                            self.faults
                                .record_hard(
                                    &order.id,
                                    Some(RetryAction::Refund),
                                    codes::REFUND_OP_FAILED,
                                    "Refund operation failed on the gateway",
                                )
                                .await?;
                        },
                    }
                    self.store.set_data_source(&order.id, source).await?;
                    warn!("📤️ Order {} operation {txid} resolved as failed", order.id);
                },
            }
        }
        Ok(())
    }

    /// Fails orders that sat in AwaitingConfirmation past the cut-off without any money
    /// arriving.
    async fn fail_unconfirmed_orders(&self) -> Result<(), StoreError> {
        let orders = self.store.orders_with_status(OrderStatus::AwaitingConfirmation).await?;
        let now = Utc::now();
        for order in orders {
            let age = now.signed_duration_since(order.updated_at);
            if age > self.config.unconfirmed_cutoff {
                warn!(
                    "📤️ Order {} unconfirmed for {} minutes, past the cut-off. Failing it.",
                    order.id,
                    age.num_minutes()
                );
                self.store.update_order_status(&order.id, OrderStatus::Failed, CUTOFF_NOTE).await?;
            }
        }
        Ok(())
    }

    /// A refund only returns one token per operation, so a multi-token payment needs several
    /// passes. Re-derives the remaining balances for every refunded order and either finishes
    /// the order or issues the next refund (one per invocation).
    async fn verify_complete_refunds(&self, source: DataSource) -> Result<(), StoreError> {
        let orders = self.store.orders_in_stage(PaymentStage::Refunded).await?;
        for order in orders {
            let resolved = match resolve_balance(self.gateway.as_ref(), &order, None).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!("📤️ Could not re-derive balances for refunded order {}: {e}", order.id);
                    continue;
                },
            };
            if resolved.balances.is_empty() {
                self.store.set_processing_completed(&order.id, Flag::Yes).await?;
                info!("📤️ Order {} fully refunded, processing completed", order.id);
                continue;
            }
            let refunded = match self.refunded_tokens(&order).await {
                Ok(refunded) => refunded,
                Err(e) => {
                    warn!("📤️ Could not list operations for refunded order {}: {e}", order.id);
                    continue;
                },
            };
            let outstanding = resolved
                .balances
                .iter()
                .find(|b| b.balance.is_positive() && !refunded.contains(&(b.chain.clone(), b.addr.clone())));
            match outstanding {
                Some(balance) => {
                    info!("📤️ Order {} still holds {} of {}, issuing the next refund", order.id, balance.balance, balance.addr);
                    let single = resolved.narrowed_to(balance);
                    self.refund_order(&order, &single, source).await?;
                },
                None => {
                    self.store.set_processing_completed(&order.id, Flag::Yes).await?;
                    info!("📤️ Order {} fully refunded, processing completed", order.id);
                },
            }
        }
        Ok(())
    }

    /// Pages through the payment's operations and collects the (chain, token) pairs already
    /// returned to the payer by a confirmed refund operation. The loop is capped in case the
    /// gateway never stops handing out continuation tokens.
    async fn refunded_tokens(&self, order: &Order) -> Result<HashSet<(String, String)>, gateway_client::GatewayApiError> {
        let mut refunded = HashSet::new();
        let mut next_token: Option<String> = None;
        for _ in 0..self.config.max_pages {
            let page = self.gateway.list_payment_operations(order.id.as_str(), next_token.take()).await?;
            for op in page.results {
                let confirmed = op.hash.is_some()
                    && op.status == Some(Flag::Yes)
                    && op.func_name.as_deref().map(|f| REFUND_FUNC_NAMES.contains(&f)).unwrap_or(false);
                if confirmed {
                    if let (Some(chain), Some(token)) = (op.chain, op.inputs.token) {
                        refunded.insert((chain, token));
                    }
                }
            }
            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => return Ok(refunded),
            }
        }
        warn!(
            "📤️ Operation listing for order {} did not terminate after {} pages, proceeding with what we have",
            order.id, self.config.max_pages
        );
        Ok(refunded)
    }
}
