//! The reconciliation jobs and their orchestrator.
//!
//! Each invocation runs exactly one job to completion: the inbound sync (gateway payments →
//! order store), the outbound sync (order transitions → gateway settle/refund), or the retry
//! job. Jobs are idempotent and resumable; a killed invocation leaves the cursors unadvanced
//! and the next one picks up from the same point.
mod orders_job;
mod payments_job;
mod retry_job;

use std::{fmt::Display, str::FromStr, sync::Arc};

use gateway_client::GatewayApiError;
use log::info;
pub use orders_job::OrdersJob;
pub use payments_job::PaymentsJob;
pub use retry_job::RetryJob;
use thiserror::Error;

use crate::{
    config::ReconConfig,
    db_types::{Order, OrderStatus},
    traits::{PaymentGatewayApi, ReconciliationStore, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Payments,
    Orders,
    Retry,
}

#[derive(Debug, Clone, Error)]
#[error("Unknown job '{0}'. Valid jobs are: payments, orders, retry")]
pub struct UnknownJob(String);

impl FromStr for JobKind {
    type Err = UnknownJob;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "payments" => Ok(Self::Payments),
            "orders" => Ok(Self::Orders),
            "retry" => Ok(Self::Retry),
            other => Err(UnknownJob(other.to_string())),
        }
    }
}

impl Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Payments => write!(f, "payments"),
            JobKind::Orders => write!(f, "orders"),
            JobKind::Retry => write!(f, "retry"),
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayApiError),
}

/// The entrypoint: selects and runs one job per invocation.
pub struct Reconciler<B, G> {
    store: B,
    gateway: Arc<G>,
    config: ReconConfig,
}

impl<B, G> Reconciler<B, G>
where
    B: ReconciliationStore,
    G: PaymentGatewayApi,
{
    pub fn new(store: B, gateway: G, config: ReconConfig) -> Self {
        Self { store, gateway: Arc::new(gateway), config }
    }

    pub async fn run(&self, kind: JobKind) -> Result<(), JobError> {
        info!("🔄️ Running the {kind} job");
        match kind {
            JobKind::Payments => {
                PaymentsJob::new(self.store.clone(), self.gateway.clone(), self.config.clone()).execute().await
            },
            JobKind::Orders => {
                OrdersJob::new(self.store.clone(), self.gateway.clone(), self.config.clone()).execute().await
            },
            JobKind::Retry => {
                RetryJob::new(self.store.clone(), self.gateway.clone(), self.config.clone()).execute().await
            },
        }
    }
}

pub(crate) const MULTI_TOKEN_NOTE: &str =
    "Payment received in more than one token. The gateway dashboard can be used to refund any balance.";

/// Moves the order to MultiToken, but only from a status where no funds have been confirmed
/// yet. Returns whether the transition happened.
pub(crate) async fn mark_multi_token<B: ReconciliationStore>(store: &B, order: &Order) -> Result<bool, StoreError> {
    if !order.status.may_become_multi_token() {
        return Ok(false);
    }
    store.update_order_status(&order.id, OrderStatus::MultiToken, MULTI_TOKEN_NOTE).await?;
    info!("🔄️ Order {} holds balances in more than one token, moved to MultiToken", order.id);
    Ok(true)
}
