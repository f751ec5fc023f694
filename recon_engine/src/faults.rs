//! Transient/hard fault classification for orders.
//!
//! Every failed reconciliation action lands here. Transient faults are replayed by the retry
//! job; hard faults park the order until someone intervenes. The classification and the
//! consecutive-failure bookkeeping are written to the order's metadata before control returns,
//! so a crash never loses a recorded fault.
use gateway_client::GatewayApiError;
use log::{debug, warn};

use crate::{
    db_types::{HardFault, OrderId, RetryAction, TransientFault},
    traits::{ReconciliationStore, StoreError},
};

/// After this many consecutive identical transient failures the order escalates to a hard
/// error and automatic retries stop.
pub const MAX_RETRIES: i64 = 3;

/// Fixed fault codes. The codes are stable identifiers (they appear in merchant support
/// tooling); the constant names say what they mean.
pub mod codes {
    /// Inbound sync deferred: the orders job touched this order inside the collision window.
    pub const PAYMENTS_COLLISION: &str = "E102";
    /// The settle call itself failed.
    pub const SETTLE_CALL_FAILED: &str = "E103";
    /// Outbound sync deferred: the payments job touched this order inside the collision window.
    pub const ORDERS_COLLISION: &str = "E200";
    /// The refund call itself failed.
    pub const REFUND_CALL_FAILED: &str = "E205";
    /// Consecutive-retry budget exhausted.
    pub const RETRY_EXCEEDED: &str = "E907";
    /// A settle operation resolved as failed on the gateway.
    pub const SETTLE_OP_FAILED: &str = "E908";
    /// A refund operation resolved as failed on the gateway.
    pub const REFUND_OP_FAILED: &str = "E909";
}

/// Records faults against orders and tracks the consecutive-failure count.
#[derive(Debug, Clone)]
pub struct FaultLog<B> {
    store: B,
}

impl<B: ReconciliationStore> FaultLog<B> {
    pub fn new(store: B) -> Self {
        Self { store }
    }

    /// Records a transient fault. A repeat of the stored (code, action) pair increments the
    /// consecutive count by one; any other pair resets the count to zero and overwrites the
    /// stored fault.
    pub async fn record_transient(
        &self,
        id: &OrderId,
        action: RetryAction,
        code: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        let meta = self.store.fetch_meta(id).await?;
        let same_fault = meta.transient_error_code.as_deref() == Some(code) && meta.retry_action() == Some(action);
        let count = if same_fault { meta.transient_error_count + 1 } else { 0 };
        debug!("⚠️ Transient fault {code} ({action}) on order {id}, consecutive count {count}");
        let fault = TransientFault { code: code.to_string(), message: message.to_string(), action, count };
        self.store.record_transient_fault(id, &fault).await
    }

    /// Records a hard fault. Terminal: nothing in the engine clears it.
    pub async fn record_hard(
        &self,
        id: &OrderId,
        action: Option<RetryAction>,
        code: &str,
        message: &str,
    ) -> Result<(), StoreError> {
        warn!("🛑️ Hard fault {code} on order {id}: {message}");
        let fault = HardFault { code: code.to_string(), message: message.to_string(), action };
        self.store.record_hard_fault(id, &fault).await
    }

    /// Classifies a gateway failure: a 400-class rejection is permanent, everything else is
    /// worth retrying.
    pub async fn record(
        &self,
        id: &OrderId,
        action: RetryAction,
        code: &str,
        error: &GatewayApiError,
    ) -> Result<(), StoreError> {
        if error.is_rejection() {
            self.record_hard(id, Some(action), code, &error.to_string()).await
        } else {
            self.record_transient(id, action, code, &error.to_string()).await
        }
    }

    /// Clears the transient fault state (and the retry action). Hard faults stay.
    pub async fn clear(&self, id: &OrderId) -> Result<(), StoreError> {
        self.store.clear_transient_fault(id).await
    }

    /// Returns the consecutive-failure count, escalating to a hard `E907` when the budget is
    /// exhausted.
    pub async fn check_retry_count(&self, id: &OrderId) -> Result<i64, StoreError> {
        let meta = self.store.fetch_meta(id).await?;
        let count = meta.transient_error_count;
        if count > MAX_RETRIES {
            self.record_hard(id, meta.retry_action(), codes::RETRY_EXCEEDED, "Retry count exceeded.").await?;
        }
        Ok(count)
    }
}
