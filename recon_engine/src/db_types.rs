use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use tpr_common::{Amount, Flag};

//--------------------------------------      OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     OrderStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Checkout started, no funds seen yet.
    Pending,
    /// The payer claims to have paid; the chain has not confirmed the funds yet.
    AwaitingConfirmation,
    /// Funds arrived split over more than one token. Needs manual merchant resolution.
    MultiToken,
    /// Funds confirmed in the temporary wallet. The merchant can now complete or cancel.
    Processing,
    /// Merchant delivered the goods. Reconciliation settles the payment.
    Completed,
    /// Merchant cancelled the order. Reconciliation refunds the payment.
    Canceled,
    /// No payment confirmation arrived before the cut-off.
    Failed,
}

impl OrderStatus {
    /// Statuses in which a payment can still be matched to the order.
    pub fn is_pre_settlement(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::AwaitingConfirmation | OrderStatus::MultiToken)
    }

    /// The multi-token transition is only legal before any funds have been confirmed.
    pub fn may_become_multi_token(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::AwaitingConfirmation)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid order status: {0}")]
pub struct InvalidOrderStatus(String);

impl FromStr for OrderStatus {
    type Err = InvalidOrderStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "AwaitingConfirmation" => Ok(Self::AwaitingConfirmation),
            "MultiToken" => Ok(Self::MultiToken),
            "Processing" => Ok(Self::Processing),
            "Completed" => Ok(Self::Completed),
            "Canceled" => Ok(Self::Canceled),
            "Failed" => Ok(Self::Failed),
            s => Err(InvalidOrderStatus(s.to_string())),
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::AwaitingConfirmation => "AwaitingConfirmation",
            OrderStatus::MultiToken => "MultiToken",
            OrderStatus::Processing => "Processing",
            OrderStatus::Completed => "Completed",
            OrderStatus::Canceled => "Canceled",
            OrderStatus::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------    PaymentStage     ---------------------------------------------------------
/// Where the order's money currently is on the gateway side. Persisted under the wire strings
/// the gateway dashboard also displays, so the column stays greppable against support tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStage {
    #[sqlx(rename = "payment-received")]
    #[serde(rename = "payment-received")]
    PaymentReceived,
    SettleInProgress,
    Settled,
    SettleFailed,
    RefundInProgress,
    Refunded,
    RefundFailed,
}

impl PaymentStage {
    /// A settle or refund transaction is currently in flight on the gateway.
    pub fn is_in_flight(self) -> bool {
        matches!(self, PaymentStage::SettleInProgress | PaymentStage::RefundInProgress)
    }

    /// Once a gateway operation has been issued (or resolved), the inbound sync must not touch
    /// the order any more.
    pub fn blocks_inbound_sync(self) -> bool {
        !matches!(self, PaymentStage::PaymentReceived)
    }
}

impl Display for PaymentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStage::PaymentReceived => "payment-received",
            PaymentStage::SettleInProgress => "settle_in_progress",
            PaymentStage::Settled => "settled",
            PaymentStage::SettleFailed => "settle_failed",
            PaymentStage::RefundInProgress => "refund_in_progress",
            PaymentStage::Refunded => "refunded",
            PaymentStage::RefundFailed => "refund_failed",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------     DataSource      ---------------------------------------------------------
/// Which job last mutated an order. Used by the collision guard to keep the two pollers off
/// the same order inside the collision window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum DataSource {
    #[sqlx(rename = "payments-job")]
    #[serde(rename = "payments-job")]
    Payments,
    #[sqlx(rename = "orders-job")]
    #[serde(rename = "orders-job")]
    Orders,
    #[sqlx(rename = "retry-job")]
    #[serde(rename = "retry-job")]
    Retry,
}

impl Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DataSource::Payments => "payments-job",
            DataSource::Orders => "orders-job",
            DataSource::Retry => "retry-job",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------     RetryAction     ---------------------------------------------------------
/// The action the retry job replays for an order with a transient error. The persisted value
/// is a plain string and is parsed at dispatch time; unrecognised values are dead-lettered
/// rather than crashing the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    SyncOrder,
    SyncPayment,
    Settle,
    Refund,
}

#[derive(Debug, Clone, Error)]
#[error("Unknown retry action: {0}")]
pub struct UnknownRetryAction(pub String);

impl FromStr for RetryAction {
    type Err = UnknownRetryAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "syncOrder" => Ok(Self::SyncOrder),
            "syncPayment" => Ok(Self::SyncPayment),
            "settle" => Ok(Self::Settle),
            "refund" => Ok(Self::Refund),
            s => Err(UnknownRetryAction(s.to_string())),
        }
    }
}

impl Display for RetryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RetryAction::SyncOrder => "syncOrder",
            RetryAction::SyncPayment => "syncPayment",
            RetryAction::Settle => "settle",
            RetryAction::Refund => "refund",
        };
        write!(f, "{s}")
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: OrderId,
    pub total_price: Amount,
    pub currency: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub total_price: Amount,
    pub currency: String,
}

impl NewOrder {
    pub fn new(id: impl Into<OrderId>, total_price: Amount, currency: impl Into<String>) -> Self {
        Self { id: id.into(), total_price, currency: currency.into() }
    }
}

//--------------------------------------      OrderMeta      ---------------------------------------------------------
/// The per-order reconciliation-metadata record. One row per order; a missing row reads as
/// the all-unset default.
#[derive(Debug, Clone, Default, FromRow)]
pub struct OrderMeta {
    pub order_id: OrderId,
    /// JSON blob of the payment's network→chain→address map, as last seen by the inbound sync.
    pub addresses: Option<String>,
    pub payment_status: Option<PaymentStage>,
    /// txid of the last settle/refund operation issued for this order.
    pub txid: Option<String>,
    pub data_source: Option<DataSource>,
    pub processing_completed: Option<Flag>,
    pub transient_error: Option<Flag>,
    pub transient_error_code: Option<String>,
    pub transient_error_msg: Option<String>,
    pub transient_error_count: i64,
    pub retry_action: Option<String>,
    pub hard_error: Option<Flag>,
    pub hard_error_code: Option<String>,
    pub hard_error_msg: Option<String>,
}

impl OrderMeta {
    pub fn new(order_id: OrderId) -> Self {
        Self { order_id, ..Default::default() }
    }

    pub fn retry_action(&self) -> Option<RetryAction> {
        self.retry_action.as_deref().and_then(|s| s.parse().ok())
    }
}

//--------------------------------------       Faults        ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct TransientFault {
    pub code: String,
    pub message: String,
    pub action: RetryAction,
    pub count: i64,
}

#[derive(Debug, Clone)]
pub struct HardFault {
    pub code: String,
    pub message: String,
    /// Retained for diagnostics; a hard error is never dispatched again.
    pub action: Option<RetryAction>,
}

//--------------------------------------       Cursors       ---------------------------------------------------------
/// The two resumption points, advanced to (max seen timestamp + 1 s) after a fully processed
/// batch. At-least-once: a crash mid-batch leaves them untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursors {
    pub payment_updated_at: DateTime<Utc>,
    pub order_updated_at: DateTime<Utc>,
}
