//! Typed client for the payment gateway's RPC surface.
//!
//! The gateway holds incoming digital-currency payments in per-order temporary wallets and
//! exposes settle/refund as asynchronous operations that must be polled to completion. This
//! crate wraps that HTTP surface in typed calls and data objects; all reconciliation logic
//! lives in `recon_engine`.
mod api;
mod config;
mod data_objects;
mod error;

pub use api::GatewayClient;
pub use config::GatewayConfig;
pub use data_objects::{
    BalanceEntry,
    CheckoutRequest,
    CheckoutUrl,
    OperationPage,
    OperationSubmitted,
    Payment,
    PaymentOperation,
    PaymentPage,
    RefundRequest,
    SettleRequest,
    SignatureCheck,
    Token,
    ValidateSignatureRequest,
    WalletAddress,
};
pub use error::GatewayApiError;
