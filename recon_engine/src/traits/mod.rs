//! The two seams the reconciliation jobs are written against: the order store and the payment
//! gateway. Concrete backends (SQLite, the HTTP gateway client) implement these; tests swap in
//! in-memory stores and mocks.
mod gateway;
mod store;

pub use gateway::PaymentGatewayApi;
pub use store::{ReconciliationStore, StoreError};
