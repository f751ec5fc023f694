//! # Token Payment Reconciliation Engine
//!
//! Reconciles payment state between a merchant's order store and an external payment gateway
//! that settles digital-currency payments. Money may arrive asynchronously, in partial or
//! multiple tokens, and the gateway's settle/refund calls are themselves asynchronous
//! transactions that must be polled to completion.
//!
//! The engine is a set of cooperating, idempotent, resumable jobs:
//! 1. The **payments job** ([`jobs::PaymentsJob`]) pulls gateway payment events into the order
//!    store and advances orders once funds are confirmed.
//! 2. The **orders job** ([`jobs::OrdersJob`]) pushes local order transitions out to the
//!    gateway as settle/refund requests, polls in-flight operations, and enforces the payment
//!    cut-off.
//! 3. The **retry job** ([`jobs::RetryJob`]) re-drives orders parked with a transient error.
//!
//! Jobs are scheduled externally (one job per invocation, see [`Reconciler`]); correctness
//! relies on per-order read-modify-write through the [`traits::ReconciliationStore`] seam and
//! on every mutating action re-checking the terminal/in-flight/error guards before acting.
//! True cross-job mutual exclusion is *not* implemented: a collision window heuristic defers
//! work when the other poller touched an order recently, which narrows but does not close the
//! race. Keep single instances of each job per store.
pub mod balance;
pub mod checkout;
pub mod config;
pub mod db_types;
pub mod faults;
pub mod jobs;
mod sqlite;
pub mod traits;

pub use config::ReconConfig;
pub use jobs::{JobError, JobKind, Reconciler};
pub use sqlite::{db_url, SqliteStore};
