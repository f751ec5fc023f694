//! Shared fixtures for the reconciliation tests: an in-memory store, a mocked gateway, and
//! builders for gateway wire objects.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use gateway_client::{
    CheckoutRequest,
    CheckoutUrl,
    GatewayApiError,
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
};
use mockall::mock;
use recon_engine::{
    db_types::{NewOrder, Order, OrderId, OrderStatus},
    traits::{PaymentGatewayApi, ReconciliationStore},
    ReconConfig,
    SqliteStore,
};
use serde_json::json;
use tpr_common::Flag;

mock! {
    pub Gateway {}
    impl PaymentGatewayApi for Gateway {
        async fn list_payments(&self, since: DateTime<Utc>, next_token: Option<String>) -> Result<PaymentPage, GatewayApiError>;
        async fn get_payment(&self, id: &str) -> Result<Payment, GatewayApiError>;
        async fn get_payment_operation(&self, id: &str, txid: &str) -> Result<PaymentOperation, GatewayApiError>;
        async fn list_payment_operations(&self, id: &str, next_token: Option<String>) -> Result<OperationPage, GatewayApiError>;
        async fn settle_payment(&self, id: &str, chain: &str, req: &SettleRequest) -> Result<OperationSubmitted, GatewayApiError>;
        async fn refund_payment(&self, id: &str, chain: &str, req: &RefundRequest) -> Result<OperationSubmitted, GatewayApiError>;
        async fn list_tokens(&self) -> Result<Vec<Token>, GatewayApiError>;
        async fn create_checkout_url(&self, req: &CheckoutRequest) -> Result<CheckoutUrl, GatewayApiError>;
        async fn validate_checkout_signature(&self, req: &ValidateSignatureRequest) -> Result<SignatureCheck, GatewayApiError>;
    }
}

/// A fresh in-memory store with the schema applied. Single connection, since every connection
/// to `sqlite::memory:` is its own database.
pub async fn memory_store() -> SqliteStore {
    let _ = env_logger::try_init();
    let store = SqliteStore::new_with_url("sqlite::memory:", 1).await.expect("Error connecting to memory store");
    store.run_migrations().await.expect("Error running migrations");
    store
}

/// Test config: defaults, but without the settle rate-limit pause.
pub fn test_config() -> ReconConfig {
    ReconConfig { settle_delay: std::time::Duration::from_millis(0), ..ReconConfig::default() }
}

pub async fn seed_order(store: &SqliteStore, id: &str, total: &str, status: OrderStatus) -> Order {
    let order = store
        .insert_order(NewOrder::new(id, total.parse().expect("bad amount"), "XUSD"))
        .await
        .expect("Error inserting order");
    if status == OrderStatus::Pending {
        order
    } else {
        store.update_order_status(&order.id, status, "test setup").await.expect("Error setting status")
    }
}

/// Rewrites the order's last-modified time, e.g. `backdate_order(&store, "55", "-25 hours")`.
pub async fn backdate_order(store: &SqliteStore, id: &str, modifier: &str) {
    sqlx::query("UPDATE orders SET updated_at = datetime('now', $1) WHERE id = $2")
        .bind(modifier)
        .bind(id)
        .execute(store.pool())
        .await
        .expect("Error backdating order");
}

pub fn oid(id: &str) -> OrderId {
    OrderId::from(id)
}

/// Builds a gateway payment with the given positive balances, keyed (network, chain, addr).
pub fn payment(id: &str, updated_at: i64, balances: &[(&str, &str, &str, &str)]) -> Payment {
    let mut balance_map = json!({});
    for (network, chain, addr, amount) in balances {
        balance_map[network][chain][addr] = json!({
            "balance": amount,
            "token_decimals": 6,
            "blockNum": "1871014",
            "token_balance": amount,
        });
    }
    serde_json::from_value(json!({
        "id": id,
        "addresses": { "ethereum": { "mainnet": { "addr": "0xbead07d152c64159190842ec1d6144f1a4a6cae9" } } },
        "balances": balance_map,
        "createdAt": updated_at - 600,
        "updatedAt": updated_at,
    }))
    .expect("Error building payment fixture")
}

pub fn page(payments: Vec<Payment>) -> PaymentPage {
    PaymentPage { results: payments, next_token: None }
}

pub fn token(currency: &str, network: &str, chain: &str, addr: &str) -> Token {
    Token {
        currency: currency.to_string(),
        network: network.to_string(),
        chain: chain.to_string(),
        addr: addr.to_string(),
    }
}

/// The tokens the gateway supports for the test store currency.
pub fn xusd_tokens() -> Vec<Token> {
    vec![
        token("XUSD", "ethereum", "mainnet", "0xUSD"),
        token("XUSD", "ethereum", "goerli", "0xUSDTEST"),
        token("XUSD", "algorand", "alg_mainnet", "ASA1"),
    ]
}

pub fn submitted(txid: &str) -> OperationSubmitted {
    OperationSubmitted { txid: txid.to_string() }
}

pub fn operation(status: Option<Flag>) -> PaymentOperation {
    PaymentOperation {
        txid: Some("op-1".to_string()),
        status,
        hash: status.map(|_| "0xhash".to_string()),
        chain: Some("mainnet".to_string()),
        func_name: Some("settleWallet".to_string()),
        ..Default::default()
    }
}

/// A resolved refund operation for the given (chain, token), as returned by the operations
/// listing.
pub fn refund_operation(chain: &str, token_addr: &str, status: Flag) -> PaymentOperation {
    serde_json::from_value(json!({
        "txid": "op-r",
        "status": status,
        "hash": "0xrefundhash",
        "chain": chain,
        "func_name": "refundWallet",
        "inputs": { "token": token_addr },
    }))
    .expect("Error building operation fixture")
}

pub fn not_found() -> GatewayApiError {
    GatewayApiError::QueryError { status: 404, message: "no such payment".to_string() }
}

pub fn unavailable() -> GatewayApiError {
    GatewayApiError::Transport("connection reset by peer".to_string())
}
