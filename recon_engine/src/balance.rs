//! Token balance resolution.
//!
//! A payment's funds can arrive on any network/chain/token the gateway supports, and a payer
//! can (accidentally or otherwise) split a payment across several tokens. This module reduces
//! the payment's nested balance maps to the list of balances that count towards the order,
//! and detects the multi-token case, which needs manual merchant resolution.
use gateway_client::{BalanceEntry, GatewayApiError, Payment};
use log::debug;
use serde_json::Value;
use thiserror::Error;
use tpr_common::Amount;

use crate::{
    db_types::{Order, OrderId},
    traits::PaymentGatewayApi,
};

const ALGORAND_NETWORK: &str = "algorand";
const NATIVE_ALGO: &str = "ALGO";

/// One positive balance held by the payment's temporary wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub network: String,
    pub chain: String,
    pub addr: String,
    pub balance: Amount,
    pub token_decimals: u32,
    pub block_num: String,
    /// Raw token units, as reported by the gateway.
    pub token_balance: String,
}

impl TokenBalance {
    fn new(network: &str, chain: &str, addr: &str, entry: &BalanceEntry) -> Self {
        Self {
            network: network.to_string(),
            chain: chain.to_string(),
            addr: addr.to_string(),
            balance: entry.balance,
            token_decimals: entry.token_decimals,
            block_num: entry.block_num.clone(),
            token_balance: entry.token_balance.clone(),
        }
    }
}

/// The outcome of a balance resolution pass. Recomputed per reconciliation pass, never
/// persisted.
#[derive(Debug, Clone)]
pub struct ResolvedBalance {
    pub payment_id: String,
    /// The payment's network→chain→address map, for persisting onto the order metadata.
    pub addresses: Value,
    /// Positive balances in tokens matching the order currency, after ALGO suppression.
    pub balances: Vec<TokenBalance>,
    /// More than one token holds funds. A recoverable condition, not an error.
    pub ambiguous: bool,
}

impl ResolvedBalance {
    /// The amount counted as received: the first (and in the unambiguous case, only) balance.
    pub fn received(&self) -> Amount {
        self.balances.first().map(|b| b.balance).unwrap_or(Amount::ZERO)
    }

    /// A copy of this resolution narrowed to a single balance, for one-token-at-a-time
    /// refunds.
    pub fn narrowed_to(&self, balance: &TokenBalance) -> Self {
        Self { balances: vec![balance.clone()], ..self.clone() }
    }
}

#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("No payment exists for order {0}")]
    PaymentNotFound(OrderId),
    #[error("Gateway call failed: {0}")]
    Gateway(#[from] GatewayApiError),
}

/// Resolves the balances counting towards `order`. When `payment` is `None` it is fetched by
/// the order id; the inbound sync passes the payment it already holds to avoid the refetch.
pub async fn resolve_balance<G: PaymentGatewayApi>(
    gateway: &G,
    order: &Order,
    payment: Option<Payment>,
) -> Result<ResolvedBalance, BalanceError> {
    let payment = match payment {
        Some(p) => p,
        None => gateway.get_payment(order.id.as_str()).await.map_err(|e| {
            if e.is_not_found() {
                BalanceError::PaymentNotFound(order.id.clone())
            } else {
                BalanceError::Gateway(e)
            }
        })?,
    };

    // Funds in a token of the wrong currency still make the payment ambiguous, so the wide
    // pass looks at every balance in the payment, not just the matching ones.
    let all_positive = payment
        .all_balances()
        .filter(|(_, _, _, entry)| entry.balance.is_positive())
        .map(|(network, chain, addr, entry)| TokenBalance::new(network, chain, addr, entry))
        .collect::<Vec<_>>();
    let wide_count = suppress_native_algo(all_positive).len();

    let tokens = gateway.list_tokens().await?;
    let mut matching = Vec::new();
    for token in tokens.iter().filter(|t| t.currency == order.currency) {
        if let Some(entry) = payment.balance_at(&token.network, &token.chain, &token.addr) {
            if entry.balance.is_positive() {
                matching.push(TokenBalance::new(&token.network, &token.chain, &token.addr, entry));
            }
        }
    }
    let balances = suppress_native_algo(matching);
    let ambiguous = wide_count > 1 || balances.len() > 1;
    if balances.is_empty() {
        debug!("No token balance found for order {}", order.id);
    }

    let addresses = serde_json::to_value(&payment.addresses).unwrap_or(Value::Null);
    Ok(ResolvedBalance { payment_id: payment.id, addresses, balances, ambiguous })
}

/// When an Algorand ASA token payment exists, any native ALGO balance on the same payment is
/// gas-token dust, not the payment itself; the ASA balance is authoritative.
fn suppress_native_algo(balances: Vec<TokenBalance>) -> Vec<TokenBalance> {
    let asa_present = balances.iter().any(|b| b.network == ALGORAND_NETWORK && b.addr != NATIVE_ALGO);
    if !asa_present {
        return balances;
    }
    balances.into_iter().filter(|b| !(b.network == ALGORAND_NETWORK && b.addr == NATIVE_ALGO)).collect()
}
