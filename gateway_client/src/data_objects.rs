use std::collections::HashMap;

use chrono::{serde::ts_seconds, DateTime, Utc};
use serde::{Deserialize, Serialize};
use tpr_common::{Amount, Flag};

/// A gateway payment record. The gateway mirrors the merchant's order id as the payment id and
/// tracks received funds per network, chain and token address in nested maps.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Payment {
    pub id: String,
    #[serde(default)]
    pub addresses: HashMap<String, HashMap<String, WalletAddress>>,
    #[serde(default)]
    pub balances: HashMap<String, HashMap<String, HashMap<String, BalanceEntry>>>,
    #[serde(rename = "createdAt", with = "ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt", with = "ts_seconds")]
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Looks up the balance entry for a (network, chain, address) triple. Missing keys at any
    /// level are "absent", never an error.
    pub fn balance_at(&self, network: &str, chain: &str, addr: &str) -> Option<&BalanceEntry> {
        self.balances.get(network)?.get(chain)?.get(addr)
    }

    /// Iterates every (network, chain, address, entry) tuple present in the payment.
    pub fn all_balances(&self) -> impl Iterator<Item = (&str, &str, &str, &BalanceEntry)> {
        self.balances.iter().flat_map(|(network, chains)| {
            chains.iter().flat_map(move |(chain, addrs)| {
                addrs.iter().map(move |(addr, entry)| (network.as_str(), chain.as_str(), addr.as_str(), entry))
            })
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletAddress {
    pub addr: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BalanceEntry {
    /// Balance in display units, as reported by the gateway.
    pub balance: Amount,
    #[serde(rename = "token_decimals", default)]
    pub token_decimals: u32,
    #[serde(rename = "blockNum", default)]
    pub block_num: String,
    /// Balance in raw token units.
    #[serde(rename = "token_balance", default)]
    pub token_balance: String,
}

/// One page of payments, sorted by update time. `next_token` is an opaque continuation token;
/// absent or empty means the listing is exhausted.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PaymentPage {
    #[serde(default)]
    pub results: Vec<Payment>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// An asynchronous settle/refund transaction on the gateway side. `status` is tri-state:
/// `None` while the transaction is still pending, then yes/no once it resolves.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PaymentOperation {
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub status: Option<Flag>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub func_name: Option<String>,
    #[serde(default)]
    pub inputs: OperationInputs,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OperationInputs {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OperationPage {
    #[serde(default)]
    pub results: Vec<PaymentOperation>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// A token the gateway can accept for a given store currency.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Token {
    pub currency: String,
    pub network: String,
    pub chain: String,
    pub addr: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettleRequest {
    pub amount: Amount,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    pub token: String,
}

/// Returned by settle/refund submissions; the operation must be polled by txid until its
/// status resolves.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OperationSubmitted {
    pub txid: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub id: String,
    pub currency: String,
    pub amount: Amount,
    pub success_url: String,
    pub cancel_url: String,
    pub base64_transform: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateSignatureRequest {
    pub hmac_alg: String,
    pub hmac_input: String,
    #[serde(rename = "hmac_keyId")]
    pub hmac_key_id: String,
    pub hmac_value: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignatureCheck {
    pub valid: bool,
}

#[cfg(test)]
mod test {
    use super::*;

    const PAYMENT_JSON: &str = r#"{
        "id": "535",
        "addresses": {
            "ethereum": { "goerli": { "addr": "0xbead07d152c64159190842ec1d6144f1a4a6cae9" } }
        },
        "balances": {
            "ethereum": {
                "goerli": {
                    "0x115615dbd0f835344725146fa6343219315f15e5": {
                        "blockNum": "1871014",
                        "token_balance": "10000000",
                        "balance": "10",
                        "token_decimals": 6
                    }
                }
            }
        },
        "createdAt": 1577086517,
        "updatedAt": 1577086771
    }"#;

    #[test]
    fn deserializes_nested_payment() {
        let payment: Payment = serde_json::from_str(PAYMENT_JSON).unwrap();
        assert_eq!(payment.id, "535");
        let entry = payment
            .balance_at("ethereum", "goerli", "0x115615dbd0f835344725146fa6343219315f15e5")
            .expect("balance entry");
        assert_eq!(entry.balance, "10".parse().unwrap());
        assert_eq!(entry.token_decimals, 6);
        assert!(payment.balance_at("ethereum", "mainnet", "0x0").is_none());
        assert_eq!(payment.all_balances().count(), 1);
    }

    #[test]
    fn operation_status_is_tri_state() {
        let pending: PaymentOperation = serde_json::from_str(r#"{"txid": "op-1"}"#).unwrap();
        assert!(pending.status.is_none());
        let done: PaymentOperation =
            serde_json::from_str(r#"{"txid": "op-1", "status": "yes", "hash": "0xabc"}"#).unwrap();
        assert_eq!(done.status, Some(Flag::Yes));
    }

    #[test]
    fn empty_page_is_exhausted() {
        let page: PaymentPage = serde_json::from_str("{}").unwrap();
        assert!(page.results.is_empty());
        assert!(page.next_token.is_none());
    }
}
