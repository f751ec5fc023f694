//! Hosted-checkout glue.
//!
//! The storefront hands new orders to the gateway's hosted checkout, and the gateway sends
//! the payer back with an HMAC-signed receipt. Confirming that receipt only moves the order
//! to AwaitingConfirmation; actual funds detection stays with the inbound sync job.
use std::sync::Arc;

use gateway_client::{CheckoutRequest, CheckoutUrl, GatewayApiError, ValidateSignatureRequest};
use log::*;
use tpr_common::Amount;

use crate::{
    config::ReconConfig,
    db_types::{NewOrder, Order, OrderId, OrderStatus},
    traits::{PaymentGatewayApi, ReconciliationStore, StoreError},
};

const AWAITING_NOTE: &str = "Checkout receipt verified. Awaiting on-chain payment confirmation.";

/// Position of the paid amount in the pipe-delimited HMAC input the gateway signs.
const RECEIPT_AMOUNT_FIELD: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayApiError),
    #[error("Checkout signature is invalid for order {0}")]
    InvalidSignature(OrderId),
    #[error("Malformed checkout receipt: {0}")]
    MalformedReceipt(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
}

/// The signed query parameters the gateway appends to the success redirect.
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    pub hmac_alg: String,
    /// Base64-encoded pipe-delimited receipt fields.
    pub hmac_input: String,
    pub hmac_key_id: String,
    pub hmac_value: String,
}

pub struct CheckoutApi<B, G> {
    store: B,
    gateway: Arc<G>,
    config: ReconConfig,
}

impl<B, G> CheckoutApi<B, G>
where
    B: ReconciliationStore,
    G: PaymentGatewayApi,
{
    pub fn new(store: B, gateway: Arc<G>, config: ReconConfig) -> Self {
        Self { store, gateway, config }
    }

    /// Registers the order (Pending) and requests a hosted-checkout URL for it.
    pub async fn create_checkout(&self, new_order: NewOrder) -> Result<CheckoutUrl, CheckoutError> {
        let order = self.store.insert_order(new_order).await?;
        info!("🛒️ Creating checkout for order {}, total {}", order.id, order.total_price);
        let req = CheckoutRequest {
            id: order.id.as_str().to_string(),
            currency: order.currency.clone(),
            amount: order.total_price,
            success_url: self.config.checkout_success_url.clone(),
            cancel_url: self.config.checkout_cancel_url.clone(),
            base64_transform: true,
        };
        let url = self.gateway.create_checkout_url(&req).await?;
        Ok(url)
    }

    /// Validates the success-redirect receipt and, when the signed paid amount covers the
    /// order total, moves the order from Pending to AwaitingConfirmation. Returns the order in
    /// its (possibly unchanged) current state.
    pub async fn confirm_receipt(&self, receipt: CheckoutReceipt) -> Result<Order, CheckoutError> {
        let decoded = base64::decode(&receipt.hmac_input)
            .map_err(|e| CheckoutError::MalformedReceipt(format!("hmac_input is not valid base64: {e}")))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|e| CheckoutError::MalformedReceipt(format!("hmac_input is not valid UTF-8: {e}")))?;
        let check = self
            .gateway
            .validate_checkout_signature(&ValidateSignatureRequest {
                hmac_alg: receipt.hmac_alg.clone(),
                hmac_input: decoded.clone(),
                hmac_key_id: receipt.hmac_key_id.clone(),
                hmac_value: receipt.hmac_value.clone(),
            })
            .await?;
        if !check.valid {
            warn!("🛒️ Checkout receipt for order {} failed signature validation", receipt.order_id);
            return Err(CheckoutError::InvalidSignature(receipt.order_id));
        }
        let paid = decoded
            .split('|')
            .nth(RECEIPT_AMOUNT_FIELD)
            .ok_or_else(|| CheckoutError::MalformedReceipt(format!("receipt has too few fields: {decoded}")))?
            .parse::<Amount>()
            .map_err(|e| CheckoutError::MalformedReceipt(e.to_string()))?;
        let order = self
            .store
            .fetch_order(&receipt.order_id)
            .await?
            .ok_or_else(|| CheckoutError::OrderNotFound(receipt.order_id.clone()))?;
        if order.status == OrderStatus::Pending && paid >= order.total_price {
            info!("🛒️ Order {} paid {paid} at checkout, awaiting on-chain confirmation", order.id);
            let order =
                self.store.update_order_status(&order.id, OrderStatus::AwaitingConfirmation, AWAITING_NOTE).await?;
            return Ok(order);
        }
        debug!("🛒️ Order {} receipt verified but no transition applies (status {}, paid {paid})", order.id, order.status);
        Ok(order)
    }
}
