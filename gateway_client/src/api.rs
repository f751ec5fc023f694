use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::GatewayConfig,
    data_objects::{
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
    },
    GatewayApiError,
};

#[derive(Clone)]
pub struct GatewayClient {
    config: GatewayConfig,
    client: Arc<Client>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(config.api_key.reveal().as_str())
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        headers.insert("x-api-key", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| GatewayApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }

    async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, GatewayApiError> {
        let url = self.url(path);
        trace!("Sending gateway query: {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| GatewayApiError::Transport(e.to_string()))?;
        if response.status().is_success() {
            trace!("Gateway query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| GatewayApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| GatewayApiError::Transport(e.to_string()))?;
            Err(GatewayApiError::QueryError { status, message })
        }
    }

    /// Lists payments updated after `since`, ascending by update time. Pass the previous page's
    /// `next_token` to continue a listing.
    pub async fn list_payments(
        &self,
        since: DateTime<Utc>,
        next_token: Option<&str>,
    ) -> Result<PaymentPage, GatewayApiError> {
        let start_at = since.timestamp().to_string();
        let mut params = vec![("sortBy", "updatedAt"), ("sortOrder", "ascending"), ("startAt", start_at.as_str())];
        if let Some(token) = next_token {
            params.push(("nextToken", token));
        }
        debug!("Listing payments updated since {since}");
        self.rest_query::<PaymentPage, ()>(Method::GET, "/payments", &params, None).await
    }

    pub async fn get_payment(&self, id: &str) -> Result<Payment, GatewayApiError> {
        debug!("Fetching payment [{id}]");
        self.rest_query::<Payment, ()>(Method::GET, &format!("/payments/{id}"), &[], None).await
    }

    pub async fn get_payment_operation(&self, id: &str, txid: &str) -> Result<PaymentOperation, GatewayApiError> {
        debug!("Fetching operation [{txid}] for payment [{id}]");
        self.rest_query::<PaymentOperation, ()>(Method::GET, &format!("/payments/{id}/operations/{txid}"), &[], None)
            .await
    }

    pub async fn list_payment_operations(
        &self,
        id: &str,
        next_token: Option<&str>,
    ) -> Result<OperationPage, GatewayApiError> {
        let mut params = vec![];
        if let Some(token) = next_token {
            params.push(("nextToken", token));
        }
        self.rest_query::<OperationPage, ()>(Method::GET, &format!("/payments/{id}/operations"), &params, None).await
    }

    /// Transfers `req.amount` of `req.token` from the payment's temporary wallet to the
    /// merchant. Returns the txid of the in-flight operation.
    pub async fn settle_payment(
        &self,
        id: &str,
        chain: &str,
        req: &SettleRequest,
    ) -> Result<OperationSubmitted, GatewayApiError> {
        info!("Requesting settlement of payment [{id}] on {chain}");
        self.rest_query(Method::POST, &format!("/payments/{id}/settle"), &[("chain", chain)], Some(req)).await
    }

    /// Returns the full remaining balance of `req.token` to the payer. Returns the txid of the
    /// in-flight operation.
    pub async fn refund_payment(
        &self,
        id: &str,
        chain: &str,
        req: &RefundRequest,
    ) -> Result<OperationSubmitted, GatewayApiError> {
        info!("Requesting refund of payment [{id}] on {chain}");
        self.rest_query(Method::POST, &format!("/payments/{id}/refund"), &[("chain", chain)], Some(req)).await
    }

    pub async fn list_tokens(&self) -> Result<Vec<Token>, GatewayApiError> {
        self.rest_query::<Vec<Token>, ()>(Method::GET, "/tokens", &[], None).await
    }

    pub async fn create_checkout_url(&self, req: &CheckoutRequest) -> Result<CheckoutUrl, GatewayApiError> {
        debug!("Creating hosted checkout for order [{}]", req.id);
        self.rest_query(Method::POST, "/checkouts", &[], Some(req)).await
    }

    /// Verifies the HMAC parameters the gateway appends to the checkout success redirect.
    pub async fn validate_checkout_signature(
        &self,
        req: &ValidateSignatureRequest,
    ) -> Result<SignatureCheck, GatewayApiError> {
        self.rest_query(Method::POST, "/checkouts/validate", &[], Some(req)).await
    }
}
