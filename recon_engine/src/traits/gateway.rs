use chrono::{DateTime, Utc};
use gateway_client::{
    CheckoutRequest,
    CheckoutUrl,
    GatewayApiError,
    GatewayClient,
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

/// The slice of the gateway's RPC surface the reconciliation jobs consume. The production
/// implementation is the HTTP [`GatewayClient`]; tests mock this trait.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayApi {
    async fn list_payments(
        &self,
        since: DateTime<Utc>,
        next_token: Option<String>,
    ) -> Result<PaymentPage, GatewayApiError>;

    async fn get_payment(&self, id: &str) -> Result<Payment, GatewayApiError>;

    async fn get_payment_operation(&self, id: &str, txid: &str) -> Result<PaymentOperation, GatewayApiError>;

    async fn list_payment_operations(
        &self,
        id: &str,
        next_token: Option<String>,
    ) -> Result<OperationPage, GatewayApiError>;

    async fn settle_payment(
        &self,
        id: &str,
        chain: &str,
        req: &SettleRequest,
    ) -> Result<OperationSubmitted, GatewayApiError>;

    async fn refund_payment(
        &self,
        id: &str,
        chain: &str,
        req: &RefundRequest,
    ) -> Result<OperationSubmitted, GatewayApiError>;

    async fn list_tokens(&self) -> Result<Vec<Token>, GatewayApiError>;

    async fn create_checkout_url(&self, req: &CheckoutRequest) -> Result<CheckoutUrl, GatewayApiError>;

    async fn validate_checkout_signature(
        &self,
        req: &ValidateSignatureRequest,
    ) -> Result<SignatureCheck, GatewayApiError>;
}

impl PaymentGatewayApi for GatewayClient {
    async fn list_payments(
        &self,
        since: DateTime<Utc>,
        next_token: Option<String>,
    ) -> Result<PaymentPage, GatewayApiError> {
        GatewayClient::list_payments(self, since, next_token.as_deref()).await
    }

    async fn get_payment(&self, id: &str) -> Result<Payment, GatewayApiError> {
        GatewayClient::get_payment(self, id).await
    }

    async fn get_payment_operation(&self, id: &str, txid: &str) -> Result<PaymentOperation, GatewayApiError> {
        GatewayClient::get_payment_operation(self, id, txid).await
    }

    async fn list_payment_operations(
        &self,
        id: &str,
        next_token: Option<String>,
    ) -> Result<OperationPage, GatewayApiError> {
        GatewayClient::list_payment_operations(self, id, next_token.as_deref()).await
    }

    async fn settle_payment(
        &self,
        id: &str,
        chain: &str,
        req: &SettleRequest,
    ) -> Result<OperationSubmitted, GatewayApiError> {
        GatewayClient::settle_payment(self, id, chain, req).await
    }

    async fn refund_payment(
        &self,
        id: &str,
        chain: &str,
        req: &RefundRequest,
    ) -> Result<OperationSubmitted, GatewayApiError> {
        GatewayClient::refund_payment(self, id, chain, req).await
    }

    async fn list_tokens(&self) -> Result<Vec<Token>, GatewayApiError> {
        GatewayClient::list_tokens(self).await
    }

    async fn create_checkout_url(&self, req: &CheckoutRequest) -> Result<CheckoutUrl, GatewayApiError> {
        GatewayClient::create_checkout_url(self, req).await
    }

    async fn validate_checkout_signature(
        &self,
        req: &ValidateSignatureRequest,
    ) -> Result<SignatureCheck, GatewayApiError> {
        GatewayClient::validate_checkout_signature(self, req).await
    }
}
