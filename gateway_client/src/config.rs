use log::*;
use tpr_common::Secret;

#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Base URL of the gateway API, e.g. "https://api.tokenpay.example/v1"
    pub api_url: String,
    pub api_key: Secret<String>,
}

impl GatewayConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { api_url: api_url.into(), api_key: Secret::new(api_key.into()) }
    }

    pub fn new_from_env_or_default() -> Self {
        let api_url = std::env::var("TPR_GATEWAY_URL").unwrap_or_else(|_| {
            warn!("TPR_GATEWAY_URL not set, using (probably useless) default");
            "https://api.gateway.invalid/v1".to_string()
        });
        let api_key = Secret::new(std::env::var("TPR_GATEWAY_API_KEY").unwrap_or_else(|_| {
            warn!("TPR_GATEWAY_API_KEY not set, gateway calls will be rejected");
            String::default()
        }));
        Self { api_url, api_key }
    }
}
