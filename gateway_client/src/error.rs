use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not reach the gateway: {0}")]
    Transport(String),
    #[error("Could not deserialize gateway response: {0}")]
    JsonError(String),
    #[error("Gateway rejected the request. Error {status}. {message}")]
    QueryError { status: u16, message: String },
}

impl GatewayApiError {
    /// 400-class rejections are permanent: the request itself is invalid and resending it
    /// can never succeed.
    pub fn is_rejection(&self) -> bool {
        matches!(self, GatewayApiError::QueryError { status, .. } if (400..500).contains(status))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayApiError::QueryError { status: 404, .. })
    }
}
