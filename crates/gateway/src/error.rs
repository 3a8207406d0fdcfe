use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Link not found")]
    NotFound,

    #[error("Link expired")]
    Expired,

    #[error("Link usage limit reached")]
    Exhausted,

    #[error("Link revoked")]
    Revoked,

    #[error("Store busy, retry shortly")]
    Busy,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Upstream fetch failed: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::Expired | GatewayError::Exhausted | GatewayError::Revoked => {
                StatusCode::FORBIDDEN
            }
            GatewayError::Busy => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        GatewayError::InvalidArgument(rejection.body_text())
    }
}

impl From<linkgate_net::NetError> for GatewayError {
    fn from(e: linkgate_net::NetError) -> Self {
        GatewayError::Upstream(e.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "success": false,
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::InvalidArgument("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GatewayError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(GatewayError::Expired.status(), StatusCode::FORBIDDEN);
        assert_eq!(GatewayError::Exhausted.status(), StatusCode::FORBIDDEN);
        assert_eq!(GatewayError::Revoked.status(), StatusCode::FORBIDDEN);
        assert_eq!(GatewayError::Busy.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            GatewayError::Upstream("down".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn test_internal_errors_do_not_leak() {
        let response = GatewayError::Storage("/var/lib/secret/tokens.json: EACCES".into())
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "internal server error");
    }
}
