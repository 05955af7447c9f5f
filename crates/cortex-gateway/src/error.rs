use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use cortex_core::CortexError;

/// Wraps `CortexError` for the Axum response boundary, mirroring
/// `cortex-memoryd`'s `ApiError`.
pub struct ApiError(pub CortexError);

impl From<CortexError> for ApiError {
    fn from(e: CortexError) -> Self {
        Self(e)
    }
}

impl From<cortex_agent::MemoryClientError> for ApiError {
    fn from(e: cortex_agent::MemoryClientError) -> Self {
        Self(CortexError::UpstreamTransient(e.to_string()))
    }
}

impl From<cortex_agent::ProviderError> for ApiError {
    fn from(e: cortex_agent::ProviderError) -> Self {
        let mapped = match e {
            cortex_agent::ProviderError::RateLimited { retry_after_ms } => {
                CortexError::QuotaError { retry_after_ms }
            }
            cortex_agent::ProviderError::Api { message, .. } => CortexError::UpstreamPermanent(message),
            cortex_agent::ProviderError::Cancelled => CortexError::Internal("request cancelled".to_string()),
            other => CortexError::UpstreamTransient(other.to_string()),
        };
        Self(mapped)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CortexError::UserError(_) => StatusCode::BAD_REQUEST,
            CortexError::QuotaError { .. } => StatusCode::TOO_MANY_REQUESTS,
            CortexError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CortexError::UpstreamTransient(_) | CortexError::UpstreamPermanent(_) => StatusCode::BAD_GATEWAY,
            CortexError::Config(_) | CortexError::Database(_) | CortexError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            CortexError::Serialization(_) | CortexError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if self.0.is_user_visible() {
            self.0.to_string()
        } else {
            "internal error".to_string()
        };

        (status, Json(json!({ "error": message, "code": self.0.code() }))).into_response()
    }
}
