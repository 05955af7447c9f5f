use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use cortex_core::CortexError;

/// Wraps `CortexError` for the Axum response boundary. Every handler in
/// `http/` returns `Result<_, ApiError>` so error mapping lives in one
/// place.
pub struct ApiError(pub CortexError);

impl From<CortexError> for ApiError {
    fn from(e: CortexError) -> Self {
        Self(e)
    }
}

impl From<cortex_memory::MemoryError> for ApiError {
    fn from(e: cortex_memory::MemoryError) -> Self {
        Self(e.into())
    }
}

impl From<cortex_research::ResearchError> for ApiError {
    fn from(e: cortex_research::ResearchError) -> Self {
        Self(e.into())
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
