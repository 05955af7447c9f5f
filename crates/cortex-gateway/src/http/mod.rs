pub mod artifacts;
pub mod chat;
pub mod health;
pub mod threads;

use axum::http::HeaderMap;

use cortex_core::CortexError;

use crate::app::AppState;
use crate::error::ApiError;

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Resolves the calling user's identity from the bearer token. Two modes:
/// with no `auth_token` configured the bearer token itself is the
/// user id (zero-config startup); with one configured it is a shared
/// deployment secret, and the caller must additionally supply `x-user-id`
/// to identify the end user, the same header convention the memory
/// service already expects on its internal surface.
pub(crate) fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let token = extract_bearer(headers)
        .ok_or_else(|| ApiError(CortexError::UserError("missing bearer token".to_string())))?;

    match &state.config.gateway.auth_token {
        None => Ok(token.to_string()),
        Some(expected) => {
            if token != expected {
                return Err(ApiError(CortexError::UserError("invalid bearer token".to_string())));
            }
            headers
                .get("x-user-id")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ApiError(CortexError::UserError("missing x-user-id header".to_string())))
        }
    }
}
