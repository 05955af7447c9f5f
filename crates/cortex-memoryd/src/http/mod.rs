pub mod conversations;
pub mod health;
pub mod ingest_events;
pub mod memories;
pub mod profile;
pub mod recall;
pub mod web_search;

use axum::http::HeaderMap;

use cortex_core::CortexError;

use crate::error::ApiError;

/// Every authenticated handler identifies the caller via `x-user-id`
/// — the gateway resolves the real end-user
/// identity and forwards it; the memory service trusts its internal caller.
pub(crate) fn user_id_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError(CortexError::UserError("missing x-user-id header".to_string())))
}
