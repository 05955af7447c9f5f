use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use cortex_memory::profile;

use crate::app::AppState;
use crate::error::ApiError;
use crate::http::user_id_from_headers;

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub stack_keywords: Vec<String>,
    pub domain_keywords: Vec<String>,
    pub expertise: String,
    pub communication_style: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// `GET /v1/profile` — derived profile for the user, from cache or
/// recomputed. `userId` may arrive either as `x-user-id` (the
/// gateway's usual internal-caller convention) or as a query param, to
/// match the endpoint's own documented signature.
pub async fn profile_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ProfileQuery>,
    headers: HeaderMap,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user_id = match q.user_id {
        Some(id) => id,
        None => user_id_from_headers(&headers)?,
    };
    let profile = profile::load_or_derive(&state.store, &state.bus, &user_id)?;
    Ok(Json(ProfileResponse {
        stack_keywords: profile.payload.stack_keywords,
        domain_keywords: profile.payload.domain_keywords,
        expertise: profile.payload.expertise,
        communication_style: profile.payload.communication_style,
    }))
}
