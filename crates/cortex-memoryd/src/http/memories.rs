use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use cortex_memory::{profile, Memory, SaveMemoryRequest};

use crate::app::AppState;
use crate::error::ApiError;
use crate::http::user_id_from_headers;

#[derive(Debug, Serialize)]
pub struct WireMemory {
    pub id: String,
    pub user_id: String,
    pub thread_id: Option<String>,
    pub content: String,
    pub priority: f64,
    pub confidence: f64,
    pub tier: String,
    pub updated_at: i64,
}

impl From<Memory> for WireMemory {
    fn from(m: Memory) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            thread_id: m.thread_id,
            content: m.content,
            priority: m.priority,
            confidence: m.confidence,
            tier: m.tier.to_string(),
            updated_at: m.updated_at,
        }
    }
}

/// POST /v1/memories — explicit save.
pub async fn save_memory(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SaveMemoryRequest>,
) -> Result<Json<WireMemory>, ApiError> {
    let user_id = user_id_from_headers(&headers)?;
    let memory = state
        .store
        .save_explicit(&user_id, &req.thread_id, &req.content, req.priority, req.tier)?;
    profile::invalidate(&state.bus, &user_id)?;
    Ok(Json(memory.into()))
}

#[derive(Debug, Deserialize)]
pub struct ListMemoriesQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// GET /v1/memories?userId=... — admin/debug listing.
pub async fn list_memories(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListMemoriesQuery>,
) -> Result<Json<Vec<WireMemory>>, ApiError> {
    let memories = state.store.list_for_user(&q.user_id)?;
    Ok(Json(memories.into_iter().map(WireMemory::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemoryRequest {
    pub content: String,
}

/// PUT /v1/memories/:id — edit content.
pub async fn update_memory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<UpdateMemoryRequest>,
) -> Result<Json<WireMemory>, ApiError> {
    let user_id = user_id_from_headers(&headers)?;
    let memory = state.store.update_content(&id, &req.content)?;
    profile::invalidate(&state.bus, &user_id)?;
    Ok(Json(memory.into()))
}

/// DELETE /v1/memories/:id — soft delete, cascades the FTS shadow row
/// for that memory.
pub async fn delete_memory(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<(), ApiError> {
    let user_id = user_id_from_headers(&headers)?;
    state.store.delete(&id)?;
    profile::invalidate(&state.bus, &user_id)?;
    Ok(())
}
