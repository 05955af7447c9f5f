use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use cortex_memory::{recall, RecallRequest};

use crate::app::AppState;
use crate::error::ApiError;
use crate::http::memories::WireMemory;

#[derive(Debug, Deserialize)]
pub struct RecallQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "threadId")]
    pub thread_id: Option<String>,
    pub query: Option<String>,
    #[serde(rename = "maxItems", default = "default_max_items")]
    pub max_items: usize,
    #[serde(rename = "deadlineMs")]
    pub deadline_ms: Option<u64>,
}

fn default_max_items() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct RecallResponseItem {
    #[serde(flatten)]
    pub memory: WireMemory,
    pub composite_score: f64,
}

/// `GET /v1/recall?userId=&threadId=&query=&maxItems=&deadlineMs=` — the
/// core recall endpoint. The caller's `deadlineMs` is
/// clamped to `RECALL_DEADLINE_MAX_MS` rather than trusted verbatim — a
/// misbehaving caller can't ask this stage to run longer than the system's
/// own hard cap.
pub async fn recall_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<RecallQuery>,
) -> Result<Json<Vec<RecallResponseItem>>, ApiError> {
    let deadline_ms = q
        .deadline_ms
        .unwrap_or(state.config.memory.recall_deadline_default_ms)
        .min(state.config.memory.recall_deadline_max_ms);

    let req = RecallRequest {
        user_id: q.user_id,
        thread_id: q.thread_id,
        query: q.query,
        max_items: q.max_items,
        deadline_ms,
    };

    let scored = recall(&state.store, &state.vector_index, &state.embedder, &req)?;
    let results = scored
        .into_iter()
        .map(|s| RecallResponseItem {
            memory: s.memory.into(),
            composite_score: s.composite_score,
        })
        .collect();
    Ok(Json(results))
}
