use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ConversationsQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "excludeThreadId")]
    pub exclude_thread_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    2
}

#[derive(Debug, Serialize)]
pub struct ConversationSummaryResponse {
    pub thread_id: String,
    pub summary: String,
    pub updated_at: i64,
}

/// `GET /v1/conversations?userId=&excludeThreadId=&limit=` — most-recent
/// thread summaries, excluding the caller's own thread.
pub async fn conversations_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ConversationsQuery>,
) -> Result<Json<Vec<ConversationSummaryResponse>>, ApiError> {
    let summaries = state
        .store
        .recent_conversations(&q.user_id, q.exclude_thread_id.as_deref(), q.limit)?;
    Ok(Json(
        summaries
            .into_iter()
            .map(|s| ConversationSummaryResponse {
                thread_id: s.thread_id,
                summary: s.summary,
                updated_at: s.updated_at,
            })
            .collect(),
    ))
}
