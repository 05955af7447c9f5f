use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ThreadMessagesQuery {
    #[serde(rename = "sinceId")]
    pub since_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WireThreadMessage {
    pub role: String,
    pub content: String,
    pub seq: i64,
}

/// `GET /v1/threads/:id/messages?sinceId=` —
/// resolves the "Gateway-DB path" open question: the memory service's
/// `GatewayThreadSource` calls this instead of opening the gateway's
/// SQLite file directly.
pub async fn thread_messages_handler(
    State(state): State<Arc<AppState>>,
    Path(thread_id): Path<String>,
    Query(q): Query<ThreadMessagesQuery>,
) -> Result<Json<Vec<WireThreadMessage>>, ApiError> {
    let messages = state.messages.list_since(&thread_id, q.since_id)?;
    Ok(Json(
        messages
            .into_iter()
            .map(|m| WireThreadMessage { role: m.role, content: m.content, seq: m.seq })
            .collect(),
    ))
}
