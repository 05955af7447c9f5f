use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use cortex_memory::IngestEvent;

use crate::app::AppState;
use crate::error::ApiError;

/// `POST /v1/ingest-events` — the gateway's per-turn handoff into
/// Memory.Ingest. Enqueues onto the bounded internal
/// work queue and returns immediately; a full queue drops the event rather
/// than blocking the caller, since the chat hot path must never wait on
/// ingest.
pub async fn ingest_event_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<IngestEvent>,
) -> Result<Json<Value>, ApiError> {
    match state.ingest_tx.try_send(event) {
        Ok(()) => Ok(Json(json!({ "accepted": true }))),
        Err(_) => Ok(Json(json!({ "accepted": false, "reason": "ingest queue full" }))),
    }
}
