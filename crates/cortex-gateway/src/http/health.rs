use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppState;

/// `GET /health` — liveness probe.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "default_model": state.config.context.default_model,
        "memoryd_url": state.config.gateway.memoryd_url,
    }))
}
