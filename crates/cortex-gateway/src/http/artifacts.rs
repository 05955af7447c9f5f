use axum::Json;
use serde::{Deserialize, Serialize};

/// `POST /api/artifacts/gatekeeper` — surface defined, treated as a
/// collaborator boundary: classifies whether a turn should
/// produce a structured artifact. Artifact export formats themselves are
/// an explicit non-goal; this endpoint only answers the
/// classification question a downstream artifact renderer would act on.
#[derive(Debug, Deserialize)]
pub struct GatekeeperRequest {
    #[allow(dead_code)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct GatekeeperResponse {
    #[serde(rename = "shouldCreate")]
    pub should_create: bool,
    #[serde(rename = "type")]
    pub artifact_type: Option<String>,
    pub confidence: f64,
    pub rationale: String,
}

pub async fn gatekeeper_handler(Json(_req): Json<GatekeeperRequest>) -> Json<GatekeeperResponse> {
    Json(GatekeeperResponse {
        should_create: false,
        artifact_type: None,
        confidence: 0.0,
        rationale: "artifact classification is not implemented; always defers to plain-text responses".to_string(),
    })
}
