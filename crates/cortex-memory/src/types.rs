use cortex_core::Tier;
use serde::{Deserialize, Serialize};

/// A single durable memory row. `entities` and
/// `thread_set` are kept as typed wrapper fields at the struct boundary and
/// serialized to JSON only at the SQLite column boundary (`row_to_memory`)
/// and the HTTP wire boundary — never passed around as loose `serde_json::Value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub user_id: String,
    pub thread_id: Option<String>,
    pub content: String,
    pub entities: Vec<String>,
    pub priority: f64,
    pub confidence: f64,
    pub tier: Tier,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_seen_ts: i64,
    pub repeats: u32,
    pub thread_set: Vec<String>,
    pub redaction_map: serde_json::Value,
    pub deleted_at: Option<i64>,
}

/// Request body for `POST /v1/memories` (explicit save).
#[derive(Debug, Clone, Deserialize)]
pub struct SaveMemoryRequest {
    pub thread_id: String,
    pub content: String,
    pub priority: Option<f64>,
    pub tier: Option<Tier>,
}

/// Audit batch record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub user_id: String,
    pub thread_id: String,
    pub start_msg_id: i64,
    pub end_msg_id: i64,
    pub score: f64,
    pub saved: u32,
    pub created_at: i64,
}

/// Lazily regenerated per-thread summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub user_id: String,
    pub summary: String,
    pub updated_at: i64,
}

/// Derived per-user profile payload.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProfilePayload {
    pub stack_keywords: Vec<String>,
    pub domain_keywords: Vec<String>,
    pub expertise: String,
    pub communication_style: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub payload: ProfilePayload,
    pub updated_at: i64,
}

/// One inbound chat turn awaiting an audit pass.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub id: i64,
    pub user_id: String,
    pub thread_id: String,
    pub role: String,
    pub content: String,
    pub token_estimate: u32,
    pub created_at: i64,
}

/// Cadence tracking state for a thread (message-count / token / time triggers).
#[derive(Debug, Clone)]
pub struct CadenceState {
    pub thread_id: String,
    pub user_id: String,
    pub msg_count: u32,
    pub token_count: u32,
    pub last_audit_at: i64,
}

/// An ingest event posted by the gateway for every assistant turn
/// (`POST /v1/ingest-events`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestEvent {
    pub user_id: String,
    pub thread_id: String,
    pub role: String,
    pub content: String,
}

/// A scored recall candidate — keyword score, semantic score, and the
/// weighted composite used for the final ordering.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    pub keyword_score: f64,
    pub semantic_score: f64,
    pub composite_score: f64,
}
