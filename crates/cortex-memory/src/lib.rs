pub mod dedup;
pub mod db;
pub mod error;
pub mod ingest;
pub mod profile;
pub mod recall;
pub mod redact;
pub mod store;
pub mod summary;
pub mod types;
pub mod vector;

pub use error::{MemoryError, Result};
pub use ingest::{
    estimate_tokens, record_turn, run_audit, score_message, AuditOutcome, CadenceConfig,
    FrozenWindow, ResearchSignal,
};
pub use recall::{preprocess_query, recall, PreprocessedQuery, RecallRequest};
pub use store::MemoryStore;
pub use summary::{get_or_regenerate, Summarizer, ThreadMessage, ThreadMessageSource};
pub use types::{
    AuditRecord, CadenceState, IngestEvent, Memory, PendingMessage, ProfilePayload,
    SaveMemoryRequest, ScoredMemory, ThreadSummary, UserProfile,
};
pub use vector::{BruteForceIndex, Embedder, HashEmbedder, VectorIndex};
