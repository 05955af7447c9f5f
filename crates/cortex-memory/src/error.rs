use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("memory not found: {id}")]
    NotFound { id: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("recall deadline exceeded")]
    DeadlineExceeded,

    #[error("summarizer error: {0}")]
    Summarizer(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

impl From<MemoryError> for cortex_core::CortexError {
    fn from(e: MemoryError) -> Self {
        match e {
            MemoryError::NotFound { id } => cortex_core::CortexError::UserError(format!(
                "memory not found: {id}"
            )),
            MemoryError::DeadlineExceeded => cortex_core::CortexError::Timeout { ms: 0 },
            other => cortex_core::CortexError::Database(other.to_string()),
        }
    }
}
