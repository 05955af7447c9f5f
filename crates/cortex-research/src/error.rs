use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("bus error: {0}")]
    Bus(#[from] cortex_bus::BusError),

    #[error("fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("job timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("rate limit exceeded for {scope}")]
    RateLimited { scope: String },
}

pub type Result<T> = std::result::Result<T, ResearchError>;

impl From<ResearchError> for cortex_core::CortexError {
    fn from(e: ResearchError) -> Self {
        match e {
            ResearchError::Timeout { ms } => cortex_core::CortexError::Timeout { ms },
            ResearchError::RateLimited { .. } => cortex_core::CortexError::QuotaError {
                retry_after_ms: 60_000,
            },
            other => cortex_core::CortexError::UpstreamTransient(other.to_string()),
        }
    }
}
