use thiserror::Error;

/// Error taxonomy shared by both services.
///
/// `code()` gives a stable string used in API error bodies and log fields;
/// `is_user_visible()` marks the subset whose message text may be returned
/// verbatim to a client instead of being replaced with a generic message.
#[derive(Debug, Error)]
pub enum CortexError {
    #[error("invalid request: {0}")]
    UserError(String),

    #[error("rate limit exceeded, retry after {retry_after_ms}ms")]
    QuotaError { retry_after_ms: u64 },

    #[error("upstream transient failure: {0}")]
    UpstreamTransient(String),

    #[error("upstream rejected request: {0}")]
    UpstreamPermanent(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl CortexError {
    /// Stable error code for API bodies and log correlation.
    pub fn code(&self) -> &'static str {
        match self {
            CortexError::UserError(_) => "USER_ERROR",
            CortexError::QuotaError { .. } => "QUOTA_ERROR",
            CortexError::UpstreamTransient(_) => "UPSTREAM_TRANSIENT",
            CortexError::UpstreamPermanent(_) => "UPSTREAM_PERMANENT",
            CortexError::Config(_) => "CONFIG_ERROR",
            CortexError::Database(_) => "DATABASE_ERROR",
            CortexError::Serialization(_) => "SERIALIZATION_ERROR",
            CortexError::Io(_) => "IO_ERROR",
            CortexError::Timeout { .. } => "TIMEOUT",
            CortexError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True when the error message is safe to return to the caller verbatim.
    /// `Internal` errors are logged with detail but surfaced generically.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, CortexError::Internal(_) | CortexError::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, CortexError>;
