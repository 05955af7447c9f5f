pub mod capsule;
pub mod error;
pub mod fetch;
pub mod job;
pub mod rerank;
pub mod runner;
pub mod types;

pub use error::{ResearchError, Result};
pub use fetch::{HttpSearchClient, ResearchFetcher, SecondaryNewsClient};
pub use job::run_job;
pub use runner::{enqueue, JobRunner};
pub use types::{
    freshness_from_query, Confidence, RecencyHint, ResearchCapsule, ResearchJob, SearchResult,
    Source, TtlClass,
};
