use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tokio::sync::mpsc;

use cortex_agent::{HttpChatProvider, LlmProvider};
use cortex_bus::SqliteBus;
use cortex_core::config::CortexConfig;
use cortex_memory::{BruteForceIndex, CadenceConfig, Embedder, HashEmbedder, MemoryStore, ThreadMessageSource, VectorIndex};
use cortex_research::{HttpSearchClient, JobRunner, ResearchFetcher, ResearchJob, SecondaryNewsClient};

use crate::summarizer::LlmSummarizer;
use crate::thread_client::GatewayThreadSource;

/// Central shared state for the memory service, passed as `Arc<AppState>`
/// to every Axum handler (mirrors the gateway's own `AppState` shape).
pub struct AppState {
    pub config: CortexConfig,
    pub store: MemoryStore,
    pub bus: Arc<SqliteBus>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub cadence_cfg: CadenceConfig,
    pub research_tx: mpsc::Sender<ResearchJob>,
    pub ingest_tx: mpsc::Sender<cortex_memory::IngestEvent>,
    pub llm_provider: Arc<dyn LlmProvider>,
    pub thread_source: Arc<dyn ThreadMessageSource>,
    pub summarizer: LlmSummarizer,
    /// Same primary search backend the research sidecar's `JobRunner` uses,
    /// held here too for `POST /v1/web-search`'s synchronous, uncached path
    /// — distinct from the hidden sidecar's cache-and-publish flow.
    pub fetcher: Arc<dyn ResearchFetcher>,
}

impl AppState {
    /// Builds the full state and spawns the research `JobRunner` as a
    /// background task. Returns the ingest-event receiver, which the caller
    /// (`main.rs`) hands to `ingest_worker::spawn_workers`.
    pub fn new(config: CortexConfig) -> anyhow::Result<(Arc<Self>, mpsc::Receiver<cortex_memory::IngestEvent>)> {
        let store = MemoryStore::open(&config.database.memory_path)?;
        let bus = Arc::new(SqliteBus::open(&config.bus.path)?);
        let vector_index: Arc<dyn VectorIndex> = Arc::new(BruteForceIndex::new());
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::default());

        let cadence_cfg = CadenceConfig {
            msg_threshold: config.memory.audit_msg_threshold,
            token_threshold: config.memory.audit_token_threshold,
            time_ms: config.memory.audit_time_ms as i64,
            quality_threshold: config.memory.quality_threshold,
        };

        let default_provider = config
            .providers
            .entries
            .first()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no providers configured: cortex-memoryd needs at least one for summarization/web-search"))?;
        let llm_provider: Arc<dyn LlmProvider> = Arc::new(HttpChatProvider::new(
            default_provider.id.clone(),
            default_provider.api_key.clone(),
            default_provider.base_url.clone(),
            default_provider.chat_path.clone(),
        ));
        let model = default_provider.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
        let summarizer = LlmSummarizer::new(Arc::clone(&llm_provider), model);

        let thread_source: Arc<dyn ThreadMessageSource> = Arc::new(GatewayThreadSource::new(config.memory.gateway_url.clone()));

        let fetcher: Arc<dyn ResearchFetcher> = Arc::new(HttpSearchClient::new(
            config.research.api_key.clone().unwrap_or_default(),
            config.research.base_url.clone(),
        ));
        let secondary: Option<Arc<dyn ResearchFetcher>> = config
            .research
            .api_key
            .clone()
            .map(|key| Arc::new(SecondaryNewsClient::new(key, config.research.base_url.clone())) as Arc<dyn ResearchFetcher>);
        let (research_tx, research_rx) = mpsc::channel(config.research.queue_capacity);
        let job_runner = JobRunner::new(
            Arc::clone(&fetcher),
            secondary,
            Arc::clone(&bus),
            Duration::from_millis(config.research.job_timeout_ms),
        );

        let (ingest_tx, ingest_rx) = mpsc::channel(config.memory.ingest_queue_capacity);

        let state = Arc::new(Self {
            config,
            store,
            bus,
            vector_index,
            embedder,
            cadence_cfg,
            research_tx,
            ingest_tx,
            llm_provider,
            thread_source,
            summarizer,
            fetcher,
        });

        tokio::spawn(job_runner.run(research_rx));

        Ok((state, ingest_rx))
    }
}

/// Assemble the full Axum router for the memory service's HTTP surface.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/v1/memories", post(crate::http::memories::save_memory))
        .route("/v1/memories", get(crate::http::memories::list_memories))
        .route("/v1/memories/{id}", put(crate::http::memories::update_memory))
        .route("/v1/memories/{id}", delete(crate::http::memories::delete_memory))
        .route("/v1/recall", get(crate::http::recall::recall_handler))
        .route("/v1/profile", get(crate::http::profile::profile_handler))
        .route("/v1/conversations", get(crate::http::conversations::conversations_handler))
        .route("/v1/web-search", post(crate::http::web_search::web_search_handler))
        .route("/v1/ingest-events", post(crate::http::ingest_events::ingest_event_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
