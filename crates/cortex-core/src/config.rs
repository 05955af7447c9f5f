use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_GATEWAY_PORT: u16 = 8780;
pub const DEFAULT_MEMORYD_PORT: u16 = 8781;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Top-level config (cortex.toml + CORTEX_*-prefixed env overrides).
///
/// Both binaries load the same file and read only the sections they need —
/// the gateway reads `gateway`/`providers`/`context`, the memory daemon reads
/// `memory`/`research`/`database`. `bus` is shared by both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CortexConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub research: ResearchConfig,
}

impl Default for CortexConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            memory: MemoryConfig::default(),
            context: ContextConfig::default(),
            database: DatabaseConfig::default(),
            bus: BusConfig::default(),
            providers: ProvidersConfig::default(),
            research: ResearchConfig::default(),
        }
    }
}

impl CortexConfig {
    /// Load config from a TOML file with `CORTEX_`-prefixed env var overrides.
    ///
    /// Checks, in order: an explicit path argument, then `./cortex.toml`.
    /// A missing file is not an error — `figment` simply contributes nothing
    /// and defaults apply, so the binary starts with zero configuration.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("cortex.toml");

        let config: CortexConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CORTEX_").split("_"))
            .extract()
            .map_err(|e| crate::error::CortexError::Config(e.to_string()))?;

        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Bearer token callers must present on the Gateway HTTP/SSE surface.
    pub auth_token: Option<String>,
    /// Base URL of the memory service, e.g. "http://127.0.0.1:8781".
    #[serde(default = "default_memoryd_url")]
    pub memoryd_url: String,
    /// Per-user chat requests allowed per rolling minute before `/v1/chat/stream`
    /// returns 429.
    #[serde(default = "default_chat_rate_limit_per_min")]
    pub chat_rate_limit_per_min: u32,
    /// Overall per-turn budget; the deadline a `TurnContext` is built against.
    #[serde(default = "default_turn_budget_ms")]
    pub turn_budget_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_bind(),
            auth_token: None,
            memoryd_url: default_memoryd_url(),
            chat_rate_limit_per_min: default_chat_rate_limit_per_min(),
            turn_budget_ms: default_turn_budget_ms(),
        }
    }
}

/// Memory.Ingest cadence thresholds and Memory.Recall deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_port_memoryd")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_audit_msg_threshold")]
    pub audit_msg_threshold: u32,
    #[serde(default = "default_audit_token_threshold")]
    pub audit_token_threshold: u32,
    #[serde(default = "default_audit_time_ms")]
    pub audit_time_ms: u64,
    #[serde(default = "default_recall_deadline_ms")]
    pub recall_deadline_default_ms: u64,
    #[serde(default = "default_recall_deadline_max_ms")]
    pub recall_deadline_max_ms: u64,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    #[serde(default = "default_ingest_queue_capacity")]
    pub ingest_queue_capacity: usize,
    #[serde(default = "default_ingest_workers")]
    pub ingest_workers: usize,
    #[serde(default = "bool_true")]
    pub feature_memory_review_trigger: bool,
    /// Base URL of the gateway, used to fetch thread transcripts for
    /// audit-window loading and summary regeneration.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            port: default_port_memoryd(),
            bind: default_bind(),
            audit_msg_threshold: default_audit_msg_threshold(),
            audit_token_threshold: default_audit_token_threshold(),
            audit_time_ms: default_audit_time_ms(),
            recall_deadline_default_ms: default_recall_deadline_ms(),
            recall_deadline_max_ms: default_recall_deadline_max_ms(),
            quality_threshold: default_quality_threshold(),
            ingest_queue_capacity: default_ingest_queue_capacity(),
            ingest_workers: default_ingest_workers(),
            feature_memory_review_trigger: true,
            gateway_url: default_gateway_url(),
        }
    }
}

/// Gateway.ContextAssembler tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_keep_last_turns")]
    pub keep_last_turns: usize,
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,
    #[serde(default = "default_model")]
    pub default_model: String,
    pub high_complexity_model: Option<String>,
    /// Model id routed to when a turn carries image attachments (spec
    /// §4.4: "messages containing image attachments -> the vision-capable
    /// provider"). `None` leaves image-bearing turns on the
    /// complexity-selected model.
    pub vision_model: Option<String>,
    #[serde(default)]
    pub research_sidecar_enabled: bool,
    #[serde(default)]
    pub feature_research_injection: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            keep_last_turns: default_keep_last_turns(),
            max_input_tokens: default_max_input_tokens(),
            default_model: default_model(),
            high_complexity_model: None,
            vision_model: None,
            research_sidecar_enabled: false,
            feature_research_injection: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_gateway_db_path")]
    pub gateway_path: String,
    #[serde(default = "default_memory_db_path")]
    pub memory_path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            gateway_path: default_gateway_db_path(),
            memory_path: default_memory_db_path(),
        }
    }
}

/// Shared cache bus backing store (SQLite-as-KV-with-TTL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_db_path")]
    pub path: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            path: default_bus_db_path(),
        }
    }
}

/// A single generic HTTP chat provider entry. One concrete `LlmProvider`
/// implementation (`HttpChatProvider`) is configured per entry; providers are
/// tried in the listed order by `ProviderRouter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    /// Label used in logs and the `meta` SSE event.
    pub id: String,
    pub api_key: String,
    pub base_url: String,
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    pub model: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Whether this provider serves the configured `context.vision_model`
    /// — used only to document intent in config files; routing itself
    /// keys off `ProviderSlot::preferred_model`, set from `model` above.
    #[serde(default)]
    pub vision_capable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub entries: Vec<ProviderEntry>,
}

/// Memory.Research fetch client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_research_base_url")]
    pub base_url: String,
    #[serde(default = "default_research_job_timeout_ms")]
    pub job_timeout_ms: u64,
    #[serde(default = "default_research_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_research_base_url(),
            job_timeout_ms: default_research_job_timeout_ms(),
            queue_capacity: default_research_queue_capacity(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_gateway_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}
fn default_port_memoryd() -> u16 {
    DEFAULT_MEMORYD_PORT
}
fn default_memoryd_url() -> String {
    format!("http://127.0.0.1:{}", DEFAULT_MEMORYD_PORT)
}
fn default_chat_rate_limit_per_min() -> u32 {
    60
}
fn default_turn_budget_ms() -> u64 {
    30_000
}
fn default_gateway_url() -> String {
    format!("http://127.0.0.1:{}", DEFAULT_GATEWAY_PORT)
}
fn default_audit_msg_threshold() -> u32 {
    6
}
fn default_audit_token_threshold() -> u32 {
    1500
}
fn default_audit_time_ms() -> u64 {
    180_000
}
fn default_recall_deadline_ms() -> u64 {
    200
}
fn default_recall_deadline_max_ms() -> u64 {
    500
}
fn default_quality_threshold() -> f64 {
    0.3
}
fn default_ingest_queue_capacity() -> usize {
    512
}
fn default_ingest_workers() -> usize {
    4
}
fn default_keep_last_turns() -> usize {
    10
}
fn default_max_input_tokens() -> usize {
    16_000
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_chat_path() -> String {
    "/v1/chat/completions".to_string()
}
fn default_max_retries() -> u32 {
    2
}
fn default_research_base_url() -> String {
    "https://api.tavily.com".to_string()
}
fn default_research_job_timeout_ms() -> u64 {
    5_000
}
fn default_research_queue_capacity() -> usize {
    64
}
fn default_gateway_db_path() -> String {
    data_dir_path("gateway.db")
}
fn default_memory_db_path() -> String {
    data_dir_path("memory.db")
}
fn default_bus_db_path() -> String {
    data_dir_path("bus.db")
}

fn data_dir_path(file: &str) -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cortex/{}", home, file)
}
