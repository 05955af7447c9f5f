//! Gateway-side orchestration: provider failover, intent classification,
//! memory-service client, prompt composition, and per-turn pipeline
//! assembly.

pub mod intent;
pub mod memory_client;
pub mod pipeline;
pub mod postprocess;
pub mod prompt;
pub mod provider;
pub mod provider_http;
pub mod query_correct;
pub mod router;
pub mod stream;

pub use intent::{classify, classify_with_fallback, extract_save_content, is_correction, is_memory_save, needs_web_search, response_length_hint, Complexity, Intent};
pub use memory_client::{
    ConversationSummary, IngestEventRequest, MemoryClient, MemoryClientError, ProfileResponse,
    SaveMemoryRequest, WebSearchRequest, WebSearchResponse, WireMemory, WireSource,
};
pub use pipeline::{assemble, poll_for_capsule, poll_for_latest_capsule, AssembledTurn, CancelToken, CapsulePreview, CapsuleSource, MissingInputs, TurnContext};
pub use postprocess::{compose_web_search_response, extract_first_numeric_literal};
pub use query_correct::correct_query;
pub use prompt::{compose, format_memory_line, format_profile_directive, format_summary_line, ComposedPrompt, SystemBlock};
pub use provider::{ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role};
pub use provider_http::HttpChatProvider;
pub use router::{ProviderRouter, ProviderSlot};
pub use stream::{parse_sse_line, SseParsed, StreamEvent};
