use std::sync::Arc;

use async_trait::async_trait;

use cortex_agent::{ChatRequest, LlmProvider, Message, Role};
use cortex_memory::error::{MemoryError, Result};
use cortex_memory::{Summarizer, ThreadMessage};

/// `Summarizer` backed by a configured `LlmProvider` — the concrete
/// implementation `cortex-memory::summary` leaves as a narrow trait so it
/// never depends on a vendor SDK.
pub struct LlmSummarizer {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: String) -> Self {
        Self { provider, model }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, previous: Option<&str>, messages: &[ThreadMessage]) -> Result<String> {
        let transcript: String = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let system = match previous {
            Some(prev) if !prev.is_empty() => format!(
                "Update the following running summary of a conversation with the new messages below. \
                 Keep it under 6 sentences, factual, no speculation.\n\nExisting summary:\n{prev}\n\nNew messages:\n{transcript}"
            ),
            _ => format!(
                "Summarize the following conversation in under 6 sentences, factual, no speculation.\n\n{transcript}"
            ),
        };

        let req = ChatRequest {
            model: self.model.clone(),
            system,
            messages: vec![Message {
                role: Role::User,
                content: "Produce the summary now.".to_string(),
            }],
            max_tokens: 256,
            stream: false,
        };

        let resp = self
            .provider
            .send(&req)
            .await
            .map_err(|e| MemoryError::Summarizer(e.to_string()))?;
        Ok(resp.content)
    }
}
