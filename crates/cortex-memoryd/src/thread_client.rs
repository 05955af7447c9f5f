use async_trait::async_trait;
use serde::Deserialize;

use cortex_memory::error::{MemoryError, Result};
use cortex_memory::{ThreadMessage, ThreadMessageSource};

/// Fetches a thread's transcript from the gateway's `GET
/// /v1/threads/:id/messages`.
pub struct GatewayThreadSource {
    client: reqwest::Client,
    base_url: String,
}

impl GatewayThreadSource {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }
}

#[derive(Deserialize)]
struct WireThreadMessage {
    role: String,
    content: String,
    seq: i64,
}

#[async_trait]
impl ThreadMessageSource for GatewayThreadSource {
    async fn fetch_messages(&self, thread_id: &str, since_seq: Option<i64>) -> Result<Vec<ThreadMessage>> {
        let mut url = format!("{}/v1/threads/{}/messages", self.base_url, thread_id);
        if let Some(seq) = since_seq {
            url.push_str(&format!("?sinceId={}", seq));
        }

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MemoryError::Summarizer(format!("gateway transcript fetch failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(MemoryError::Summarizer(format!(
                "gateway transcript fetch returned {}",
                resp.status()
            )));
        }

        let wire: Vec<WireThreadMessage> = resp
            .json()
            .await
            .map_err(|e| MemoryError::Summarizer(format!("gateway transcript parse failed: {e}")))?;

        Ok(wire
            .into_iter()
            .map(|m| ThreadMessage {
                role: m.role,
                content: m.content,
                seq: m.seq,
            })
            .collect())
    }
}
