use serde::{Deserialize, Serialize};

/// HTTP client for the Memory Service (`cortex-memoryd`). The
/// gateway never links `cortex-memory` directly — this is the only channel
/// between the two binaries besides the shared cache bus.
/// Wire types below are independent of `cortex-memory::types` by design.
#[derive(Clone)]
pub struct MemoryClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryClientError {
    #[error("memory service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("memory service returned {status}: {message}")]
    Api { status: u16, message: String },
}

pub type Result<T> = std::result::Result<T, MemoryClientError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMemory {
    pub id: String,
    pub user_id: String,
    pub thread_id: Option<String>,
    pub content: String,
    pub priority: f64,
    pub confidence: f64,
    pub tier: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveMemoryRequest {
    pub thread_id: String,
    pub content: String,
    pub priority: Option<f64>,
    pub tier: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    pub stack_keywords: Vec<String>,
    pub domain_keywords: Vec<String>,
    pub expertise: String,
    pub communication_style: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationSummary {
    pub thread_id: String,
    pub summary: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebSearchRequest {
    pub query: String,
    pub thread_id: Option<String>,
    pub conversation_context: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchResponse {
    pub claims: Vec<String>,
    pub sources: Vec<WireSource>,
    pub confidence: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireSource {
    pub host: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestEventRequest {
    pub user_id: String,
    pub thread_id: String,
    pub role: String,
    pub content: String,
}

impl MemoryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn save_memory(&self, user_id: &str, req: &SaveMemoryRequest) -> Result<WireMemory> {
        let resp = self
            .client
            .post(self.url("/v1/memories"))
            .header("x-user-id", user_id)
            .json(req)
            .send()
            .await?;
        parse(resp).await
    }

    pub async fn recall(
        &self,
        user_id: &str,
        thread_id: Option<&str>,
        query: Option<&str>,
        max_items: usize,
        deadline_ms: u64,
    ) -> Result<Vec<WireMemory>> {
        let mut url = format!(
            "{}?userId={}&maxItems={}&deadlineMs={}",
            self.url("/v1/recall"),
            user_id,
            max_items,
            deadline_ms
        );
        if let Some(t) = thread_id {
            url.push_str(&format!("&threadId={}", t));
        }
        if let Some(q) = query {
            url.push_str(&format!("&query={}", urlencode(q)));
        }
        let resp = self.client.get(url).header("x-user-id", user_id).send().await?;
        parse(resp).await
    }

    pub async fn delete_memory(&self, user_id: &str, id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.url(&format!("/v1/memories/{}", id)))
            .header("x-user-id", user_id)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        Ok(())
    }

    pub async fn profile(&self, user_id: &str) -> Result<ProfileResponse> {
        let resp = self
            .client
            .get(self.url("/v1/profile"))
            .header("x-user-id", user_id)
            .send()
            .await?;
        parse(resp).await
    }

    pub async fn conversations(
        &self,
        user_id: &str,
        exclude_thread_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ConversationSummary>> {
        let mut url = format!("{}?userId={}&limit={}", self.url("/v1/conversations"), user_id, limit);
        if let Some(t) = exclude_thread_id {
            url.push_str(&format!("&excludeThreadId={}", t));
        }
        let resp = self.client.get(url).header("x-user-id", user_id).send().await?;
        parse(resp).await
    }

    pub async fn web_search(&self, user_id: &str, req: &WebSearchRequest) -> Result<WebSearchResponse> {
        let resp = self
            .client
            .post(self.url("/v1/web-search"))
            .header("x-user-id", user_id)
            .json(req)
            .send()
            .await?;
        parse(resp).await
    }

    pub async fn post_ingest_event(&self, req: &IngestEventRequest) -> Result<()> {
        let resp = self.client.post(self.url("/v1/ingest-events")).json(req).send().await?;
        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        Ok(())
    }
}

async fn parse<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T> {
    if !resp.status().is_success() {
        return Err(error_from(resp).await);
    }
    Ok(resp.json().await?)
}

async fn error_from(resp: reqwest::Response) -> MemoryClientError {
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    MemoryClientError::Api { status, message }
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c.to_string()
            } else {
                format!("%{:02X}", c as u32)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_escapes_spaces_and_punctuation() {
        assert_eq!(urlencode("favorite color"), "favorite%20color");
        assert_eq!(urlencode("rust-lang"), "rust-lang");
    }
}
