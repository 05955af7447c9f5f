use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
use crate::stream::{parse_sse_line, SseParsed, StreamEvent};

/// Generic OpenAI-chat-completions-shaped HTTP client, configurable per
/// `ProvidersConfig` entry. One concrete,
/// vendor-agnostic implementation stands in for every provider the
/// deployment configures — never a per-vendor SDK.
pub struct HttpChatProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
    chat_path: String,
}

impl HttpChatProvider {
    /// `base_url` should NOT include a trailing slash. `chat_path` should
    /// start with "/" (e.g. "/v1/chat/completions").
    pub fn new(name: impl Into<String>, api_key: String, base_url: String, chat_path: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider_name: name.into(),
            api_key,
            base_url,
            chat_path,
        }
    }
}

#[async_trait]
impl LlmProvider for HttpChatProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_request_body(req, false);
        let url = format!("{}{}", self.base_url, self.chat_path);

        debug!(model = %req.model, provider = %self.provider_name, "sending chat request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after_ms = retry_after_ms(&resp);
            return Err(ProviderError::RateLimited { retry_after_ms });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "provider returned an error");
            return Err(ProviderError::Api { status, message: text });
        }

        let api_resp: ApiResponse = resp.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(parse_response(api_resp))
    }

    async fn send_stream(
        &self,
        req: &ChatRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ProviderError> {
        let body = build_request_body(req, true);
        let url = format!("{}{}", self.base_url, self.chat_path);

        debug!(model = %req.model, provider = %self.provider_name, "sending streaming chat request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after_ms = retry_after_ms(&resp);
            return Err(ProviderError::RateLimited { retry_after_ms });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "provider returned a streaming error");
            return Err(ProviderError::Api { status, message: text });
        }

        process_stream(resp, req.model.clone(), tx).await;
        Ok(())
    }
}

fn retry_after_ms(resp: &reqwest::Response) -> u64 {
    resp.headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|s| s * 1000)
        .unwrap_or(5000)
}

fn build_request_body(req: &ChatRequest, stream: bool) -> serde_json::Value {
    let mut messages = vec![serde_json::json!({
        "role": "system",
        "content": req.system,
    })];
    for m in &req.messages {
        messages.push(serde_json::json!({
            "role": m.role,
            "content": m.content,
        }));
    }

    serde_json::json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_tokens,
        "stream": stream,
    })
}

fn parse_response(resp: ApiResponse) -> ChatResponse {
    let choice = resp.choices.into_iter().next();
    let content = choice
        .as_ref()
        .and_then(|c| c.message.content.as_deref())
        .unwrap_or("")
        .to_string();
    let stop_reason = choice.and_then(|c| c.finish_reason).unwrap_or_default();

    ChatResponse {
        content,
        model: resp.model,
        tokens_in: resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
        tokens_out: resp.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
        stop_reason,
    }
}

/// Standard SSE chat-completions stream: `data: {...}` chunks, terminated by
/// a literal `data: [DONE]`.
async fn process_stream(resp: reqwest::Response, model: String, tx: mpsc::Sender<StreamEvent>) {
    use futures_util::StreamExt;

    let mut tokens_in: u32 = 0;
    let mut tokens_out: u32 = 0;
    let mut stop_reason = String::new();
    let mut line_buf = String::new();

    let mut byte_stream = resp.bytes_stream();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx.send(StreamEvent::Error { message: e.to_string() }).await;
                return;
            }
        };

        let text = match std::str::from_utf8(&chunk) {
            Ok(t) => t,
            Err(_) => continue,
        };

        line_buf.push_str(text);
        let lines: Vec<&str> = line_buf.split('\n').collect();
        let (complete, remainder) = lines.split_at(lines.len() - 1);
        let remainder = remainder.first().unwrap_or(&"").to_string();

        for line in complete {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(SseParsed::Data(data)) = parse_sse_line(line) {
                if data.trim() == "[DONE]" {
                    break;
                }
                if let Ok(chunk_resp) = serde_json::from_str::<StreamChunk>(&data) {
                    if let Some(usage) = &chunk_resp.usage {
                        tokens_in = usage.prompt_tokens;
                        tokens_out = usage.completion_tokens;
                    }
                    for choice in &chunk_resp.choices {
                        if let Some(reason) = &choice.finish_reason {
                            if !reason.is_empty() {
                                stop_reason = reason.clone();
                            }
                        }
                        if let Some(content) = &choice.delta.content {
                            if !content.is_empty() {
                                if tx
                                    .send(StreamEvent::TextDelta { text: content.clone() })
                                    .await
                                    .is_err()
                                {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        }

        line_buf = remainder;
    }

    let _ = tx
        .send(StreamEvent::Done {
            model,
            tokens_in,
            tokens_out,
            stop_reason,
        })
        .await;
}

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
    usage: Option<StreamUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Message, Role};

    #[test]
    fn build_request_body_includes_system_and_messages() {
        let req = ChatRequest {
            model: "gpt-test".to_string(),
            system: "be helpful".to_string(),
            messages: vec![Message { role: Role::User, content: "hi".to_string() }],
            max_tokens: 64,
            stream: false,
        };
        let body = build_request_body(&req, false);
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn parse_response_extracts_content_and_usage() {
        let raw = serde_json::json!({
            "model": "gpt-test",
            "choices": [{"message": {"content": "hello"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2}
        });
        let resp: ApiResponse = serde_json::from_value(raw).unwrap();
        let parsed = parse_response(resp);
        assert_eq!(parsed.content, "hello");
        assert_eq!(parsed.tokens_in, 5);
        assert_eq!(parsed.stop_reason, "stop");
    }
}
