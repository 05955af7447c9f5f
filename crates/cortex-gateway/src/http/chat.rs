//! `POST /v1/chat/stream` — streams the model response for a turn as SSE.
//! Runs the full context-assembly + routing pipeline from `cortex-agent`:
//! history truncation, memory
//! recall, cross-thread summaries, profile lookup, intent classification,
//! provider routing/streaming, and early-window research injection.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::warn;

use cortex_agent::pipeline::{poll_for_latest_capsule, MissingInputs, TurnContext};
use cortex_agent::{
    compose_web_search_response, extract_save_content, needs_web_search, ChatRequest,
    IngestEventRequest, Intent, LlmProvider, Message, Role, SaveMemoryRequest, StreamEvent,
    WebSearchRequest,
};
use cortex_bus::keys;
use cortex_core::CortexError;

use crate::app::AppState;
use crate::error::ApiError;
use crate::http::authenticate;

#[derive(Debug, Deserialize)]
pub struct ChatStreamRequest {
    pub thread_id: String,
    /// New messages for this turn — in practice the caller's single latest
    /// user message. Prior turns are replayed from the gateway's own store,
    /// not resent by the client.
    pub messages: Vec<WireMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub attachments: Option<serde_json::Value>,
}

impl WireMessage {
    /// True iff `attachments` carries at least one entry describing an
    /// image (either a bare non-empty array, under the historical
    /// assumption that a chat client only ever sends image attachments
    /// here, or an array of `{type: "image", ...}` objects).
    fn has_image_attachment(&self) -> bool {
        match &self.attachments {
            Some(serde_json::Value::Array(items)) => items.iter().any(|item| {
                item.get("type").and_then(|t| t.as_str()).map(|t| t == "image").unwrap_or(true)
            }),
            _ => false,
        }
    }
}

const DEFAULT_MAX_TOKENS: u32 = 1024;

pub async fn chat_stream_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatStreamRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = authenticate(&state, &headers)?;

    let current_message = req
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.clone())
        .ok_or_else(|| ApiError(CortexError::UserError("no user message in request".to_string())))?;
    if current_message.trim().is_empty() {
        return Err(ApiError(CortexError::UserError("message cannot be empty".to_string())));
    }

    let rate_key = keys::rate_limit(&user_id, "chat");
    let count = state
        .bus
        .incr(&rate_key, 60)
        .map_err(|e| ApiError(CortexError::Internal(e.to_string())))?;
    if count > state.config.gateway.chat_rate_limit_per_min as i64 {
        return Err(ApiError(CortexError::QuotaError { retry_after_ms: 60_000 }));
    }

    for m in &req.messages {
        if let Err(e) = state.messages.append(&user_id, &req.thread_id, &m.role, &m.content) {
            warn!(error = %e, "failed to persist inbound turn");
        }
        spawn_ingest_post(&state, IngestEventRequest {
            user_id: user_id.clone(),
            thread_id: req.thread_id.clone(),
            role: m.role.clone(),
            content: m.content.clone(),
        });
    }

    let history: Vec<Message> = state
        .messages
        .list_since(&req.thread_id, None)
        .unwrap_or_default()
        .into_iter()
        .filter(|m| m.content != current_message)
        .map(|m| Message {
            role: if m.role == "assistant" { Role::Assistant } else { Role::User },
            content: m.content,
        })
        .collect();

    let mut ctx = TurnContext::new(
        user_id.clone(),
        req.thread_id.clone(),
        Duration::from_millis(state.config.gateway.turn_budget_ms),
    );

    let base_prompt = "You are a helpful assistant.";
    let assembled = cortex_agent::assemble(
        &mut ctx,
        &state.memory_client,
        Some(&state.router as &dyn LlmProvider),
        &state.config.context.default_model,
        base_prompt,
        &history,
        &current_message,
        state.config.context.keep_last_turns,
        state.config.context.max_input_tokens,
    )
    .await;

    let has_image_attachments = req.messages.iter().any(|m| m.has_image_attachment());
    let model = req
        .model
        .clone()
        .unwrap_or_else(|| state.model_for(assembled.complexity, has_image_attachments));
    let max_tokens = req.max_tokens.or(assembled.max_tokens_hint).unwrap_or(DEFAULT_MAX_TOKENS);
    let intent = assembled.intent;
    let missing = ctx.missing.clone();

    match intent {
        Intent::MemorySave => {
            let recent_assistant: Vec<String> = history
                .iter()
                .filter(|m| matches!(m.role, Role::Assistant))
                .map(|m| m.content.clone())
                .collect();
            let content = extract_save_content(&current_message, &recent_assistant);
            let reply = match state
                .memory_client
                .save_memory(
                    &user_id,
                    &SaveMemoryRequest { thread_id: req.thread_id.clone(), content, priority: None, tier: None },
                )
                .await
            {
                Ok(_) => "Got it, I'll remember that.".to_string(),
                Err(e) => {
                    warn!(error = %e, "memory save failed");
                    "I tried to save that but ran into a problem.".to_string()
                }
            };
            persist_assistant_reply(&state, &user_id, &req.thread_id, &reply);
            Ok(fixed_reply_sse(intent, missing, model, reply).into_response())
        }
        Intent::NeedsWebSearch if needs_web_search(&current_message) => {
            let search_req = WebSearchRequest {
                query: current_message.clone(),
                thread_id: Some(req.thread_id.clone()),
                conversation_context: last_n(&history, 3),
            };
            let results = state.memory_client.web_search(&user_id, &search_req).await?;
            let last_turns: Vec<Message> = history.iter().rev().take(3).rev().cloned().collect();
            let reply = compose_web_search_response(
                &state.router as &dyn LlmProvider,
                &model,
                &current_message,
                &results,
                &last_turns,
            )
            .await?;
            persist_assistant_reply(&state, &user_id, &req.thread_id, &reply);
            Ok(fixed_reply_sse(intent, missing, model, reply).into_response())
        }
        _ => {
            let (tx, rx) = mpsc::channel::<StreamEvent>(64);
            let chat_req = ChatRequest {
                model: model.clone(),
                system: assembled.composed.joined(),
                messages: assembled.messages,
                max_tokens,
                stream: true,
            };
            let state_for_send = Arc::clone(&state);
            tokio::spawn(async move {
                if let Err(e) = state_for_send.router.send_stream(&chat_req, tx).await {
                    warn!(error = %e, "provider stream failed");
                }
            });

            let stream = provider_sse_stream(
                Arc::clone(&state),
                user_id,
                req.thread_id,
                intent,
                missing,
                model,
                rx,
            );
            Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response())
        }
    }
}

fn spawn_ingest_post(state: &Arc<AppState>, event: IngestEventRequest) {
    let client = state.memory_client.clone();
    tokio::spawn(async move {
        if let Err(e) = client.post_ingest_event(&event).await {
            warn!(error = %e, "ingest event post failed");
        }
    });
}

fn persist_assistant_reply(state: &Arc<AppState>, user_id: &str, thread_id: &str, reply: &str) {
    if let Err(e) = state.messages.append(user_id, thread_id, "assistant", reply) {
        warn!(error = %e, "failed to persist assistant reply");
    }
}

fn last_n(history: &[Message], n: usize) -> Vec<String> {
    history.iter().rev().take(n).rev().map(|m| m.content.clone()).collect()
}

fn meta_event(intent: Intent, missing: &MissingInputs, model: &str) -> Event {
    Event::default().event("meta").data(
        json!({
            "intent": format!("{:?}", intent),
            "missing": {
                "recall": missing.recall,
                "summaries": missing.summaries,
                "profile": missing.profile,
                "research": missing.research,
            },
            "model": model,
        })
        .to_string(),
    )
}

/// A fully-composed, non-streamed reply (memory_save confirmations and
/// web-search compositions) delivered as a minimal `meta` → `delta` →
/// `done` sequence so both intents share the client's SSE contract.
fn fixed_reply_sse(
    intent: Intent,
    missing: MissingInputs,
    model: String,
    reply: String,
) -> Sse<impl futures_util::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let stream = async_stream::stream! {
        yield Ok(meta_event(intent, &missing, &model));
        yield Ok(Event::default().event("delta").data(json!({ "text": reply }).to_string()));
        yield Ok(Event::default().event("done").data(
            json!({ "model": model, "tokens_in": 0, "tokens_out": 0 }).to_string(),
        ));
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// The genuine streaming path: forwards provider `StreamEvent`s as `delta`
/// events while concurrently polling the cache bus for a research capsule
/// published by a prior turn's Memory.Research job.
fn provider_sse_stream(
    state: Arc<AppState>,
    user_id: String,
    thread_id: String,
    intent: Intent,
    missing: MissingInputs,
    model: String,
    mut rx: mpsc::Receiver<StreamEvent>,
) -> impl futures_util::Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        yield Ok(meta_event(intent, &missing, &model));

        let (first_tx, first_rx) = watch::channel(false);
        let capsule_handle = if state.config.context.feature_research_injection {
            Some(tokio::spawn(poll_for_latest_capsule(Arc::clone(&state.bus), thread_id.clone(), first_rx)))
        } else {
            None
        };

        let mut accumulated = String::new();
        let mut sent_first = false;

        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::TextDelta { text } => {
                    if !sent_first {
                        sent_first = true;
                        let _ = first_tx.send(true);
                    }
                    accumulated.push_str(&text);
                    yield Ok(Event::default().event("delta").data(json!({ "text": text }).to_string()));
                }
                StreamEvent::Done { model: resp_model, tokens_in, tokens_out, .. } => {
                    persist_assistant_reply(&state, &user_id, &thread_id, &accumulated);
                    spawn_ingest_post(&state, IngestEventRequest {
                        user_id: user_id.clone(),
                        thread_id: thread_id.clone(),
                        role: "assistant".to_string(),
                        content: accumulated.clone(),
                    });

                    if let Some(handle) = capsule_handle {
                        if let Ok(Some(capsule)) = handle.await {
                            yield Ok(Event::default().event("research_capsule").data(
                                json!({
                                    "topic": capsule.topic,
                                    "claims": capsule.claims,
                                    "sources": capsule.sources,
                                    "confidence": capsule.confidence,
                                })
                                .to_string(),
                            ));
                        }
                    }

                    yield Ok(Event::default().event("done").data(
                        json!({ "model": resp_model, "tokens_in": tokens_in, "tokens_out": tokens_out }).to_string(),
                    ));
                    return;
                }
                StreamEvent::Error { message } => {
                    yield Ok(Event::default().event("error").data(json!({ "error": message }).to_string()));
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_nonempty_attachment_array_counts_as_image() {
        let msg = WireMessage {
            role: "user".to_string(),
            content: "what's in this picture?".to_string(),
            attachments: Some(serde_json::json!([{"url": "https://example.com/a.png"}])),
        };
        assert!(msg.has_image_attachment());
    }

    #[test]
    fn typed_non_image_attachment_does_not_count() {
        let msg = WireMessage {
            role: "user".to_string(),
            content: "here's a doc".to_string(),
            attachments: Some(serde_json::json!([{"type": "file", "url": "https://example.com/a.pdf"}])),
        };
        assert!(!msg.has_image_attachment());
    }

    #[test]
    fn no_attachments_does_not_count() {
        let msg = WireMessage { role: "user".to_string(), content: "hi".to_string(), attachments: None };
        assert!(!msg.has_image_attachment());
    }

    #[test]
    fn empty_attachment_array_does_not_count() {
        let msg = WireMessage {
            role: "user".to_string(),
            content: "hi".to_string(),
            attachments: Some(serde_json::json!([])),
        };
        assert!(!msg.has_image_attachment());
    }
}
