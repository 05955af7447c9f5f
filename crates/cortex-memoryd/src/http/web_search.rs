use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use cortex_research::{freshness_from_query, Confidence};

use crate::app::AppState;
use crate::error::ApiError;
use crate::http::user_id_from_headers;

#[derive(Debug, Deserialize)]
pub struct WebSearchRequest {
    pub query: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Last <=3 turns of conversation, forwarded so anaphoric follow-ups
    /// ("which one is most critical") can be resolved. The resolution
    /// itself happens where the final answer is composed — the gateway's
    /// `cortex_agent::postprocess::compose_web_search_response`, which
    /// receives these same turns — so this layer only needs to echo them
    /// through the wire contract, not act on them.
    #[serde(default)]
    pub conversation_context: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct WebSearchResponse {
    pub claims: Vec<String>,
    pub sources: Vec<WireSource>,
    pub confidence: String,
}

#[derive(Debug, Serialize)]
pub struct WireSource {
    pub host: String,
    pub date: String,
}

/// `POST /v1/web-search` — direct, uncached search used by the
/// `needs_web_search` intent path. Distinct from Memory.Research's
/// hidden sidecar: no topic-stability gate, no cache-bus publication, and
/// the caller gets claims/sources back synchronously instead of polling.
pub async fn web_search_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<WebSearchRequest>,
) -> Result<Json<WebSearchResponse>, ApiError> {
    let user_id = user_id_from_headers(&headers)?;
    let profile = cortex_memory::profile::load_or_derive(&state.store, &state.bus, &user_id)?;

    let freshness = freshness_from_query(&req.query);
    let results = state.fetcher.search(&req.query, freshness).await?;

    let query_keywords: Vec<String> = req
        .query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .filter(|w| w.len() > 2)
        .collect();
    let ranked = cortex_research::rerank::rerank(
        results,
        &query_keywords,
        &profile.payload.stack_keywords,
    );

    let mut seen_hosts = std::collections::HashSet::new();
    let mut claims = Vec::new();
    let mut sources = Vec::new();
    for (result, _score) in &ranked {
        if !seen_hosts.insert(result.host.clone()) {
            continue;
        }
        claims.push(truncate_chars(&result.title, 160));
        sources.push(WireSource {
            host: result.host.clone(),
            date: result.date.clone(),
        });
        if claims.len() >= 4 {
            break;
        }
    }

    let distinct_hosts = sources.iter().map(|s| &s.host).collect::<std::collections::HashSet<_>>().len();
    let confidence = if distinct_hosts >= 2 { Confidence::High } else { Confidence::Med };

    Ok(Json(WebSearchResponse {
        claims,
        sources,
        confidence: match confidence {
            Confidence::High => "high".to_string(),
            Confidence::Med => "med".to_string(),
        },
    }))
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
