use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ResearchError;
use crate::types::{RecencyHint, SearchResult};

/// Narrow plug-in boundary for the primary/secondary search backends.
/// Web-search API clients are treated as an external collaborator — this
/// crate depends only on this trait, never a per-vendor SDK.
#[async_trait]
pub trait ResearchFetcher: Send + Sync {
    async fn search(
        &self,
        query: &str,
        freshness: RecencyHint,
    ) -> Result<Vec<SearchResult>, ResearchError>;
}

/// One concrete generic HTTP JSON search client, shaped after Tavily's
/// `/search` API (the same shape the config defaults to in
/// `cortex-core::config::ResearchConfig`). Works against any backend that
/// accepts `{query, api_key, topic, days}` and returns `{results: [...]}`.
pub struct HttpSearchClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl HttpSearchClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }

    fn days_for(freshness: RecencyHint) -> u32 {
        match freshness {
            RecencyHint::Day => 1,
            RecencyHint::Week => 7,
            RecencyHint::Month => 30,
        }
    }
}

#[async_trait]
impl ResearchFetcher for HttpSearchClient {
    async fn search(
        &self,
        query: &str,
        freshness: RecencyHint,
    ) -> Result<Vec<SearchResult>, ResearchError> {
        let url = format!("{}/search", self.base_url);
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "days": Self::days_for(freshness),
            "max_results": 8,
        });

        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Ok(Vec::new());
        }

        let parsed: ApiResponse = match resp.json().await {
            Ok(p) => p,
            Err(_) => return Ok(Vec::new()),
        };

        Ok(parsed
            .results
            .into_iter()
            .filter_map(|r| {
                let host = host_from_url(&r.url)?;
                Some(SearchResult {
                    host,
                    date: r.published_date.unwrap_or_default(),
                    title: r.title,
                    snippet: r.content.unwrap_or_default(),
                })
            })
            .collect())
    }
}

fn host_from_url(url: &str) -> Option<String> {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let host = without_scheme.split('/').next()?;
    Some(host.trim_start_matches("www.").to_string())
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    results: Vec<ApiResult>,
}

#[derive(Deserialize)]
struct ApiResult {
    title: String,
    url: String,
    content: Option<String>,
    published_date: Option<String>,
}

/// A secondary news-only backend, used as the fallback when the primary
/// fetch fails or returns empty. Same shape, different base URL —
/// kept as a distinct type so callers can tell which backend served a hit
/// if that ever matters for observability.
pub struct SecondaryNewsClient {
    inner: HttpSearchClient,
}

impl SecondaryNewsClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            inner: HttpSearchClient::new(api_key, base_url),
        }
    }
}

#[async_trait]
impl ResearchFetcher for SecondaryNewsClient {
    async fn search(
        &self,
        query: &str,
        freshness: RecencyHint,
    ) -> Result<Vec<SearchResult>, ResearchError> {
        self.inner.search(query, freshness).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_from_url_strips_scheme_and_www() {
        assert_eq!(
            host_from_url("https://www.example.com/a/b"),
            Some("example.com".to_string())
        );
        assert_eq!(host_from_url("http://news.ycombinator.com"), Some("news.ycombinator.com".to_string()));
    }
}
