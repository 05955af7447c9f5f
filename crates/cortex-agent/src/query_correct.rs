use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::provider::{ChatRequest, LlmProvider, Message, Role};

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{4}\b").unwrap())
}

fn years_in(s: &str) -> Vec<&str> {
    year_re().find_iter(s).map(|m| m.as_str()).collect()
}

/// LLM-based typo/anaphora corrector invoked before search/routing.
/// `context` is the last few turns of
/// conversation, supplied so phrasings like "which one is most critical"
/// resolve against the prior assistant message instead of being corrected
/// in isolation.
///
/// Critical invariant: no four-digit year present in the input is
/// ever altered. Rather than trust the model's instruction-following, this
/// is enforced with a safety net — if the corrected query drops or changes
/// any year that appeared in the original, the correction is discarded and
/// the original query is returned unmodified.
pub async fn correct_query(
    provider: &dyn LlmProvider,
    model: &str,
    query: &str,
    context: &[String],
) -> String {
    let context_block = if context.is_empty() {
        String::new()
    } else {
        format!("\n\nRecent conversation:\n{}", context.join("\n"))
    };

    let system = format!(
        "Rewrite the user's search query to fix typos and resolve pronouns/references \
         against the conversation below into a standalone query. Never alter, remove, or \
         add any four-digit year or other number. Reply with only the corrected query, \
         nothing else.{context_block}"
    );

    let req = ChatRequest {
        model: model.to_string(),
        system,
        messages: vec![Message {
            role: Role::User,
            content: query.to_string(),
        }],
        max_tokens: 64,
        stream: false,
    };

    let corrected = match provider.send(&req).await {
        Ok(resp) => resp.content.trim().to_string(),
        Err(e) => {
            warn!(error = %e, "query corrector failed, using raw query");
            return query.to_string();
        }
    };

    if corrected.is_empty() {
        return query.to_string();
    }

    let original_years = years_in(query);
    let corrected_years = years_in(&corrected);
    if original_years.iter().any(|y| !corrected_years.contains(y)) {
        warn!(query = %query, "query corrector dropped/altered a year, reverting");
        return query.to_string();
    }

    corrected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatResponse, ProviderError};
    use async_trait::async_trait;

    struct FakeProvider(String);

    #[async_trait]
    impl LlmProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: self.0.clone(),
                model: "fake-model".to_string(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "stop".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn passes_through_a_sane_correction() {
        let provider = FakeProvider("latest react features in 2025".to_string());
        let corrected = correct_query(&provider, "m", "latest reactt features in 2025", &[]).await;
        assert_eq!(corrected, "latest react features in 2025");
    }

    #[tokio::test]
    async fn reverts_when_a_year_is_altered() {
        let provider = FakeProvider("latest react features in 2020".to_string());
        let corrected = correct_query(&provider, "m", "latest react features in 2025", &[]).await;
        assert_eq!(corrected, "latest react features in 2025");
    }

    #[tokio::test]
    async fn reverts_when_a_year_is_dropped() {
        let provider = FakeProvider("latest react features".to_string());
        let corrected = correct_query(&provider, "m", "latest react features in 2025", &[]).await;
        assert_eq!(corrected, "latest react features in 2025");
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_raw_query() {
        struct AlwaysFail;
        #[async_trait]
        impl LlmProvider for AlwaysFail {
            fn name(&self) -> &str {
                "always-fail"
            }
            async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
                Err(ProviderError::Unavailable("down".to_string()))
            }
        }
        let corrected = correct_query(&AlwaysFail, "m", "favorite color", &[]).await;
        assert_eq!(corrected, "favorite color");
    }
}
