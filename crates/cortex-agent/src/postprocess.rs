use std::sync::OnceLock;

use regex::Regex;

use crate::memory_client::WebSearchResponse;
use crate::provider::{ChatRequest, LlmProvider, Message, ProviderError, Role};

fn numeric_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(\.\d+)?").unwrap())
}

/// `simple_math` post-processing: extract the first numeric literal from the
/// accumulated response as the canonical stored answer. The streamed text
/// itself is left as-is.
pub fn extract_first_numeric_literal(text: &str) -> Option<String> {
    numeric_re().find(text).map(|m| m.as_str().to_string())
}

/// For web-search-invoking turns, compose a final response from the
/// retrieved capsule claims/sources plus the last 3 turns of conversation
/// context, so anaphoric follow-ups ("which one is most critical") resolve
/// against the prior assistant message.
pub async fn compose_web_search_response(
    provider: &dyn LlmProvider,
    model: &str,
    query: &str,
    results: &WebSearchResponse,
    last_turns: &[Message],
) -> Result<String, ProviderError> {
    let sources: Vec<String> = results
        .sources
        .iter()
        .map(|s| format!("{} ({})", s.host, s.date))
        .collect();
    let system = format!(
        "Answer the user's query using only the claims and sources below. Resolve any pronouns or \
         references in the query against the conversation history provided. Be concise.\n\nClaims:\n{}\n\nSources: {}",
        results.claims.join("\n"),
        sources.join(", "),
    );

    let mut messages: Vec<Message> = last_turns.to_vec();
    messages.push(Message {
        role: Role::User,
        content: query.to_string(),
    });

    let req = ChatRequest {
        model: model.to_string(),
        system,
        messages,
        max_tokens: 512,
        stream: false,
    };

    let resp = provider.send(&req).await?;
    Ok(resp.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_numeric_literal() {
        assert_eq!(extract_first_numeric_literal("the answer is 42 apples"), Some("42".to_string()));
        assert_eq!(extract_first_numeric_literal("no numbers here"), None);
        assert_eq!(extract_first_numeric_literal("it costs -3.5 units"), Some("-3.5".to_string()));
    }
}
