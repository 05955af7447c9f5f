use std::sync::OnceLock;

use regex::Regex;

use crate::provider::{ChatRequest, LlmProvider, Message, ProviderError, Role};

/// Query intent classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    MemorySave,
    NeedsWebSearch,
    ConversationalFollowup,
    SimpleMath,
    ComplexReasoning,
    Factual,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

fn memory_save_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:can you |could you |please )?(remember|save|store|memorize|keep|note)\s+(this|that|it|my|i|me|for me|['\x22]|\w+)",
        )
        .unwrap()
    })
}

/// Conversation-management phrasings that must never be confused for a
/// memory-save trigger — they talk *about* a prior save, they don't ask
/// for a new one.
const SAVE_EXCLUSIONS: &[&str] = &["did you remember", "do you remember", "what did you remember"];

/// Detects the `memory_save` intent, prioritized ahead of memory-list/recall
/// phrasings to avoid misrouting "remember …" into a read path.
pub fn is_memory_save(content: &str) -> bool {
    let lower = content.to_lowercase();
    if SAVE_EXCLUSIONS.iter().any(|ex| lower.contains(ex)) {
        return false;
    }
    memory_save_re().is_match(content.trim())
}

/// Phrasings that look like they could trigger search but are actually
/// conversation management or a memory save — excluded from
/// `needs_web_search`.
const WEB_SEARCH_EXCLUSIONS: &[&str] = &[
    "rewrite",
    "make it more detailed",
    "store this as my preference",
    "did you remember",
];

fn web_search_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(search|look up|google|find out|what's happening|latest news|current|today's)\b").unwrap()
    })
}

/// Detects the `needs_web_search` intent, explicitly excluding memory-save
/// and conversation-management phrasings.
pub fn needs_web_search(content: &str) -> bool {
    if is_memory_save(content) {
        return false;
    }
    let lower = content.to_lowercase();
    if WEB_SEARCH_EXCLUSIONS.iter().any(|ex| lower.contains(ex)) {
        return false;
    }
    web_search_re().is_match(content)
}

fn simple_math_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*-?\d+(\.\d+)?\s*[-+*/xX]\s*-?\d+(\.\d+)?\s*[=?]?\s*$").unwrap())
}

const FOLLOWUP_CUES: &[&str] = &[
    "what about",
    "and",
    "also",
    "what else",
    "tell me more",
    "continue",
    "go on",
];

const COMPLEX_CUES: &[&str] = &[
    "explain why",
    "compare",
    "trade-off",
    "tradeoff",
    "design",
    "architecture",
    "analyze",
    "step by step",
];

const FACTUAL_CUES: &[&str] = &["what is", "who is", "when did", "where is", "how many", "define"];

/// Rule-grammar classification. Returns
/// `Intent::Other` when no rule matches, signaling the caller to fall back
/// to a lightweight LLM classification on ambiguity.
pub fn classify(content: &str, history_len: usize) -> (Intent, Complexity) {
    let trimmed = content.trim();
    let lower = trimmed.to_lowercase();

    if is_memory_save(trimmed) {
        return (Intent::MemorySave, Complexity::Simple);
    }
    if simple_math_re().is_match(trimmed) {
        return (Intent::SimpleMath, Complexity::Simple);
    }
    if needs_web_search(trimmed) {
        return (Intent::NeedsWebSearch, Complexity::Moderate);
    }

    let complexity = if COMPLEX_CUES.iter().any(|c| lower.contains(c)) || trimmed.len() > 400 {
        Complexity::Complex
    } else if FACTUAL_CUES.iter().any(|c| lower.starts_with(c)) {
        Complexity::Simple
    } else {
        Complexity::Moderate
    };

    if COMPLEX_CUES.iter().any(|c| lower.contains(c)) {
        return (Intent::ComplexReasoning, complexity);
    }
    if FACTUAL_CUES.iter().any(|c| lower.starts_with(c)) {
        return (Intent::Factual, complexity);
    }
    if history_len > 0 && FOLLOWUP_CUES.iter().any(|c| lower.starts_with(c)) {
        return (Intent::ConversationalFollowup, complexity);
    }

    (Intent::Other, complexity)
}

/// Lightweight LLM fallback for ambiguous (`Intent::Other`) classifications.
/// Parses the first recognized label word from the reply; any unrecognized
/// reply keeps the intent as `Other` rather than guessing.
pub async fn classify_with_fallback(
    provider: &dyn LlmProvider,
    model: &str,
    content: &str,
    history_len: usize,
) -> (Intent, Complexity) {
    let (intent, complexity) = classify(content, history_len);
    if intent != Intent::Other {
        return (intent, complexity);
    }

    let req = ChatRequest {
        model: model.to_string(),
        system: "Classify the user's message into exactly one label: memory_save, needs_web_search, \
                 conversational_followup, simple_math, complex_reasoning, factual, other. \
                 Reply with only the label."
            .to_string(),
        messages: vec![Message { role: Role::User, content: content.to_string() }],
        max_tokens: 8,
        stream: false,
    };

    match provider.send(&req).await {
        Ok(resp) => (parse_label(&resp.content), complexity),
        Err(_) => (Intent::Other, complexity),
    }
}

fn parse_label(text: &str) -> Intent {
    match text.trim().to_lowercase().as_str() {
        "memory_save" => Intent::MemorySave,
        "needs_web_search" => Intent::NeedsWebSearch,
        "conversational_followup" => Intent::ConversationalFollowup,
        "simple_math" => Intent::SimpleMath,
        "complex_reasoning" => Intent::ComplexReasoning,
        "factual" => Intent::Factual,
        _ => Intent::Other,
    }
}

/// Response-length hint derived from (intent, complexity).
pub fn response_length_hint(intent: Intent, _complexity: Complexity) -> Option<u32> {
    match intent {
        Intent::SimpleMath => Some(10),
        Intent::ConversationalFollowup => Some(200),
        _ => None,
    }
}

const CORRECTION_CUES: &[&str] = &["no,", "no ", "wrong", "actually", "rewrite", "i meant"];

/// Detects a correction cue at the start of the message.
pub fn is_correction(content: &str) -> bool {
    let lower = content.trim().to_lowercase();
    CORRECTION_CUES.iter().any(|cue| lower.starts_with(cue))
}

/// Extracts the content to save for a `memory_save` intent. `recent_assistant_messages` is ordered
/// oldest-first.
pub fn extract_save_content(content: &str, recent_assistant_messages: &[String]) -> String {
    let trimmed = content.trim();

    // (b) quoted content.
    if let Some(quoted) = extract_quoted(trimmed) {
        return quoted;
    }

    // (c) "remember that my X is Y" / "remember my X is Y".
    if let Some(captured) = extract_my_clause(trimmed) {
        return captured;
    }

    // (d) "X — remember that for me": content before the remember clause.
    if let Some(before) = extract_before_remember_clause(trimmed) {
        return before;
    }

    // (e) "remember that idea you gave me earlier about X".
    if let Some(topic) = extract_about_topic(trimmed) {
        if let Some(found) = recent_assistant_messages
            .iter()
            .rev()
            .find(|m| m.to_lowercase().contains(&topic))
        {
            return found.clone();
        }
        if let Some(last) = recent_assistant_messages.last() {
            return last.clone();
        }
    }

    // (a) bare "remember this/that/it" with no object: most recent assistant message.
    if is_bare_object_reference(trimmed) {
        if let Some(last) = recent_assistant_messages.last() {
            return last.clone();
        }
    }

    // (f) fallback: strip the request phrase and use what remains.
    strip_request_phrase(trimmed)
}

fn extract_quoted(content: &str) -> Option<String> {
    let double = extract_between(content, '"', '"');
    let single = extract_between(content, '\'', '\'');
    match (double, single) {
        (Some(d), _) if !d.is_empty() => Some(d),
        (_, Some(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

fn extract_between(content: &str, open: char, close: char) -> Option<String> {
    let start = content.find(open)?;
    let rest = &content[start + 1..];
    let end = rest.find(close)?;
    Some(rest[..end].to_string())
}

fn my_clause_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(my\s+[\w\s]+?\s+is\s+[\w\s.,!?'-]+)").unwrap())
}

fn extract_my_clause(content: &str) -> Option<String> {
    my_clause_re()
        .captures(content)
        .map(|c| c[1].trim().trim_end_matches(['.', '!', '?']).to_string())
}

fn before_remember_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(.*?)\s*[-\u{2014}]\s*remember\s+(this|that|it)\s+for\s+me").unwrap())
}

fn extract_before_remember_clause(content: &str) -> Option<String> {
    before_remember_re()
        .captures(content)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

fn about_topic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)remember\s+(?:that\s+)?idea\s+you\s+gave\s+me\s+(?:earlier\s+)?about\s+(.+)").unwrap())
}

fn extract_about_topic(content: &str) -> Option<String> {
    about_topic_re()
        .captures(content)
        .map(|c| c[1].trim().trim_end_matches(['.', '!', '?']).to_lowercase())
}

fn bare_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:can you |could you |please )?(remember|save|store|memorize|keep|note)\s+(this|that|it)\s*[.!?]?\s*$")
            .unwrap()
    })
}

fn is_bare_object_reference(content: &str) -> bool {
    bare_object_re().is_match(content)
}

fn strip_request_phrase(content: &str) -> String {
    let stripped = memory_save_re().replace(content, "");
    stripped.trim().trim_start_matches("that").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_save_matches_core_verbs() {
        assert!(is_memory_save("remember that my favorite color is blue"));
        assert!(is_memory_save("can you save this for me"));
        assert!(!is_memory_save("did you remember my birthday?"));
    }

    #[test]
    fn web_search_excludes_memory_save_phrasing() {
        assert!(!needs_web_search("can you remember the latest news"));
        assert!(needs_web_search("what's happening in rust today"));
        assert!(!needs_web_search("rewrite it and make it more detailed"));
    }

    #[test]
    fn simple_math_classified_correctly() {
        let (intent, complexity) = classify("12 + 7", 0);
        assert_eq!(intent, Intent::SimpleMath);
        assert_eq!(complexity, Complexity::Simple);
    }

    #[test]
    fn response_length_hint_caps_simple_math() {
        assert_eq!(response_length_hint(Intent::SimpleMath, Complexity::Simple), Some(10));
        assert_eq!(response_length_hint(Intent::Factual, Complexity::Simple), None);
    }

    #[test]
    fn correction_cue_detected_at_start() {
        assert!(is_correction("no, that's wrong, I meant Tuesday"));
        assert!(!is_correction("that sounds right"));
    }

    #[test]
    fn extract_my_clause_case_c() {
        let extracted = extract_save_content("remember that my favorite color is blue", &[]);
        assert_eq!(extracted, "my favorite color is blue");
    }

    #[test]
    fn extract_quoted_case_b() {
        let extracted = extract_save_content(r#"remember "call the dentist tomorrow""#, &[]);
        assert_eq!(extracted, "call the dentist tomorrow");
    }

    #[test]
    fn extract_bare_object_falls_back_to_last_assistant_message() {
        let history = vec!["you should try the new cafe downtown".to_string()];
        let extracted = extract_save_content("remember that", &history);
        assert_eq!(extracted, "you should try the new cafe downtown");
    }

    #[test]
    fn extract_before_remember_clause_case_d() {
        let extracted = extract_save_content("pick up milk and eggs - remember this for me", &[]);
        assert_eq!(extracted, "pick up milk and eggs");
    }
}
