use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap())
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\+?\d{1,3}[-.\s]?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b").unwrap())
}

fn ssn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap())
}

fn card_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:\d[ -]?){13,16}\b").unwrap())
}

/// API-key-shaped tokens: provider-prefixed secrets (`sk-…`, `ghp_…`, …) or
/// any bare high-entropy run of 20+ alphanumeric/`_`/`-` characters.
fn apikey_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:(?:sk|pk|ghp|gho|ghs|api)[_-][A-Za-z0-9]{10,}|[A-Za-z0-9_-]{20,})\b").unwrap()
    })
}

/// Redact PII at ingestion. Redaction is irreversible by design — recall only ever sees the redacted content.
///
/// Returns the redacted text and a JSON map of placeholder -> category,
/// stored verbatim in `memories.redaction_map`.
pub fn redact(text: &str) -> (String, Value) {
    let mut redactions = Vec::new();
    let mut out = text.to_string();

    out = replace_all_tagged(&out, email_re(), "EMAIL", &mut redactions);
    out = replace_all_tagged(&out, ssn_re(), "SSN", &mut redactions);
    out = replace_all_tagged(&out, card_re(), "CARD", &mut redactions);
    out = replace_all_tagged(&out, phone_re(), "PHONE", &mut redactions);
    out = replace_all_tagged(&out, apikey_re(), "APIKEY", &mut redactions);

    let map = json!({ "redactions": redactions });
    (out, map)
}

fn replace_all_tagged(text: &str, re: &Regex, label: &str, seen: &mut Vec<String>) -> String {
    let mut count = 0usize;
    let replaced = re.replace_all(text, |_: &regex::Captures| {
        count += 1;
        format!("[REDACTED:{label}]")
    });
    if count > 0 {
        seen.push(label.to_string());
    }
    replaced.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_email() {
        let (out, map) = redact("reach me at jane.doe@example.com for details");
        assert!(!out.contains("jane.doe@example.com"));
        assert!(out.contains("[REDACTED:EMAIL]"));
        assert_eq!(map["redactions"], json!(["EMAIL"]));
    }

    #[test]
    fn leaves_plain_text_untouched() {
        let (out, map) = redact("my favorite color is blue");
        assert_eq!(out, "my favorite color is blue");
        assert_eq!(map["redactions"], json!([] as [String; 0]));
    }

    #[test]
    fn redacts_ssn() {
        let (out, _) = redact("my ssn is 123-45-6789");
        assert!(!out.contains("123-45-6789"));
    }

    #[test]
    fn redacts_api_key_shaped_token() {
        let (out, map) = redact("here's my key sk-abcdef0123456789ghijk use it carefully");
        assert!(!out.contains("sk-abcdef0123456789ghijk"));
        assert!(out.contains("[REDACTED:APIKEY]"));
        assert_eq!(map["redactions"], json!(["APIKEY"]));
    }

    #[test]
    fn redacts_bare_high_entropy_token() {
        let (out, _) = redact("token: 4f8a2c9e7b1d3a6f0c5e8b2d9a1f7c3e");
        assert!(!out.contains("4f8a2c9e7b1d3a6f0c5e8b2d9a1f7c3e"));
    }
}
