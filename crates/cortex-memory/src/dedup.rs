use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Lowercase, punctuation-stripped token set, used by both the Jaccard
/// overlap check below and the query-preprocessing step in recall.rs.
fn tokenize(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_string())
        .collect()
}

/// Jaccard similarity of the two strings' token sets, in [0, 1].
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Length similarity in [0, 1] — 1.0 when the two strings are the same
/// length, decaying toward 0 as the longer grows relative to the shorter.
pub fn length_similarity(a: &str, b: &str) -> f64 {
    let la = a.chars().count() as f64;
    let lb = b.chars().count() as f64;
    if la == 0.0 && lb == 0.0 {
        return 1.0;
    }
    let longer = la.max(lb);
    let shorter = la.min(lb);
    if longer == 0.0 {
        0.0
    } else {
        shorter / longer
    }
}

fn topic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:my\s+(?P<subject1>[\w\s]+?)\s+is\s+|i\s+prefer\s+(?P<subject2>[\w\s]+?)\s+over\s+)")
            .unwrap()
    })
}

/// Small regex grammar for "my X is Y" / "I prefer X over Y" — an O(1) fast
/// path for topic detection. Returns the normalized subject `X` when the
/// content matches one of the curated shapes, else `None`.
pub fn extract_topic(content: &str) -> Option<String> {
    let caps = topic_re().captures(content.trim())?;
    let subject = caps
        .name("subject1")
        .or_else(|| caps.name("subject2"))?
        .as_str();
    Some(subject.trim().to_lowercase())
}

/// Near-duplicate test used by both the explicit-save and audit supersede
/// paths: a similarity score at or above the supersede threshold for the
/// same user is treated as an update to the existing memory rather than a
/// new one. Topic match is the fast path; Jaccard/length similarity is the
/// fallback. Two contents whose regex-detected topics agree are treated
/// as a match outright; otherwise fall back to the weighted blend.
pub fn similarity(a: &str, b: &str) -> f64 {
    if let (Some(ta), Some(tb)) = (extract_topic(a), extract_topic(b)) {
        if ta == tb {
            return 1.0;
        }
    }
    0.7 * jaccard_similarity(a, b) + 0.3 * length_similarity(a, b)
}

/// Threshold above which an incoming save supersedes an existing memory
/// instead of creating a new row.
pub const SUPERSEDE_THRESHOLD: f64 = 0.75;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_are_fully_similar() {
        assert_eq!(similarity("my favorite color is blue", "my favorite color is blue"), 1.0);
    }

    #[test]
    fn near_duplicate_crosses_supersede_threshold() {
        let s = similarity("my favorite color is blue", "my favorite color is red");
        assert!(s >= SUPERSEDE_THRESHOLD, "expected >= {SUPERSEDE_THRESHOLD}, got {s}");
    }

    #[test]
    fn unrelated_strings_stay_below_threshold() {
        let s = similarity("my favorite color is blue", "I work as a backend engineer");
        assert!(s < SUPERSEDE_THRESHOLD, "expected < {SUPERSEDE_THRESHOLD}, got {s}");
    }

    #[test]
    fn topic_fast_path_matches_same_subject() {
        assert_eq!(extract_topic("my favorite color is blue"), Some("favorite color".to_string()));
        assert_eq!(
            similarity("my favorite color is blue", "my favorite color is red"),
            1.0
        );
    }

    #[test]
    fn topic_fast_path_ignores_unrelated_subjects() {
        assert_ne!(extract_topic("my favorite color is blue"), extract_topic("my job title is engineer"));
    }
}
