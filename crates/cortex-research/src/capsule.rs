use crate::types::{
    Confidence, ResearchCapsule, SearchResult, Source, MAX_CAPSULE_BYTES, MAX_CLAIMS,
    MAX_CLAIM_CHARS, MAX_SOURCES,
};
use crate::types::{RecencyHint, TtlClass};

/// Turn a reranked result list into claims: the title (truncated to
/// `MAX_CLAIM_CHARS`) of each of the top results, one claim per distinct
/// host so a single dominant source can't fill the whole capsule.
fn claims_from_results(ranked: &[(SearchResult, f64)]) -> Vec<String> {
    let mut claims = Vec::new();
    let mut seen_hosts = std::collections::HashSet::new();
    for (result, _score) in ranked {
        if !seen_hosts.insert(result.host.clone()) {
            continue;
        }
        let claim = truncate_chars(&result.title, MAX_CLAIM_CHARS);
        if !claim.is_empty() {
            claims.push(claim);
        }
        if claims.len() >= MAX_CLAIMS {
            break;
        }
    }
    claims
}

fn sources_from_results(ranked: &[(SearchResult, f64)]) -> Vec<Source> {
    let mut sources = Vec::new();
    let mut seen_hosts = std::collections::HashSet::new();
    for (result, _score) in ranked {
        if !seen_hosts.insert(result.host.clone()) {
            continue;
        }
        sources.push(Source {
            host: result.host.clone(),
            date: result.date.clone(),
        });
        if sources.len() >= MAX_SOURCES {
            break;
        }
    }
    sources
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Compose the final capsule. Confidence is `High` iff
/// at least 2 distinct hosts corroborate, else `Med`. Enforces the 4 KB hard
/// cap by dropping the lowest-ranked claim/source first (ranked results are
/// already sorted best-first, so we always drop from the tail).
pub fn compose_capsule(
    batch_id: &str,
    topic: &str,
    ttl_class: TtlClass,
    recency_hint: RecencyHint,
    ranked: &[(SearchResult, f64)],
) -> Option<ResearchCapsule> {
    let mut claims = claims_from_results(ranked);
    let mut sources = sources_from_results(ranked);
    if claims.is_empty() || sources.is_empty() {
        return None;
    }

    let distinct_hosts: std::collections::HashSet<&str> =
        sources.iter().map(|s| s.host.as_str()).collect();
    let confidence = if distinct_hosts.len() >= 2 {
        Confidence::High
    } else {
        Confidence::Med
    };

    let mut capsule = ResearchCapsule {
        batch_id: batch_id.to_string(),
        topic: topic.to_string(),
        ttl_class,
        recency_hint,
        claims: claims.clone(),
        sources: sources.clone(),
        confidence,
    };

    while serialized_size(&capsule) > MAX_CAPSULE_BYTES {
        if claims.len() > sources.len() && claims.pop().is_some() {
            capsule.claims = claims.clone();
        } else if sources.pop().is_some() {
            capsule.sources = sources.clone();
        } else {
            break;
        }
    }

    Some(capsule)
}

fn serialized_size(capsule: &ResearchCapsule) -> usize {
    serde_json::to_vec(capsule).map(|v| v.len()).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(host: &str, title: &str, date: &str) -> SearchResult {
        SearchResult {
            host: host.to_string(),
            date: date.to_string(),
            title: title.to_string(),
            snippet: String::new(),
        }
    }

    #[test]
    fn two_distinct_hosts_yields_high_confidence() {
        let ranked = vec![
            (result("a.com", "claim one", "2026-01-01"), 1.0),
            (result("b.com", "claim two", "2026-01-02"), 0.9),
        ];
        let capsule =
            compose_capsule("b1", "rust releases", TtlClass::Releases, RecencyHint::Week, &ranked)
                .unwrap();
        assert_eq!(capsule.confidence, Confidence::High);
    }

    #[test]
    fn single_host_yields_medium_confidence() {
        let ranked = vec![(result("a.com", "claim one", "2026-01-01"), 1.0)];
        let capsule =
            compose_capsule("b1", "rust releases", TtlClass::Releases, RecencyHint::Week, &ranked)
                .unwrap();
        assert_eq!(capsule.confidence, Confidence::Med);
    }

    #[test]
    fn empty_results_produce_no_capsule() {
        assert!(compose_capsule("b1", "x", TtlClass::General, RecencyHint::Month, &[]).is_none());
    }

    #[test]
    fn never_exceeds_4kb_even_with_many_results() {
        let ranked: Vec<(SearchResult, f64)> = (0..20)
            .map(|i| (result(&format!("host{i}.com"), &"x".repeat(500), "2026-01-01"), 1.0))
            .collect();
        let capsule =
            compose_capsule("b1", "topic", TtlClass::General, RecencyHint::Month, &ranked).unwrap();
        assert!(serialized_size(&capsule) <= MAX_CAPSULE_BYTES);
    }
}
