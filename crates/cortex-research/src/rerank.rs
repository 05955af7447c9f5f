use crate::types::SearchResult;

/// Small curated set of hosts treated as higher-authority for general topics.
/// Not exhaustive — a stand-in for a real host-authority signal.
const HIGH_AUTHORITY_HOSTS: &[&str] = &[
    "github.com",
    "docs.rs",
    "developer.mozilla.org",
    "arxiv.org",
    "reuters.com",
    "apnews.com",
];

fn host_authority(host: &str) -> f64 {
    if HIGH_AUTHORITY_HOSTS.contains(&host) {
        1.0
    } else {
        0.6
    }
}

/// Freshness score from the result's reported date: recent reports are
/// boosted, older or missing dates fall back to a neutral score rather than
/// zero (an unparseable date shouldn't disqualify an otherwise good hit).
fn freshness_score(date: &str) -> f64 {
    match chrono::DateTime::parse_from_rfc3339(date)
        .map(|d| d.with_timezone(&chrono::Utc))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap().and_utc())
        }) {
        Ok(dt) => {
            let age_days = (chrono::Utc::now() - dt).num_days().max(0) as f64;
            (1.0 - age_days / 30.0).clamp(0.1, 1.0)
        }
        Err(_) => 0.5,
    }
}

/// Cheap topical-match: fraction of query keywords present in title+snippet.
fn topical_match(result: &SearchResult, query_keywords: &[String]) -> f64 {
    if query_keywords.is_empty() {
        return 0.5;
    }
    let haystack = format!("{} {}", result.title, result.snippet).to_lowercase();
    let hits = query_keywords
        .iter()
        .filter(|k| haystack.contains(k.as_str()))
        .count();
    hits as f64 / query_keywords.len() as f64
}

/// User-affinity bonus, nonzero only when the user's derived profile has a
/// matching stack/domain keyword.
fn user_affinity(result: &SearchResult, profile_keywords: &[String]) -> f64 {
    if profile_keywords.is_empty() {
        return 0.0;
    }
    let haystack = format!("{} {}", result.title, result.snippet).to_lowercase();
    if profile_keywords
        .iter()
        .any(|k| haystack.contains(&k.to_lowercase()))
    {
        0.2
    } else {
        0.0
    }
}

/// Rerank search results by the weighted composite:
/// host-authority × freshness × topical-match × (1 + user-affinity).
/// Highest score first.
pub fn rerank(
    results: Vec<SearchResult>,
    query_keywords: &[String],
    profile_keywords: &[String],
) -> Vec<(SearchResult, f64)> {
    let mut scored: Vec<(SearchResult, f64)> = results
        .into_iter()
        .map(|r| {
            let score = host_authority(&r.host)
                * freshness_score(&r.date)
                * topical_match(&r, query_keywords)
                * (1.0 + user_affinity(&r, profile_keywords));
            (r, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(host: &str, title: &str) -> SearchResult {
        SearchResult {
            host: host.to_string(),
            date: chrono::Utc::now().to_rfc3339(),
            title: title.to_string(),
            snippet: String::new(),
        }
    }

    #[test]
    fn high_authority_host_ranks_above_unknown_host_at_equal_relevance() {
        let results = vec![result("random-blog.example", "rust async"), result("docs.rs", "rust async")];
        let ranked = rerank(results, &["rust".to_string(), "async".to_string()], &[]);
        assert_eq!(ranked[0].0.host, "docs.rs");
    }
}
