use std::sync::Arc;
use std::time::{Duration, Instant};

use cortex_core::Tier;
use tracing::{instrument, warn};

use crate::error::Result;
use crate::store::MemoryStore;
use crate::types::ScoredMemory;
use crate::vector::{Embedder, VectorIndex};

/// Recall request.
pub struct RecallRequest {
    pub user_id: String,
    pub thread_id: Option<String>,
    pub query: Option<String>,
    pub max_items: usize,
    pub deadline_ms: u64,
}

/// If the fraction of rows present in `memories` but missing from the FTS
/// shadow table exceeds this, rebuild before searching.
const FTS_DRIFT_THRESHOLD: f64 = 0.02;

/// `recall(userId, threadId?, query?, maxItems, deadlineMs) -> memories[]`.
///
/// Bounded by `deadline_ms`: every stage is checked against the remaining
/// budget, and a stage that would overrun it is skipped rather than
/// awaited. `deadlineMs=0` returns immediately with an empty list rather
/// than erroring.
#[instrument(skip(store, vector_index, embedder), fields(user_id = %req.user_id))]
pub fn recall(
    store: &MemoryStore,
    vector_index: &Arc<dyn VectorIndex>,
    embedder: &Arc<dyn Embedder>,
    req: &RecallRequest,
) -> Result<Vec<ScoredMemory>> {
    let start = Instant::now();
    let deadline = Duration::from_millis(req.deadline_ms);

    if remaining(start, deadline).is_zero() {
        return Ok(Vec::new());
    }

    let preprocessed = preprocess_query(req.query.as_deref().unwrap_or(""));

    let keyword_hits = if remaining(start, deadline) > Duration::ZERO {
        keyword_search(store, &req.user_id, &preprocessed, req.max_items * 3)
            .unwrap_or_else(|e| {
                warn!(error = %e, "keyword search failed, continuing without it");
                Vec::new()
            })
    } else {
        Vec::new()
    };

    let semantic_hits = if !preprocessed.keywords.is_empty() && remaining(start, deadline) > Duration::ZERO {
        let embedding = embedder.embed(&preprocessed.normalized);
        vector_index.query_top_k(&embedding, req.max_items * 3)
    } else {
        Vec::new()
    };

    let fused = fuse(store, &req.user_id, &keyword_hits, &semantic_hits, &preprocessed)?;
    let ranked = rank(fused, req.thread_id.as_deref());

    let mut deduped = Vec::with_capacity(req.max_items);
    let mut seen = std::collections::HashSet::new();
    for candidate in ranked {
        if seen.insert(candidate.memory.id.clone()) {
            deduped.push(candidate);
        }
        if deduped.len() >= req.max_items {
            break;
        }
    }

    Ok(deduped)
}

fn remaining(start: Instant, deadline: Duration) -> Duration {
    deadline.checked_sub(start.elapsed()).unwrap_or(Duration::ZERO)
}

pub struct PreprocessedQuery {
    pub normalized: String,
    pub phrases: Vec<String>,
    pub keywords: Vec<String>,
}

const INTERROGATIVE_LEADERS: &[&str] = &[
    "what is my", "what's my", "what are my", "who is my", "where is my", "when is my", "what is",
    "what are", "who is", "where is",
];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "my", "of", "to", "in", "on", "for", "and", "or", "do", "does",
    "i", "you", "it", "that", "this",
];

/// Normalizes contractions/possessives, strips interrogative leaders, and
/// extracts keywords. Resilient by construction: every step operates on
/// plain string ops that cannot panic, so a caller never needs a fallback
/// branch for this function specifically.
pub fn preprocess_query(raw: &str) -> PreprocessedQuery {
    let mut normalized = raw.to_lowercase().replace('\'', "");

    for leader in INTERROGATIVE_LEADERS {
        if let Some(stripped) = normalized.strip_prefix(leader) {
            normalized = stripped.trim().to_string();
            break;
        }
    }

    let keywords: Vec<String> = normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect();

    // Curated-phrase heuristic: adjacent keyword pairs, a cheap stand-in for
    // a real noun-phrase extractor (no NLP dependency in this stack).
    let phrases: Vec<String> = keywords
        .windows(2)
        .map(|pair| format!("{} {}", pair[0], pair[1]))
        .collect();

    PreprocessedQuery {
        normalized,
        phrases,
        keywords,
    }
}

/// Builds an FTS5 MATCH expression: phrases quoted, keywords ORed.
fn fts_query(preprocessed: &PreprocessedQuery) -> String {
    let mut parts: Vec<String> = preprocessed
        .phrases
        .iter()
        .map(|p| format!("\"{}\"", p))
        .collect();
    if !preprocessed.keywords.is_empty() {
        parts.push(format!("({})", preprocessed.keywords.join(" OR ")));
    }
    parts.join(" OR ")
}

fn keyword_search(
    store: &MemoryStore,
    user_id: &str,
    preprocessed: &PreprocessedQuery,
    limit: usize,
) -> Result<Vec<(crate::types::Memory, f64)>> {
    if preprocessed.keywords.is_empty() {
        return Ok(Vec::new());
    }

    let total = store.memory_count(user_id)?;
    let indexed = store.fts_count(user_id)?;
    if total > 0 {
        let drift = (total - indexed).abs() as f64 / total as f64;
        if drift > FTS_DRIFT_THRESHOLD {
            store.rebuild_fts()?;
        }
    }

    let query = fts_query(preprocessed);
    if query.is_empty() {
        return Ok(Vec::new());
    }

    match store.fts_search(user_id, &query, limit) {
        Ok(hits) => Ok(apply_phrase_multiplier(hits, preprocessed)),
        Err(e) => {
            warn!(error = %e, "FTS query failed, falling back to substring match");
            Ok(substring_fallback(store, user_id, preprocessed, limit)?)
        }
    }
}

fn apply_phrase_multiplier(
    hits: Vec<(crate::types::Memory, f64)>,
    preprocessed: &PreprocessedQuery,
) -> Vec<(crate::types::Memory, f64)> {
    hits.into_iter()
        .map(|(m, score)| {
            let lower = m.content.to_lowercase();
            let multiplier = if preprocessed.phrases.iter().any(|p| lower.contains(p.as_str())) {
                2.0
            } else {
                1.0
            };
            (m, score * multiplier)
        })
        .collect()
}

/// Substring fallback ranked by per-term hit counts, used when the FTS path
/// itself errors (corrupt index, etc.) rather than merely drifting.
fn substring_fallback(
    store: &MemoryStore,
    user_id: &str,
    preprocessed: &PreprocessedQuery,
    limit: usize,
) -> Result<Vec<(crate::types::Memory, f64)>> {
    let all = store.list_for_user(user_id)?;
    let mut scored: Vec<(crate::types::Memory, f64)> = all
        .into_iter()
        .filter_map(|m| {
            let lower = m.content.to_lowercase();
            let hits = preprocessed
                .keywords
                .iter()
                .filter(|k| lower.contains(k.as_str()))
                .count();
            if hits > 0 {
                Some((m, hits as f64))
            } else {
                None
            }
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    scored.truncate(limit);
    Ok(scored)
}

fn fuse(
    store: &MemoryStore,
    user_id: &str,
    keyword_hits: &[(crate::types::Memory, f64)],
    semantic_hits: &[(String, f32)],
    preprocessed: &PreprocessedQuery,
) -> Result<Vec<ScoredMemory>> {
    let max_kw = keyword_hits.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
    let mut by_id: std::collections::HashMap<String, ScoredMemory> = std::collections::HashMap::new();

    for (memory, raw_score) in keyword_hits {
        let normalized = if max_kw > 0.0 { raw_score / max_kw } else { 0.0 };
        by_id.insert(
            memory.id.clone(),
            ScoredMemory {
                memory: memory.clone(),
                keyword_score: normalized,
                semantic_score: 0.0,
                composite_score: 0.0,
            },
        );
    }

    for (id, cosine) in semantic_hits {
        if let Some(entry) = by_id.get_mut(id) {
            entry.semantic_score = *cosine as f64;
        } else if let Some(memory) = store.get(id)? {
            by_id.insert(
                id.clone(),
                ScoredMemory {
                    memory,
                    keyword_score: 0.0,
                    semantic_score: *cosine as f64,
                    composite_score: 0.0,
                },
            );
        }
    }

    // If neither path found anything and no query was given, surface TIER1
    // memories unconditionally so explicit saves are never invisible.
    if by_id.is_empty() && preprocessed.keywords.is_empty() {
        for memory in store.list_for_user(user_id)? {
            if memory.tier == Tier::Tier1 {
                by_id.insert(
                    memory.id.clone(),
                    ScoredMemory {
                        memory,
                        keyword_score: 0.0,
                        semantic_score: 0.0,
                        composite_score: 0.0,
                    },
                );
            }
        }
    }

    for entry in by_id.values_mut() {
        entry.composite_score = match (entry.keyword_score > 0.0, entry.semantic_score > 0.0) {
            (true, true) => 0.4 * entry.keyword_score + 0.6 * entry.semantic_score,
            (true, false) => entry.keyword_score,
            (false, true) => entry.semantic_score,
            (false, false) => 0.0,
        };
    }

    Ok(by_id.into_values().collect())
}

/// Ordered-priority comparator: same-thread, recency, timestamp,
/// relevance, tier, priority — each level breaks ties of the previous.
/// TIER1 memories are promoted to the head regardless of relevance.
fn rank(mut candidates: Vec<ScoredMemory>, thread_id: Option<&str>) -> Vec<ScoredMemory> {
    let now = chrono::Utc::now().timestamp_millis();
    let day_ms = 24 * 60 * 60 * 1000;

    candidates.sort_by(|a, b| {
        let a_tier1 = a.memory.tier == Tier::Tier1;
        let b_tier1 = b.memory.tier == Tier::Tier1;
        if a_tier1 != b_tier1 {
            return b_tier1.cmp(&a_tier1);
        }

        if let Some(tid) = thread_id {
            let a_same = a.memory.thread_id.as_deref() == Some(tid);
            let b_same = b.memory.thread_id.as_deref() == Some(tid);
            if a_same != b_same {
                return b_same.cmp(&a_same);
            }
        }

        let a_recent = now - a.memory.updated_at < day_ms;
        let b_recent = now - b.memory.updated_at < day_ms;
        if a_recent != b_recent {
            return b_recent.cmp(&a_recent);
        }

        if a.memory.updated_at != b.memory.updated_at {
            return b.memory.updated_at.cmp(&a.memory.updated_at);
        }

        if (a.composite_score - b.composite_score).abs() > f64::EPSILON {
            return b
                .composite_score
                .partial_cmp(&a.composite_score)
                .unwrap_or(std::cmp::Ordering::Equal);
        }

        if a.memory.tier != b.memory.tier {
            return tier_rank(&a.memory.tier).cmp(&tier_rank(&b.memory.tier));
        }

        b.memory
            .priority
            .partial_cmp(&a.memory.priority)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    candidates
}

fn tier_rank(tier: &Tier) -> u8 {
    match tier {
        Tier::Tier1 => 0,
        Tier::Tier2 => 1,
        Tier::Tier3 => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{BruteForceIndex, HashEmbedder};

    fn harness() -> (MemoryStore, Arc<dyn VectorIndex>, Arc<dyn Embedder>) {
        (
            MemoryStore::open_in_memory().unwrap(),
            Arc::new(BruteForceIndex::new()),
            Arc::new(HashEmbedder::default()),
        )
    }

    #[test]
    fn strips_question_words_and_possessives() {
        let p = preprocess_query("what is my favorite color");
        assert_eq!(p.normalized, "favorite color");
    }

    #[test]
    fn deadline_zero_returns_empty_without_error() {
        let (store, idx, emb) = harness();
        store
            .save_explicit("u1", "t1", "my favorite color is blue", None, None)
            .unwrap();
        let req = RecallRequest {
            user_id: "u1".to_string(),
            thread_id: None,
            query: Some("favorite color".to_string()),
            max_items: 10,
            deadline_ms: 0,
        };
        let results = recall(&store, &idx, &emb, &req).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn explicit_save_is_recalled_by_keyword() {
        let (store, idx, emb) = harness();
        store
            .save_explicit("u1", "t1", "my favorite color is blue", None, None)
            .unwrap();
        let req = RecallRequest {
            user_id: "u1".to_string(),
            thread_id: None,
            query: Some("what is my favorite color".to_string()),
            max_items: 10,
            deadline_ms: 200,
        };
        let results = recall(&store, &idx, &emb, &req).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.content, "my favorite color is blue");
    }

    #[test]
    fn tier1_is_promoted_ahead_of_higher_composite_score() {
        let mut candidates = vec![
            ScoredMemory {
                memory: make_memory("m1", Tier::Tier3, 0),
                keyword_score: 0.0,
                semantic_score: 0.0,
                composite_score: 0.9,
            },
            ScoredMemory {
                memory: make_memory("m2", Tier::Tier1, 0),
                keyword_score: 0.0,
                semantic_score: 0.0,
                composite_score: 0.1,
            },
        ];
        candidates = rank(candidates, None);
        assert_eq!(candidates[0].memory.id, "m2");
    }

    fn make_memory(id: &str, tier: Tier, updated_at: i64) -> crate::types::Memory {
        crate::types::Memory {
            id: id.to_string(),
            user_id: "u1".to_string(),
            thread_id: None,
            content: "x".to_string(),
            entities: vec![],
            priority: 0.5,
            confidence: 0.5,
            tier,
            created_at: updated_at,
            updated_at,
            last_seen_ts: updated_at,
            repeats: 1,
            thread_set: vec![],
            redaction_map: serde_json::json!({}),
            deleted_at: None,
        }
    }
}
