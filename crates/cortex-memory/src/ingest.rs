use std::sync::OnceLock;

use cortex_core::Tier;
use regex::Regex;
use tracing::{debug, warn};

use crate::dedup::extract_topic;
use crate::error::Result;
use crate::store::MemoryStore;
use crate::types::{AuditRecord, CadenceState, IngestEvent, Memory, PendingMessage};

/// Cadence thresholds.
#[derive(Debug, Clone)]
pub struct CadenceConfig {
    pub msg_threshold: u32,
    pub token_threshold: u32,
    pub time_ms: i64,
    pub quality_threshold: f64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            msg_threshold: 6,
            token_threshold: 1500,
            time_ms: 180_000,
            quality_threshold: 0.3,
        }
    }
}

/// `chars / 4 ≈ tokens`.
pub fn estimate_tokens(content: &str) -> u32 {
    (content.chars().count() as u32 / 4).max(1)
}

/// A frozen window of messages ready for the audit pipeline, plus the
/// thread/user it belongs to.
pub struct FrozenWindow {
    pub user_id: String,
    pub thread_id: String,
    pub messages: Vec<PendingMessage>,
}

/// Record one inbound turn and, if any cadence trigger fires, freeze and
/// return the current window. The chat hot
/// path never waits on this — callers run it off the ingest queue.
pub fn record_turn(
    store: &MemoryStore,
    cfg: &CadenceConfig,
    event: &IngestEvent,
) -> Result<Option<FrozenWindow>> {
    let token_estimate = estimate_tokens(&event.content);
    store.push_pending_message(
        &event.user_id,
        &event.thread_id,
        &event.role,
        &event.content,
        token_estimate,
    )?;

    let mut state = store.get_cadence_state(&event.thread_id, &event.user_id)?;
    state.msg_count += 1;
    state.token_count += token_estimate;

    let now = chrono::Utc::now().timestamp_millis();
    let elapsed = now - state.last_audit_at;
    let triggered = state.msg_count >= cfg.msg_threshold
        || state.token_count >= cfg.token_threshold
        || (elapsed >= cfg.time_ms && state.msg_count >= 1);

    if !triggered {
        store.save_cadence_state(&state)?;
        return Ok(None);
    }

    let messages = store.drain_pending_messages(&event.thread_id)?;
    state.msg_count = 0;
    state.token_count = 0;
    state.last_audit_at = now;
    store.save_cadence_state(&state)?;

    debug!(thread_id = %event.thread_id, count = messages.len(), "audit window frozen");
    Ok(Some(FrozenWindow {
        user_id: event.user_id.clone(),
        thread_id: event.thread_id.clone(),
        messages,
    }))
}

/// A dominant topic judged stable (seen in >= 2 audit batches). The
/// caller (which knows the topic's ttl-class) still has to AND this with
/// a staleness check against `newest_backing_update_at`; `low_confidence`
/// alone is already sufficient grounds to enqueue.
#[derive(Debug, Clone)]
pub struct ResearchSignal {
    pub topic: String,
    /// True iff every memory backing this topic has `confidence <
    /// LOW_CONFIDENCE_THRESHOLD`.
    pub low_confidence: bool,
    /// `updated_at` of the most recently touched memory backing this
    /// topic, for the caller's staleness-per-ttl-class check.
    pub newest_backing_update_at: i64,
}

/// Outcome of one audit pass over a frozen window.
pub struct AuditOutcome {
    pub record: AuditRecord,
    pub saved: Vec<Memory>,
    pub research_signals: Vec<ResearchSignal>,
}

/// Low-confidence threshold below which a stable topic's backing memories
/// are considered worth refreshing via research even if not stale by time.
const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;
/// A topic counts as "stable" once seen in at least this many batches.
const STABLE_BATCH_COUNT: u32 = 2;

/// Run the audit pipeline over one frozen window.
///
/// Defensive on an empty window: returns `saved=0`, `score=0.0`, no
/// division-by-zero.
pub fn run_audit(store: &MemoryStore, window: &FrozenWindow, cfg: &CadenceConfig) -> Result<AuditOutcome> {
    if window.messages.is_empty() {
        let record = AuditRecord {
            id: uuid::Uuid::now_v7().to_string(),
            user_id: window.user_id.clone(),
            thread_id: window.thread_id.clone(),
            start_msg_id: 0,
            end_msg_id: 0,
            score: 0.0,
            saved: 0,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        store.record_audit(&record)?;
        return Ok(AuditOutcome {
            record,
            saved: Vec::new(),
            research_signals: Vec::new(),
        });
    }

    let mut saved = Vec::new();
    let mut scores = Vec::new();
    let mut topics_seen = std::collections::HashSet::new();

    for msg in &window.messages {
        if msg.role != "user" && msg.role != "assistant" {
            continue;
        }
        let score = score_message(&msg.content);
        scores.push(score);
        if score < cfg.quality_threshold {
            continue;
        }

        if let Some(topic) = extract_topic(&msg.content) {
            topics_seen.insert(topic);
        }

        let distinct_threads = store
            .list_for_user(&window.user_id)?
            .iter()
            .filter(|m| {
                extract_topic(&m.content).as_deref() == extract_topic(&msg.content).as_deref()
                    && extract_topic(&msg.content).is_some()
            })
            .flat_map(|m| m.thread_set.clone())
            .collect::<std::collections::HashSet<_>>()
            .len();

        let tier = if distinct_threads >= 2 {
            Tier::Tier2
        } else {
            Tier::Tier3
        };
        let priority = match tier {
            Tier::Tier2 => 0.6,
            _ => 0.4,
        };

        match store.save_from_audit(&window.user_id, &window.thread_id, &msg.content, tier, priority, score) {
            Ok(m) => saved.push(m),
            Err(e) => warn!(error = %e, "failed to persist audited memory"),
        }
    }

    let aggregate_score = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };

    let record = AuditRecord {
        id: uuid::Uuid::now_v7().to_string(),
        user_id: window.user_id.clone(),
        thread_id: window.thread_id.clone(),
        start_msg_id: window.messages.first().map(|m| m.id).unwrap_or(0),
        end_msg_id: window.messages.last().map(|m| m.id).unwrap_or(0),
        score: aggregate_score,
        saved: saved.len() as u32,
        created_at: chrono::Utc::now().timestamp_millis(),
    };
    store.record_audit(&record)?;

    let mut research_signals = Vec::new();
    for topic in topics_seen {
        let seen_batches = store.bump_topic_seen(&window.user_id, &topic)?;
        if seen_batches < STABLE_BATCH_COUNT {
            continue;
        }
        let backing: Vec<Memory> = store
            .list_for_user(&window.user_id)?
            .into_iter()
            .filter(|m| extract_topic(&m.content).as_deref() == Some(topic.as_str()))
            .collect();
        let low_confidence = !backing.is_empty() && backing.iter().all(|m| m.confidence < LOW_CONFIDENCE_THRESHOLD);
        let newest_backing_update_at = backing.iter().map(|m| m.updated_at).max().unwrap_or(0);
        // Staleness-by-time is judged by the caller (memoryd), which knows
        // the ttl-class; we forward both signals it needs to apply
        // "stale OR low-confidence" itself.
        research_signals.push(ResearchSignal {
            topic,
            low_confidence,
            newest_backing_update_at,
        });
    }

    Ok(AuditOutcome {
        record,
        saved,
        research_signals,
    })
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][a-zA-Z0-9]{2,}\b").unwrap())
}

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "to", "of", "in", "on", "for",
    "and", "or", "but", "with", "that", "this", "it", "i", "you", "he", "she", "they", "we",
];

/// Score a message against an entity/keyword heuristic in [0, 1].
/// Weighs three cheap signals: fraction of content words
/// (length > 2, non-stopword), presence of capitalized "entity-shaped"
/// tokens, and first-person possessive/preference phrasing that tends to
/// carry durable facts ("my ...", "I prefer ...", "I work as ...").
pub fn score_message(content: &str) -> f64 {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.is_empty() {
        return 0.0;
    }

    let content_words = words
        .iter()
        .filter(|w| {
            let cleaned: String = w.chars().filter(|c| c.is_alphanumeric()).collect();
            cleaned.len() > 2 && !STOP_WORDS.contains(&cleaned.to_lowercase().as_str())
        })
        .count();
    let content_word_ratio = content_words as f64 / words.len() as f64;

    let entity_hits = entity_re().find_iter(content).count();
    let entity_score = (entity_hits as f64 / 3.0).min(1.0);

    let lower = content.to_lowercase();
    let personal_phrasing = lower.contains("my ")
        || lower.contains("i prefer")
        || lower.contains("i work")
        || lower.contains("i am ")
        || lower.contains("i'm ")
        || lower.contains("i live")
        || lower.contains("i use");
    let personal_score = if personal_phrasing { 1.0 } else { 0.0 };

    (0.4 * content_word_ratio + 0.3 * entity_score + 0.3 * personal_score).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IngestEvent;

    #[test]
    fn personal_statement_scores_above_threshold() {
        let score = score_message("my favorite color is blue");
        assert!(score >= 0.3, "expected >= 0.3, got {score}");
    }

    #[test]
    fn filler_message_scores_low() {
        let score = score_message("ok");
        assert!(score < 0.3, "expected < 0.3, got {score}");
    }

    #[test]
    fn cadence_triggers_on_message_count() {
        let store = MemoryStore::open_in_memory().unwrap();
        let cfg = CadenceConfig::default();
        let mut frozen = None;
        for i in 0..cfg.msg_threshold {
            let event = IngestEvent {
                user_id: "u1".to_string(),
                thread_id: "t1".to_string(),
                role: "user".to_string(),
                content: format!("message {i}"),
            };
            frozen = record_turn(&store, &cfg, &event).unwrap();
        }
        assert!(frozen.is_some());
        assert_eq!(frozen.unwrap().messages.len() as u32, cfg.msg_threshold);
    }

    #[test]
    fn empty_window_audit_has_no_division_by_zero() {
        let store = MemoryStore::open_in_memory().unwrap();
        let cfg = CadenceConfig::default();
        let window = FrozenWindow {
            user_id: "u1".to_string(),
            thread_id: "t1".to_string(),
            messages: vec![],
        };
        let outcome = run_audit(&store, &window, &cfg).unwrap();
        assert_eq!(outcome.record.saved, 0);
        assert_eq!(outcome.record.score, 0.0);
    }

    #[test]
    fn low_score_messages_are_discarded() {
        let store = MemoryStore::open_in_memory().unwrap();
        let cfg = CadenceConfig::default();
        let window = FrozenWindow {
            user_id: "u1".to_string(),
            thread_id: "t1".to_string(),
            messages: vec![PendingMessage {
                id: 1,
                user_id: "u1".to_string(),
                thread_id: "t1".to_string(),
                role: "user".to_string(),
                content: "ok".to_string(),
                token_estimate: 1,
                created_at: 0,
            }],
        };
        let outcome = run_audit(&store, &window, &cfg).unwrap();
        assert_eq!(outcome.saved.len(), 0);
    }

    #[test]
    fn topic_becomes_stable_after_two_batches() {
        let store = MemoryStore::open_in_memory().unwrap();
        let cfg = CadenceConfig::default();
        let msg = |i: i64| PendingMessage {
            id: i,
            user_id: "u1".to_string(),
            thread_id: "t1".to_string(),
            role: "user".to_string(),
            content: "my favorite color is blue".to_string(),
            token_estimate: 8,
            created_at: 0,
        };
        let window1 = FrozenWindow { user_id: "u1".to_string(), thread_id: "t1".to_string(), messages: vec![msg(1)] };
        let outcome1 = run_audit(&store, &window1, &cfg).unwrap();
        assert!(outcome1.research_signals.is_empty());

        let window2 = FrozenWindow { user_id: "u1".to_string(), thread_id: "t1".to_string(), messages: vec![msg(2)] };
        let outcome2 = run_audit(&store, &window2, &cfg).unwrap();
        assert!(!outcome2.research_signals.is_empty());
        let signal = &outcome2.research_signals[0];
        assert!(!signal.low_confidence, "personal-phrasing memory should score above the low-confidence bar");
        assert!(signal.newest_backing_update_at > 0);
    }

    #[test]
    fn low_confidence_backing_memory_is_flagged() {
        let store = MemoryStore::open_in_memory().unwrap();
        let cfg = CadenceConfig::default();
        // "my Foo is Bar" carries entity-shaped capitalization, which raises
        // score_message's entity signal enough to push confidence above the
        // personal-phrasing-only case but this asserts the flag purely from
        // a directly-inserted low-confidence memory instead, to keep the
        // scoring heuristic decoupled from this gate's own threshold.
        store
            .save_from_audit("u1", "t1", "my favorite color is blue", Tier::Tier3, 0.4, 0.2)
            .unwrap();
        store.bump_topic_seen("u1", "favorite color").unwrap();
        let msg = PendingMessage {
            id: 1,
            user_id: "u1".to_string(),
            thread_id: "t1".to_string(),
            role: "user".to_string(),
            content: "my favorite color is green".to_string(),
            token_estimate: 8,
            created_at: 0,
        };
        let window = FrozenWindow { user_id: "u1".to_string(), thread_id: "t1".to_string(), messages: vec![msg] };
        let outcome = run_audit(&store, &window, &cfg).unwrap();
        let signal = outcome
            .research_signals
            .iter()
            .find(|s| s.topic == "favorite color")
            .expect("favorite color topic should be stable after two sightings");
        assert!(signal.low_confidence);
    }
}
