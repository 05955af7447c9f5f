use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use cortex_memory::{profile, run_audit, record_turn, IngestEvent};
use cortex_research::{enqueue, freshness_from_query, ResearchJob, TtlClass};

use crate::app::AppState;

/// Spawns a bounded pool of ingest workers sharing one queue, the same
/// worker-pool-over-a-shared-mpsc-receiver shape used for other background
/// queues in this system.
pub fn spawn_workers(state: Arc<AppState>, rx: mpsc::Receiver<IngestEvent>, workers: usize) {
    let rx = Arc::new(Mutex::new(rx));
    for worker_id in 0..workers {
        let state = Arc::clone(&state);
        let rx = Arc::clone(&rx);
        tokio::spawn(async move {
            info!(worker_id, "ingest worker started");
            loop {
                let event = {
                    let mut guard = rx.lock().await;
                    guard.recv().await
                };
                let Some(event) = event else {
                    info!(worker_id, "ingest worker stopped: queue closed");
                    break;
                };
                process_event(&state, event);
            }
        });
    }
}

fn process_event(state: &AppState, event: IngestEvent) {
    let frozen = match record_turn(&state.store, &state.cadence_cfg, &event) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "ingest record_turn failed");
            return;
        }
    };
    let Some(window) = frozen else { return };

    let outcome = match run_audit(&state.store, &window, &state.cadence_cfg) {
        Ok(o) => o,
        Err(e) => {
            warn!(error = %e, "ingest run_audit failed");
            return;
        }
    };

    if !outcome.saved.is_empty() {
        if let Err(e) = profile::invalidate(&state.bus, &window.user_id) {
            warn!(error = %e, "profile cache invalidation failed");
        }
    }

    for signal in outcome.research_signals {
        let ttl_class = ttl_class_for_topic(&signal.topic);
        let stale = is_stale(signal.newest_backing_update_at, ttl_class);
        if !stale && !signal.low_confidence {
            continue;
        }
        let recency_hint = freshness_from_query(&signal.topic);
        let job = ResearchJob {
            user_id: window.user_id.clone(),
            thread_id: window.thread_id.clone(),
            topic: signal.topic,
            ttl_class,
            recency_hint,
            batch_id: Uuid::now_v7().to_string(),
        };
        enqueue(&state.research_tx, job);
    }
}

/// A topic's backing memories are "stale" once the most recently touched
/// one is older than its ttl-class's refresh window.
fn is_stale(newest_backing_update_at: i64, ttl_class: TtlClass) -> bool {
    let now = chrono::Utc::now().timestamp_millis();
    let age_ms = now.saturating_sub(newest_backing_update_at);
    age_ms >= (ttl_class.ttl_secs() as i64) * 1000
}

/// Heuristic TTL-class assignment for a topic string. Memory.Ingest only knows the topic text, not
/// which research backend category it maps to, so this mirrors the
/// keyword-based classification `profile.rs` already uses for stack/domain.
fn ttl_class_for_topic(topic: &str) -> TtlClass {
    let lower = topic.to_lowercase();
    if lower.contains("price") || lower.contains("pricing") || lower.contains("cost") {
        TtlClass::Pricing
    } else if lower.contains("release") || lower.contains("version") || lower.contains("changelog") {
        TtlClass::Releases
    } else if lower.contains("news") || lower.contains("breaking") {
        TtlClass::News
    } else if lower.contains("docs") || lower.contains("documentation") || lower.contains("api") {
        TtlClass::Docs
    } else {
        TtlClass::General
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_pricing_topic() {
        assert_eq!(ttl_class_for_topic("aws ec2 pricing changes"), TtlClass::Pricing);
    }

    #[test]
    fn classifies_general_by_default() {
        assert_eq!(ttl_class_for_topic("rust async runtimes"), TtlClass::General);
    }

    #[test]
    fn fresh_backing_memory_is_not_stale() {
        let now = chrono::Utc::now().timestamp_millis();
        assert!(!is_stale(now, TtlClass::News));
    }

    #[test]
    fn backing_memory_older_than_ttl_class_is_stale() {
        let now = chrono::Utc::now().timestamp_millis();
        let ancient = now - (TtlClass::News.ttl_secs() as i64) * 1000 - 1;
        assert!(is_stale(ancient, TtlClass::News));
    }
}
