use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tracing::debug;

use cortex_bus::SqliteBus;

/// Minimal wire shape of `cortex_research::ResearchCapsule` — duplicated
/// here rather than linking `cortex-research` directly, matching the
/// "gateway never links memory/research crates, only their HTTP/bus
/// surfaces" rule.
#[derive(Debug, Clone, Deserialize)]
pub struct CapsulePreview {
    pub topic: String,
    pub claims: Vec<String>,
    pub sources: Vec<CapsuleSource>,
    pub confidence: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapsuleSource {
    pub host: String,
    pub date: String,
}

const POLL_INTERVAL_MS: u64 = 200;
const POLL_BUDGET_MS: u64 = 3000;

/// Polls the cache bus for a research capsule while the provider streams.
/// Stops on the first hit, on `first_token` firing, or after the 3 s
/// budget — whichever comes
/// first. Strictly non-blocking: the provider call is never awaited on
/// this future; callers `tokio::spawn` it alongside the stream.
pub async fn poll_for_capsule(
    bus: Arc<SqliteBus>,
    thread_id: String,
    batch_id: String,
    mut first_token: watch::Receiver<bool>,
) -> Option<CapsulePreview> {
    let key = cortex_bus::keys::capsule(&thread_id, &batch_id);
    let deadline = tokio::time::Instant::now() + Duration::from_millis(POLL_BUDGET_MS);

    loop {
        if tokio::time::Instant::now() >= deadline {
            debug!(thread_id = %thread_id, "research poll budget exhausted");
            return None;
        }
        if *first_token.borrow() {
            debug!(thread_id = %thread_id, "research poll stopped: first token arrived");
            return None;
        }

        match bus.get(&key) {
            Ok(Some(raw)) => {
                if let Ok(capsule) = serde_json::from_str::<CapsulePreview>(&raw) {
                    return Some(capsule);
                }
            }
            Ok(None) => {}
            Err(e) => {
                debug!(error = %e, "research poll bus read failed, continuing");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)) => {}
            _ = first_token.changed() => {
                if *first_token.borrow() {
                    return None;
                }
            }
        }
    }
}

/// Like `poll_for_capsule`, but for the common case where the caller never
/// learns a research job's `batchId` (the job was enqueued asynchronously by
/// Memory.Ingest, possibly turns earlier). Resolves `capsule_latest:{threadId}`
/// to a batch id on each tick before attempting the capsule read itself.
pub async fn poll_for_latest_capsule(
    bus: Arc<SqliteBus>,
    thread_id: String,
    mut first_token: watch::Receiver<bool>,
) -> Option<CapsulePreview> {
    let latest_key = cortex_bus::keys::capsule_latest(&thread_id);
    let deadline = tokio::time::Instant::now() + Duration::from_millis(POLL_BUDGET_MS);

    loop {
        if tokio::time::Instant::now() >= deadline {
            debug!(thread_id = %thread_id, "research poll budget exhausted");
            return None;
        }
        if *first_token.borrow() {
            debug!(thread_id = %thread_id, "research poll stopped: first token arrived");
            return None;
        }

        if let Ok(Some(batch_id)) = bus.get(&latest_key) {
            let key = cortex_bus::keys::capsule(&thread_id, &batch_id);
            if let Ok(Some(raw)) = bus.get(&key) {
                if let Ok(capsule) = serde_json::from_str::<CapsulePreview>(&raw) {
                    return Some(capsule);
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)) => {}
            _ = first_token.changed() => {
                if *first_token.borrow() {
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_latest_pointer_before_first_token() {
        let bus = Arc::new(SqliteBus::open_in_memory().unwrap());
        let latest_key = cortex_bus::keys::capsule_latest("t1");
        bus.set(&latest_key, "b1", 60).unwrap();
        let key = cortex_bus::keys::capsule("t1", "b1");
        let capsule = serde_json::json!({
            "topic": "rust async",
            "claims": ["claim one"],
            "sources": [{"host": "docs.rs", "date": "2026-01-01"}],
            "confidence": "Med"
        });
        bus.set(&key, &capsule.to_string(), 60).unwrap();

        let (_tx, rx) = watch::channel(false);
        let result = poll_for_latest_capsule(bus, "t1".to_string(), rx).await;
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn returns_capsule_when_published_before_first_token() {
        let bus = Arc::new(SqliteBus::open_in_memory().unwrap());
        let key = cortex_bus::keys::capsule("t1", "b1");
        let capsule = serde_json::json!({
            "topic": "rust async",
            "claims": ["claim one"],
            "sources": [{"host": "docs.rs", "date": "2026-01-01"}],
            "confidence": "Med"
        });
        bus.set(&key, &capsule.to_string(), 60).unwrap();

        let (_tx, rx) = watch::channel(false);
        let result = poll_for_capsule(bus, "t1".to_string(), "b1".to_string(), rx).await;
        assert!(result.is_some());
        assert_eq!(result.unwrap().topic, "rust async");
    }

    #[tokio::test]
    async fn stops_immediately_when_first_token_already_arrived() {
        let bus = Arc::new(SqliteBus::open_in_memory().unwrap());
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let result = poll_for_capsule(bus, "t1".to_string(), "b1".to_string(), rx).await;
        assert!(result.is_none());
    }
}
