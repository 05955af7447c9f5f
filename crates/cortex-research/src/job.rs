use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use cortex_bus::SqliteBus;

use crate::capsule::compose_capsule;
use crate::error::Result;
use crate::fetch::ResearchFetcher;
use crate::rerank::rerank;
use crate::types::{ResearchCapsule, ResearchJob};

/// Bounded retries on a transient fetch failure.
const MAX_FETCH_ATTEMPTS: u32 = 2;
/// Per-user, per-global job rate limit window.
const RATE_LIMIT_WINDOW_SECS: u64 = 60;
const RATE_LIMIT_PER_USER: i64 = 5;
const RATE_LIMIT_GLOBAL: i64 = 100;

fn hash_str(s: &str) -> String {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Cache-bus key for a research result. The job
/// carries no separate query string beyond its topic, so the topic hash
/// doubles as the query hash here.
fn research_cache_key(job: &ResearchJob) -> String {
    cortex_bus::keys::research_cache(
        &hash_str(&job.topic),
        &job.ttl_class.to_string(),
        &job.recency_hint.to_string(),
        &hash_str(&job.topic),
    )
}

/// Run one research job end to end.
///
/// Returns `Ok(None)` on every recoverable outcome (rate-limited, cache-hit
/// republish, empty fetch, overran its own budget). A dropped job is a
/// metric, never a propagated error, and it never blocks the ingest path
/// that enqueued it.
pub async fn run_job(
    job: ResearchJob,
    fetcher: Arc<dyn ResearchFetcher>,
    secondary: Option<Arc<dyn ResearchFetcher>>,
    bus: Arc<SqliteBus>,
    job_timeout: Duration,
    profile_keywords: &[String],
) -> Result<Option<ResearchCapsule>> {
    let user_key = cortex_bus::keys::rate_limit(&job.user_id, "research_job");
    if bus.incr(&user_key, RATE_LIMIT_WINDOW_SECS)? > RATE_LIMIT_PER_USER {
        warn!(user_id = %job.user_id, "research job dropped: per-user rate limit");
        return Ok(None);
    }
    let global_key = cortex_bus::keys::rate_limit("global", "research_job");
    if bus.incr(&global_key, RATE_LIMIT_WINDOW_SECS)? > RATE_LIMIT_GLOBAL {
        warn!("research job dropped: global rate limit");
        return Ok(None);
    }

    let cache_key = research_cache_key(&job);
    if let Some(cached) = bus.get_json::<ResearchCapsule>(&cache_key)? {
        info!(topic = %job.topic, "research cache hit, republishing");
        publish(&bus, &job, &cached)?;
        return Ok(Some(cached));
    }

    let outcome = tokio::time::timeout(job_timeout, fetch_and_compose(&job, fetcher, secondary, profile_keywords)).await;

    let capsule = match outcome {
        Ok(Ok(Some(capsule))) => capsule,
        Ok(Ok(None)) => {
            bus.set(&cache_key, "", job.ttl_class.negative_ttl_secs())?;
            return Ok(None);
        }
        Ok(Err(e)) => {
            warn!(error = %e, topic = %job.topic, "research job fetch failed");
            return Ok(None);
        }
        Err(_) => {
            warn!(topic = %job.topic, ms = job_timeout.as_millis() as u64, "research job overran its budget, dropped");
            return Ok(None);
        }
    };

    bus.set_json(&cache_key, &capsule, job.ttl_class.ttl_secs())?;
    publish(&bus, &job, &capsule)?;
    Ok(Some(capsule))
}

async fn fetch_and_compose(
    job: &ResearchJob,
    fetcher: Arc<dyn ResearchFetcher>,
    secondary: Option<Arc<dyn ResearchFetcher>>,
    profile_keywords: &[String],
) -> Result<Option<ResearchCapsule>> {
    let mut results = Vec::new();
    for attempt in 0..MAX_FETCH_ATTEMPTS {
        match fetcher.search(&job.topic, job.recency_hint).await {
            Ok(r) if !r.is_empty() => {
                results = r;
                break;
            }
            Ok(_) => break,
            Err(e) if attempt + 1 < MAX_FETCH_ATTEMPTS => {
                warn!(error = %e, attempt, "primary fetch failed, retrying");
                tokio::time::sleep(Duration::from_millis(200 * (attempt as u64 + 1))).await;
            }
            Err(e) => {
                warn!(error = %e, "primary fetch exhausted retries");
            }
        }
    }

    if results.is_empty() {
        if let Some(secondary) = secondary {
            results = secondary.search(&job.topic, job.recency_hint).await.unwrap_or_default();
        }
    }

    if results.is_empty() {
        return Ok(None);
    }

    let keywords: Vec<String> = job
        .topic
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    let ranked = rerank(results, &keywords, profile_keywords);

    Ok(compose_capsule(&job.batch_id, &job.topic, job.ttl_class, job.recency_hint, &ranked))
}

/// Publish the capsule under `capsule:{threadId}:{batchId}` and pub/sub the
/// key name by also touching a lightweight notify key.
/// The `SqliteBus` has no native pub/sub channel, so subscribers poll the
/// notify key the same way the gateway's early-window poller does for the
/// capsule itself — republishing an identical payload is a no-op on the bus.
fn publish(bus: &SqliteBus, job: &ResearchJob, capsule: &ResearchCapsule) -> Result<()> {
    let key = cortex_bus::keys::capsule(&job.thread_id, &job.batch_id);
    bus.set_json(&key, capsule, job.ttl_class.ttl_secs())?;
    let latest_key = cortex_bus::keys::capsule_latest(&job.thread_id);
    bus.set(&latest_key, &job.batch_id, job.ttl_class.ttl_secs())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RecencyHint, SearchResult, TtlClass};
    use async_trait::async_trait;

    struct StaticFetcher(Vec<SearchResult>);

    #[async_trait]
    impl ResearchFetcher for StaticFetcher {
        async fn search(&self, _query: &str, _freshness: RecencyHint) -> Result<Vec<SearchResult>> {
            Ok(self.0.clone())
        }
    }

    fn job() -> ResearchJob {
        ResearchJob {
            user_id: "u1".to_string(),
            thread_id: "t1".to_string(),
            topic: "rust async runtimes".to_string(),
            ttl_class: TtlClass::Docs,
            recency_hint: RecencyHint::Month,
            batch_id: "b1".to_string(),
        }
    }

    #[tokio::test]
    async fn publishes_capsule_on_success() {
        let bus = Arc::new(SqliteBus::open_in_memory().unwrap());
        let fetcher: Arc<dyn ResearchFetcher> = Arc::new(StaticFetcher(vec![
            SearchResult {
                host: "docs.rs".to_string(),
                date: chrono::Utc::now().to_rfc3339(),
                title: "rust async runtimes overview".to_string(),
                snippet: String::new(),
            },
            SearchResult {
                host: "tokio.rs".to_string(),
                date: chrono::Utc::now().to_rfc3339(),
                title: "tokio runtime docs".to_string(),
                snippet: String::new(),
            },
        ]));
        let result = run_job(job(), fetcher, None, bus.clone(), Duration::from_secs(2), &[])
            .await
            .unwrap();
        assert!(result.is_some());
        let key = cortex_bus::keys::capsule("t1", "b1");
        assert!(bus.get(&key).unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_results_publish_nothing() {
        let bus = Arc::new(SqliteBus::open_in_memory().unwrap());
        let fetcher: Arc<dyn ResearchFetcher> = Arc::new(StaticFetcher(vec![]));
        let result = run_job(job(), fetcher, None, bus.clone(), Duration::from_secs(2), &[])
            .await
            .unwrap();
        assert!(result.is_none());
        let key = cortex_bus::keys::capsule("t1", "b1");
        assert!(bus.get(&key).unwrap().is_none());
    }

    #[tokio::test]
    async fn per_user_rate_limit_drops_excess_jobs() {
        let bus = Arc::new(SqliteBus::open_in_memory().unwrap());
        let fetcher: Arc<dyn ResearchFetcher> = Arc::new(StaticFetcher(vec![SearchResult {
            host: "docs.rs".to_string(),
            date: chrono::Utc::now().to_rfc3339(),
            title: "hit".to_string(),
            snippet: String::new(),
        }]));
        for i in 0..RATE_LIMIT_PER_USER {
            let mut j = job();
            j.batch_id = format!("b{i}");
            let _ = run_job(j, fetcher.clone(), None, bus.clone(), Duration::from_secs(2), &[]).await;
        }
        let mut over = job();
        over.batch_id = "over".to_string();
        let result = run_job(over, fetcher, None, bus, Duration::from_secs(2), &[]).await.unwrap();
        assert!(result.is_none());
    }
}
