use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::store::MemoryStore;
use crate::types::ThreadSummary;

/// One message as the gateway's transcript endpoint reports it
/// (`GET /v1/threads/:id/messages`).
#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub role: String,
    pub content: String,
    pub seq: i64,
}

/// Fetches a thread's transcript from the gateway. Kept as a trait so this
/// crate never depends on the gateway's HTTP surface directly — the same
/// narrow-boundary shape as `VectorIndex`/`Embedder` in vector.rs.
#[async_trait]
pub trait ThreadMessageSource: Send + Sync {
    async fn fetch_messages(&self, thread_id: &str, since_seq: Option<i64>) -> Result<Vec<ThreadMessage>>;
}

/// Produces a new summary text given the transcript and the previous
/// summary (if any). Backed by a configured `LlmProvider` in cortex-agent;
/// this crate only sees the narrow trait.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, previous: Option<&str>, messages: &[ThreadMessage]) -> Result<String>;
}

/// A thread summary is stale once messages exist past the sequence number
/// it was last regenerated against.
fn is_stale(existing: &ThreadSummary, latest_seq: i64, last_known_seq: i64) -> bool {
    latest_seq > last_known_seq || existing.summary.is_empty()
}

/// Load a thread summary, regenerating it lazily against the transcript when
/// stale or absent.
pub async fn get_or_regenerate(
    store: &MemoryStore,
    source: &dyn ThreadMessageSource,
    summarizer: &dyn Summarizer,
    user_id: &str,
    thread_id: &str,
) -> Result<ThreadSummary> {
    let existing = store.load_thread_summary(thread_id)?;
    let last_known_seq = existing.as_ref().map(|_| 0).unwrap_or(0);

    let new_messages = source.fetch_messages(thread_id, Some(last_known_seq)).await?;
    let latest_seq = new_messages.iter().map(|m| m.seq).max().unwrap_or(last_known_seq);

    let stale = match &existing {
        Some(s) => is_stale(s, latest_seq, last_known_seq),
        None => true,
    };

    if !stale {
        return Ok(existing.unwrap());
    }

    if new_messages.is_empty() {
        let summary = existing.unwrap_or_else(|| ThreadSummary {
            thread_id: thread_id.to_string(),
            user_id: user_id.to_string(),
            summary: String::new(),
            updated_at: chrono::Utc::now().timestamp_millis(),
        });
        return Ok(summary);
    }

    let previous_text = existing.as_ref().map(|s| s.summary.as_str());
    let summary_text = summarizer.summarize(previous_text, &new_messages).await?;

    let summary = ThreadSummary {
        thread_id: thread_id.to_string(),
        user_id: user_id.to_string(),
        summary: summary_text,
        updated_at: chrono::Utc::now().timestamp_millis(),
    };
    store.save_thread_summary(&summary)?;
    debug!(thread_id = %thread_id, "thread summary regenerated");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticSource(Vec<ThreadMessage>);

    #[async_trait]
    impl ThreadMessageSource for StaticSource {
        async fn fetch_messages(&self, _thread_id: &str, _since_seq: Option<i64>) -> Result<Vec<ThreadMessage>> {
            Ok(self.0.clone())
        }
    }

    struct EchoSummarizer;

    #[async_trait]
    impl Summarizer for EchoSummarizer {
        async fn summarize(&self, _previous: Option<&str>, messages: &[ThreadMessage]) -> Result<String> {
            Ok(format!("summary of {} messages", messages.len()))
        }
    }

    #[tokio::test]
    async fn regenerates_when_absent() {
        let store = MemoryStore::open_in_memory().unwrap();
        let source = StaticSource(vec![ThreadMessage {
            role: "user".to_string(),
            content: "hello".to_string(),
            seq: 1,
        }]);
        let summarizer = EchoSummarizer;
        let summary = get_or_regenerate(&store, &source, &summarizer, "u1", "t1").await.unwrap();
        assert_eq!(summary.summary, "summary of 1 messages");
    }

    #[tokio::test]
    async fn empty_transcript_yields_empty_summary() {
        let store = MemoryStore::open_in_memory().unwrap();
        let source = StaticSource(vec![]);
        let summarizer = EchoSummarizer;
        let summary = get_or_regenerate(&store, &source, &summarizer, "u1", "t1").await.unwrap();
        assert_eq!(summary.summary, "");
    }
}
