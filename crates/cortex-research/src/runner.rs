use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use cortex_bus::SqliteBus;

use crate::fetch::ResearchFetcher;
use crate::job::run_job;
use crate::types::ResearchJob;

/// Consumes queued research jobs one at a time. Event-driven: each `recv()`
/// blocks until a job arrives instead of polling a clock. Never triggered
/// on the chat hot path — only the ingest audit pipeline enqueues here.
pub struct JobRunner {
    fetcher: Arc<dyn ResearchFetcher>,
    secondary: Option<Arc<dyn ResearchFetcher>>,
    bus: Arc<SqliteBus>,
    job_timeout: Duration,
}

impl JobRunner {
    pub fn new(
        fetcher: Arc<dyn ResearchFetcher>,
        secondary: Option<Arc<dyn ResearchFetcher>>,
        bus: Arc<SqliteBus>,
        job_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            secondary,
            bus,
            job_timeout,
        }
    }

    /// Runs until the sender half is dropped. Each job is awaited to
    /// completion before the next is pulled off the queue — job throughput
    /// is bounded by research-backend latency, which is fine since this
    /// path never blocks a chat turn.
    pub async fn run(self, mut rx: mpsc::Receiver<ResearchJob>) {
        info!("research job runner started");
        while let Some(job) = rx.recv().await {
            let topic = job.topic.clone();
            match run_job(
                job,
                Arc::clone(&self.fetcher),
                self.secondary.clone(),
                Arc::clone(&self.bus),
                self.job_timeout,
                &[],
            )
            .await
            {
                Ok(Some(_)) => info!(topic = %topic, "research job published a capsule"),
                Ok(None) => info!(topic = %topic, "research job completed with no capsule"),
                Err(e) => warn!(error = %e, topic = %topic, "research job errored"),
            }
        }
        info!("research job runner stopped: queue closed");
    }
}

/// Bounded channel capacity helper — backpressure drops new jobs via
/// `try_send` once the queue is full.
pub fn enqueue(tx: &mpsc::Sender<ResearchJob>, job: ResearchJob) {
    if let Err(e) = tx.try_send(job) {
        warn!(error = %e, "research queue full, dropping job");
    }
}
