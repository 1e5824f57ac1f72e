//! Job worker service for processing queued jobs.
//!
//! The `JobWorker` is a long-running service that:
//! - Polls the queue for ready jobs
//! - Routes each job to the handler registered for its `job_type`
//! - Heartbeats the lease while a handler runs
//! - Marks jobs succeeded, or failed with the handler's retry classification
//!
//! # Architecture
//!
//! ```text
//! JobWorker
//!     │
//!     ├─► Claim batch (JobQueue.claim)
//!     ├─► Route by job_type (JobHandler registry)
//!     │       └─► JobHandler.handle(job)
//!     └─► Mark succeeded/failed via JobQueue
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::ErrorKind;
use super::queue::{ClaimedJob, FailureOutcome, JobQueue};
use crate::common::QueueJobId;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// Maximum number of jobs to claim at once
    pub batch_size: i64,
    /// How long to wait when no jobs are available
    pub poll_interval: Duration,
    /// Lease granted on claim and on every heartbeat
    pub lease_duration: Duration,
    /// How often to send heartbeats for running jobs
    pub heartbeat_interval: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            poll_interval: Duration::from_secs(5),
            lease_duration: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(20),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

impl JobWorkerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

/// Why a handler gave up on a job.
#[derive(Debug, Clone)]
pub struct JobFailure {
    pub message: String,
    pub kind: ErrorKind,
}

impl JobFailure {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Retryable,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::NonRetryable,
        }
    }
}

/// Executes claimed jobs of one `job_type`.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;

    async fn handle(&self, job: &ClaimedJob) -> std::result::Result<(), JobFailure>;
}

/// A job worker that processes jobs from a queue.
pub struct JobWorker {
    queue: Arc<dyn JobQueue>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    config: JobWorkerConfig,
}

impl JobWorker {
    pub fn new(queue: Arc<dyn JobQueue>, config: JobWorkerConfig) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
            config,
        }
    }

    /// Register a handler for its job type. Later registrations win.
    pub fn register(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(handler.job_type(), handler);
        self
    }

    pub fn config(&self) -> &JobWorkerConfig {
        &self.config
    }

    /// Claim and process a single batch. Returns the number of jobs claimed.
    pub async fn run_once(&self) -> Result<usize> {
        let jobs = self
            .queue
            .claim(
                &self.config.worker_id,
                self.config.batch_size,
                self.config.lease_duration,
            )
            .await?;

        if jobs.is_empty() {
            return Ok(0);
        }

        debug!(count = jobs.len(), "claimed jobs");
        let count = jobs.len();

        // Jobs within a batch are independent; run them concurrently
        let handles = jobs.into_iter().map(|job| self.process_job(job));
        futures::future::join_all(handles).await;

        Ok(count)
    }

    /// Poll until `shutdown` is cancelled. In-flight batches finish first.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(
            worker_id = %self.config.worker_id,
            batch_size = self.config.batch_size,
            job_types = ?self.handlers.keys().collect::<Vec<_>>(),
            "job worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let claimed = match self.run_once().await {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!(error = %e, "failed to claim jobs");
                    0
                }
            };

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!(worker_id = %self.config.worker_id, "job worker stopped");
        Ok(())
    }

    async fn process_job(&self, job: ClaimedJob) {
        let job_id = job.id;
        let job_type = job.job_type.clone();

        let result = match self.handlers.get(job_type.as_str()) {
            Some(handler) => self.execute_with_heartbeat(handler.as_ref(), &job).await,
            None => Err(JobFailure::permanent(format!(
                "unknown job type: {}",
                job_type
            ))),
        };

        match result {
            Ok(()) => {
                debug!(job_id = %job_id, job_type = %job_type, "job succeeded");
                if let Err(e) = self.queue.mark_succeeded(job_id).await {
                    error!(job_id = %job_id, error = %e, "failed to mark job as succeeded");
                }
            }
            Err(failure) => {
                warn!(
                    job_id = %job_id,
                    job_type = %job_type,
                    attempt = job.attempt,
                    kind = ?failure.kind,
                    error = %failure.message,
                    "job failed"
                );
                match self
                    .queue
                    .mark_failed(job_id, &failure.message, failure.kind)
                    .await
                {
                    Ok(FailureOutcome::Retrying {
                        next_attempt,
                        run_at,
                    }) => {
                        info!(job_id = %job_id, next_attempt, %run_at, "job scheduled for retry");
                    }
                    Ok(FailureOutcome::DeadLettered) => {
                        warn!(job_id = %job_id, job_type = %job_type, "job dead-lettered");
                    }
                    Err(e) => {
                        error!(job_id = %job_id, error = %e, "failed to mark job as failed");
                    }
                }
            }
        }
    }

    /// Run a handler while periodically extending the job's lease.
    async fn execute_with_heartbeat(
        &self,
        handler: &dyn JobHandler,
        job: &ClaimedJob,
    ) -> std::result::Result<(), JobFailure> {
        let cancel = CancellationToken::new();
        let heartbeat = spawn_heartbeat(
            self.queue.clone(),
            job.id,
            self.config.heartbeat_interval,
            self.config.lease_duration,
            cancel.clone(),
        );

        let result = handler.handle(job).await;

        cancel.cancel();
        let _ = heartbeat.await;

        result
    }
}

fn spawn_heartbeat(
    queue: Arc<dyn JobQueue>,
    job_id: QueueJobId,
    interval: Duration,
    lease: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = queue.heartbeat(job_id, lease).await {
                        warn!(job_id = %job_id, error = %e, "heartbeat failed");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::jobs::JobStatus;
    use crate::kernel::test_dependencies::InMemoryJobQueue;

    struct FixedHandler(std::result::Result<(), JobFailure>);

    #[async_trait]
    impl JobHandler for FixedHandler {
        fn job_type(&self) -> &'static str {
            "scrape"
        }

        async fn handle(&self, _job: &ClaimedJob) -> std::result::Result<(), JobFailure> {
            self.0.clone()
        }
    }

    fn worker(queue: Arc<InMemoryJobQueue>, result: std::result::Result<(), JobFailure>) -> JobWorker {
        JobWorker::new(queue, JobWorkerConfig::with_worker_id("test-worker"))
            .register(Arc::new(FixedHandler(result)))
    }

    #[test]
    fn test_config_defaults() {
        let config = JobWorkerConfig::default();
        assert_eq!(config.batch_size, 4);
        assert!(config.worker_id.starts_with("worker-"));
        assert!(config.heartbeat_interval < config.lease_duration);
    }

    #[tokio::test]
    async fn test_success_marks_job_succeeded() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let id = queue.enqueue("scrape", serde_json::json!({}), 3).await.unwrap();

        let claimed = worker(queue.clone(), Ok(())).run_once().await.unwrap();

        assert_eq!(claimed, 1);
        assert_eq!(queue.job(id).unwrap().status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_retryable_failure_is_rescheduled() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let id = queue.enqueue("scrape", serde_json::json!({}), 3).await.unwrap();

        worker(queue.clone(), Err(JobFailure::retryable("provider timeout")))
            .run_once()
            .await
            .unwrap();

        let job = queue.job(id).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempt, 2);
        assert_eq!(job.error_message.as_deref(), Some("provider timeout"));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_dead_lettered() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let id = queue.enqueue("scrape", serde_json::json!({}), 3).await.unwrap();

        worker(queue.clone(), Err(JobFailure::permanent("location not found")))
            .run_once()
            .await
            .unwrap();

        assert_eq!(queue.job(id).unwrap().status, JobStatus::DeadLetter);
    }

    #[tokio::test]
    async fn test_unknown_job_type_is_dead_lettered() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let id = queue.enqueue("export", serde_json::json!({}), 3).await.unwrap();

        worker(queue.clone(), Ok(())).run_once().await.unwrap();

        let job = queue.job(id).unwrap();
        assert_eq!(job.status, JobStatus::DeadLetter);
        assert!(job.error_message.unwrap().contains("unknown job type"));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let queue = Arc::new(InMemoryJobQueue::new());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        worker(queue, Ok(())).run(shutdown).await.unwrap();
    }
}
