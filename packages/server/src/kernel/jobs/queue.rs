//! PostgreSQL-backed job queue implementation.
//!
//! Rows in `jobs` carry a JSON payload and a lease. Workers claim ready rows
//! with `FOR UPDATE SKIP LOCKED`, so each job has at most one active consumer;
//! a row whose lease expires (worker crash) becomes claimable again as a new
//! attempt.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use tracing::{info, warn};

use super::job::{retry_delay, ErrorKind, JobStatus, QueueJob};
use crate::common::QueueJobId;

/// A claimed job ready for execution.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: QueueJobId,
    pub job_type: String,
    pub args: serde_json::Value,
    /// 1-based delivery attempt
    pub attempt: i32,
    pub max_attempts: i32,
}

impl ClaimedJob {
    /// Deserialize the job payload.
    pub fn deserialize<C: DeserializeOwned>(&self) -> Result<C> {
        serde_json::from_value(self.args.clone())
            .map_err(|e| anyhow!("failed to deserialize payload of job {}: {}", self.id, e))
    }

    /// True when an earlier attempt of this job was already delivered.
    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }
}

impl From<QueueJob> for ClaimedJob {
    fn from(job: QueueJob) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type,
            args: job.args,
            attempt: job.attempt,
            max_attempts: job.max_attempts,
        }
    }
}

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Rescheduled as `next_attempt`, runnable at `run_at`
    Retrying {
        next_attempt: i32,
        run_at: DateTime<Utc>,
    },
    /// No retries left, or the failure was permanent
    DeadLettered,
}

/// Durable queue contract used by the submitter and the worker.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a payload for immediate execution.
    async fn enqueue(
        &self,
        job_type: &str,
        args: serde_json::Value,
        max_attempts: i32,
    ) -> Result<QueueJobId>;

    /// Claim up to `limit` ready jobs for `worker_id`, leasing them for `lease`.
    async fn claim(&self, worker_id: &str, limit: i64, lease: Duration) -> Result<Vec<ClaimedJob>>;

    /// Extend the lease of a running job.
    async fn heartbeat(&self, job_id: QueueJobId, lease: Duration) -> Result<()>;

    async fn mark_succeeded(&self, job_id: QueueJobId) -> Result<()>;

    /// Record a failed attempt; retryable failures with attempts left are
    /// rescheduled with exponential backoff, everything else is dead-lettered.
    async fn mark_failed(
        &self,
        job_id: QueueJobId,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FailureOutcome>;
}

pub struct PostgresJobQueue {
    pool: PgPool,
}

impl PostgresJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, job_id: QueueJobId) -> Result<QueueJob> {
        sqlx::query_as::<_, QueueJob>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("queue job {} not found", job_id))
    }

    /// Dead-letter running jobs whose lease expired on their final attempt.
    async fn dead_letter_exhausted_leases(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'dead_letter',
                error_message = COALESCE(error_message, 'lease expired on final attempt'),
                error_kind = 'retryable',
                dead_lettered_at = NOW(),
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE status = 'running'
              AND lease_expires_at < NOW()
              AND attempt >= max_attempts
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        args: serde_json::Value,
        max_attempts: i32,
    ) -> Result<QueueJobId> {
        let job = QueueJob::builder()
            .job_type(job_type)
            .args(args)
            .max_attempts(max_attempts.max(1))
            .build();

        let id = sqlx::query_scalar::<_, QueueJobId>(
            r#"
            INSERT INTO jobs (id, job_type, args, status, attempt, max_attempts, next_run_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(job.id)
        .bind(&job.job_type)
        .bind(&job.args)
        .bind(job.status)
        .bind(job.attempt)
        .bind(job.max_attempts)
        .bind(job.next_run_at)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&self.pool)
        .await?;

        info!(job_id = %id, job_type, "Enqueued job");
        Ok(id)
    }

    async fn claim(&self, worker_id: &str, limit: i64, lease: Duration) -> Result<Vec<ClaimedJob>> {
        let exhausted = self.dead_letter_exhausted_leases().await?;
        if exhausted > 0 {
            warn!(count = exhausted, "Dead-lettered jobs whose final lease expired");
        }

        let jobs = sqlx::query_as::<_, QueueJob>(
            r#"
            WITH next_jobs AS (
                SELECT id
                FROM jobs
                WHERE
                    (status = 'pending' AND next_run_at <= NOW())
                    OR (status = 'running' AND lease_expires_at < NOW() AND attempt < max_attempts)
                ORDER BY next_run_at
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET
                attempt = CASE WHEN status = 'running' THEN attempt + 1 ELSE attempt END,
                status = 'running',
                lease_expires_at = NOW() + ($2 || ' milliseconds')::INTERVAL,
                worker_id = $3,
                updated_at = NOW()
            WHERE id IN (SELECT id FROM next_jobs)
            RETURNING *
            "#,
        )
        .bind(limit)
        .bind(lease.as_millis().to_string())
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs.into_iter().map(ClaimedJob::from).collect())
    }

    async fn heartbeat(&self, job_id: QueueJobId, lease: Duration) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET lease_expires_at = NOW() + ($1 || ' milliseconds')::INTERVAL,
                updated_at = NOW()
            WHERE id = $2 AND status = 'running'
            "#,
        )
        .bind(lease.as_millis().to_string())
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_succeeded(&self, job_id: QueueJobId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded',
                lease_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(
        &self,
        job_id: QueueJobId,
        error: &str,
        kind: ErrorKind,
    ) -> Result<FailureOutcome> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, QueueJob>("SELECT * FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("queue job {} not found", job_id))?;

        let outcome = if job.can_retry(kind) {
            let next_attempt = job.attempt + 1;
            let run_at = Utc::now() + retry_delay(job.attempt);

            sqlx::query(
                r#"
                UPDATE jobs
                SET status = $1,
                    attempt = $2,
                    next_run_at = $3,
                    error_message = $4,
                    error_kind = $5,
                    lease_expires_at = NULL,
                    worker_id = NULL,
                    updated_at = NOW()
                WHERE id = $6
                "#,
            )
            .bind(JobStatus::Pending)
            .bind(next_attempt)
            .bind(run_at)
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

            FailureOutcome::Retrying {
                next_attempt,
                run_at,
            }
        } else {
            sqlx::query(
                r#"
                UPDATE jobs
                SET status = $1,
                    error_message = $2,
                    error_kind = $3,
                    dead_lettered_at = NOW(),
                    lease_expires_at = NULL,
                    updated_at = NOW()
                WHERE id = $4
                "#,
            )
            .bind(JobStatus::DeadLetter)
            .bind(error)
            .bind(kind)
            .bind(job_id)
            .execute(&mut *tx)
            .await?;

            FailureOutcome::DeadLettered
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize)]
    struct Payload {
        location: String,
    }

    fn claimed(attempt: i32, args: serde_json::Value) -> ClaimedJob {
        ClaimedJob {
            id: QueueJobId::new(),
            job_type: "scrape".into(),
            args,
            attempt,
            max_attempts: 3,
        }
    }

    #[test]
    fn test_deserialize_payload() {
        let job = claimed(1, serde_json::json!({ "location": "Bandung" }));
        let payload: Payload = job.deserialize().unwrap();
        assert_eq!(payload.location, "Bandung");
    }

    #[test]
    fn test_deserialize_error_names_job() {
        let job = claimed(1, serde_json::json!({ "nope": true }));
        let err = job.deserialize::<Payload>().err().unwrap();
        assert!(err.to_string().contains(&job.id.to_string()));
    }

    #[test]
    fn test_is_redelivery() {
        assert!(!claimed(1, serde_json::json!({})).is_redelivery());
        assert!(claimed(2, serde_json::json!({})).is_redelivery());
    }
}
