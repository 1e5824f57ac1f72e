//! Queue job model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use typed_builder::TypedBuilder;

use crate::common::QueueJobId;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    DeadLetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "error_kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transient error - will retry if attempts remain
    #[default]
    Retryable,
    /// Permanent error - will not retry
    NonRetryable,
}

impl ErrorKind {
    /// Whether this error kind should trigger a retry
    pub fn should_retry(&self) -> bool {
        matches!(self, ErrorKind::Retryable)
    }
}

/// Backoff before the next attempt: `2^attempt` seconds, capped at one hour.
pub fn retry_delay(attempt: i32) -> Duration {
    let exp = attempt.clamp(0, 12) as u32;
    Duration::seconds(2i64.pow(exp).min(3600))
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct QueueJob {
    #[builder(default = QueueJobId::new())]
    pub id: QueueJobId,
    pub job_type: String,
    pub args: serde_json::Value,
    #[builder(default)]
    pub status: JobStatus,
    #[builder(default = 1)]
    pub attempt: i32,
    #[builder(default = 3)]
    pub max_attempts: i32,
    #[builder(default = Utc::now())]
    pub next_run_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub lease_expires_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub worker_id: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error_message: Option<String>,
    #[builder(default, setter(strip_option))]
    pub error_kind: Option<ErrorKind>,
    #[builder(default, setter(strip_option))]
    pub dead_lettered_at: Option<DateTime<Utc>>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl QueueJob {
    /// Whether a failure of `kind` on the current attempt earns another one.
    pub fn can_retry(&self, kind: ErrorKind) -> bool {
        kind.should_retry() && self.attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_is_exponential_and_capped() {
        assert_eq!(retry_delay(1), Duration::seconds(2));
        assert_eq!(retry_delay(2), Duration::seconds(4));
        assert_eq!(retry_delay(3), Duration::seconds(8));
        assert_eq!(retry_delay(30), Duration::seconds(3600));
    }

    #[test]
    fn test_can_retry_respects_kind_and_attempts() {
        let job = QueueJob::builder()
            .job_type("scrape")
            .args(serde_json::json!({}))
            .build();
        assert!(job.can_retry(ErrorKind::Retryable));
        assert!(!job.can_retry(ErrorKind::NonRetryable));

        let last = QueueJob::builder()
            .job_type("scrape")
            .args(serde_json::json!({}))
            .attempt(3)
            .build();
        assert!(!last.can_retry(ErrorKind::Retryable));
    }
}
