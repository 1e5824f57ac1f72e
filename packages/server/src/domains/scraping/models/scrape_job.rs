use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use typed_builder::TypedBuilder;

use crate::common::{OffsetPage, PageRequest, QueueJobId, ScrapeJobId, UserId};
use crate::domains::scraping::error::StoreError;

// ============================================================================
// Status
// ============================================================================

/// Lifecycle of a scrape job: `PENDING → RUNNING → COMPLETED | FAILED`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, Default,
)]
#[sqlx(type_name = "scrape_job_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScrapeJobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScrapeJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeJobStatus::Pending => "PENDING",
            ScrapeJobStatus::Running => "RUNNING",
            ScrapeJobStatus::Completed => "COMPLETED",
            ScrapeJobStatus::Failed => "FAILED",
        }
    }

    /// COMPLETED and FAILED are immutable once set.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScrapeJobStatus::Completed | ScrapeJobStatus::Failed)
    }

    /// The only status a job may be in right before moving to `self`.
    pub fn predecessor(&self) -> Option<ScrapeJobStatus> {
        match self {
            ScrapeJobStatus::Pending => None,
            ScrapeJobStatus::Running => Some(ScrapeJobStatus::Pending),
            ScrapeJobStatus::Completed | ScrapeJobStatus::Failed => Some(ScrapeJobStatus::Running),
        }
    }

    pub fn can_transition_to(&self, next: ScrapeJobStatus) -> bool {
        next.predecessor() == Some(*self)
    }
}

impl fmt::Display for ScrapeJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ScrapeJob Model
// ============================================================================

#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub id: ScrapeJobId,
    pub user_id: Option<UserId>,
    /// Search keyword / category
    pub keyword: String,
    pub location: String,
    pub radius: i32,
    pub status: ScrapeJobStatus,
    /// Reference to the queue job that carries this scrape
    pub queue_job_id: Option<QueueJobId>,
    /// Original job this row re-runs, when created by a redelivery
    pub retry_of: Option<ScrapeJobId>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Parameters for a new PENDING scrape job.
#[derive(Debug, Clone, PartialEq, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct NewScrapeJob {
    #[builder(default, setter(strip_option))]
    pub user_id: Option<UserId>,
    pub keyword: String,
    pub location: String,
    pub radius: i32,
    #[builder(default, setter(strip_option))]
    pub queue_job_id: Option<QueueJobId>,
    #[builder(default, setter(strip_option))]
    pub retry_of: Option<ScrapeJobId>,
}

impl NewScrapeJob {
    /// Materialize as a PENDING row without touching the database.
    pub fn into_job(self) -> ScrapeJob {
        ScrapeJob {
            id: ScrapeJobId::new(),
            user_id: self.user_id,
            keyword: self.keyword,
            location: self.location,
            radius: self.radius,
            status: ScrapeJobStatus::Pending,
            queue_job_id: self.queue_job_id,
            retry_of: self.retry_of,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

impl ScrapeJob {
    /// Parameters for a fresh row that re-runs this job. Retries always point
    /// at the first job of the chain.
    pub fn retry(&self) -> NewScrapeJob {
        NewScrapeJob {
            user_id: self.user_id,
            keyword: self.keyword.clone(),
            location: self.location.clone(),
            radius: self.radius,
            queue_job_id: self.queue_job_id,
            retry_of: Some(self.retry_of.unwrap_or(self.id)),
        }
    }

    /// Apply a status change in memory, enforcing the lifecycle.
    pub fn apply_transition(
        &mut self,
        to: ScrapeJobStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if !self.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        if to.is_terminal() {
            self.completed_at = Some(at);
        }
        Ok(())
    }

    pub async fn insert(new: NewScrapeJob, pool: &PgPool) -> Result<Self, StoreError> {
        let job = new.into_job();
        let job = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO scrape_jobs (id, user_id, keyword, location, radius, status, queue_job_id, retry_of, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(job.user_id)
        .bind(&job.keyword)
        .bind(&job.location)
        .bind(job.radius)
        .bind(job.status)
        .bind(job.queue_job_id)
        .bind(job.retry_of)
        .bind(job.created_at)
        .fetch_one(pool)
        .await?;

        Ok(job)
    }

    pub async fn find_by_id(id: ScrapeJobId, pool: &PgPool) -> Result<Self, StoreError> {
        sqlx::query_as::<_, Self>("SELECT * FROM scrape_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    /// Newest row of a retry chain: the root itself or the latest row whose
    /// `retry_of` points at it.
    pub async fn find_latest_attempt(
        root: ScrapeJobId,
        pool: &PgPool,
    ) -> Result<Self, StoreError> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM scrape_jobs
            WHERE id = $1 OR retry_of = $1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(root)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound(root))
    }

    /// Move a job to `to` in a single guarded UPDATE. The row only changes if
    /// it is still in the required predecessor status, so concurrent writers
    /// can never move a job backwards or out of a terminal state.
    pub async fn transition(
        id: ScrapeJobId,
        to: ScrapeJobStatus,
        pool: &PgPool,
    ) -> Result<Self, StoreError> {
        let Some(from) = to.predecessor() else {
            let current = Self::find_by_id(id, pool).await?;
            return Err(StoreError::InvalidTransition {
                id,
                from: current.status,
                to,
            });
        };

        let updated = sqlx::query_as::<_, Self>(
            r#"
            UPDATE scrape_jobs
            SET status = $2,
                completed_at = CASE WHEN $4 THEN NOW() ELSE completed_at END
            WHERE id = $1 AND status = $3
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(from)
        .bind(to.is_terminal())
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(job) => Ok(job),
            None => {
                let current = Self::find_by_id(id, pool).await?;
                Err(StoreError::InvalidTransition {
                    id,
                    from: current.status,
                    to,
                })
            }
        }
    }

    pub async fn attach_queue_job(
        id: ScrapeJobId,
        queue_job_id: QueueJobId,
        pool: &PgPool,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE scrape_jobs SET queue_job_id = $2 WHERE id = $1")
            .bind(id)
            .bind(queue_job_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Newest jobs first.
    pub async fn list_recent(
        request: &PageRequest,
        pool: &PgPool,
    ) -> Result<OffsetPage<Self>, StoreError> {
        let jobs = sqlx::query_as::<_, Self>(
            "SELECT * FROM scrape_jobs ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
        )
        .bind(request.limit)
        .bind(request.offset())
        .fetch_all(pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM scrape_jobs")
            .fetch_one(pool)
            .await?;

        Ok(OffsetPage::new(jobs, total, request))
    }
}
