//! Job infrastructure for background execution.
//!
//! This module provides the kernel-level infrastructure for job execution:
//! - [`PostgresJobQueue`] - Database-backed job queue
//! - [`JobWorker`] - Long-running service that polls and executes jobs
//! - [`QueueJob`] - Job model
//!
//! # Architecture
//!
//! ```text
//! submit_scrape()
//!     │
//!     └─► JobQueue.enqueue("scrape", payload)
//!             └─► Insert to DB
//!
//! JobWorker
//!     │
//!     ├─► Poll DB (claim jobs, lease them)
//!     ├─► JobHandler.handle(job)   (e.g. ScrapeJobHandler)
//!     └─► Mark succeeded/failed (retry with backoff or dead-letter)
//! ```
//!
//! Business logic stays in domains; this module only moves jobs around.

mod job;
mod queue;
mod worker;

pub use job::{retry_delay, ErrorKind, JobStatus, QueueJob};
pub use queue::{ClaimedJob, FailureOutcome, JobQueue, PostgresJobQueue};
pub use worker::{JobFailure, JobHandler, JobWorker, JobWorkerConfig};
