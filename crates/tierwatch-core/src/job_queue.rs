use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{CreateJobRequest, JobStatus, ScoringJob};

/// Persistent job queue for batch runs.
///
/// Implementations must support atomic claiming via `SELECT FOR UPDATE SKIP LOCKED`
/// or equivalent to prevent multiple workers from claiming the same job.
pub trait JobQueue: Send + Sync + Clone {
    fn create_job(
        &self,
        request: CreateJobRequest,
    ) -> impl Future<Output = Result<ScoringJob, AppError>> + Send;

    /// Enqueue a job of this kind unless one is already pending or running.
    ///
    /// Returns the new job, or `None` when an active one already exists.
    fn create_job_if_idle(
        &self,
        request: CreateJobRequest,
    ) -> impl Future<Output = Result<Option<ScoringJob>, AppError>> + Send;

    /// Atomically claim the next due pending job.
    ///
    /// Returns `None` if no jobs are available.
    fn claim_job(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<Option<ScoringJob>, AppError>> + Send;

    fn complete_job(
        &self,
        job_id: Uuid,
        report: Option<serde_json::Value>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Mark a job as failed. If `next_retry_at` is provided, the job is
    /// reset to `pending` for retry; otherwise it is marked as permanently `failed`.
    fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get_job(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Option<ScoringJob>, AppError>> + Send;

    fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ScoringJob>, AppError>> + Send;

    /// Release all jobs held by a specific worker (for graceful shutdown).
    fn release_worker_jobs(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}
