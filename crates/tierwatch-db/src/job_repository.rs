use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use tierwatch_core::error::AppError;
use tierwatch_core::job::{CreateJobRequest, JobStatus, ScoringJob};
use tierwatch_core::job_queue::JobQueue;

/// PostgreSQL-backed job queue using `SELECT FOR UPDATE SKIP LOCKED`.
#[derive(Clone)]
pub struct ScoringJobRepository {
    pool: Pool<Postgres>,
}

impl ScoringJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct ScoringJobRow {
    id: Uuid,
    kind: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    retry_count: i32,
    max_retries: i32,
    next_retry_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    report: Option<serde_json::Value>,
    worker_id: Option<String>,
}

impl From<ScoringJobRow> for ScoringJob {
    fn from(row: ScoringJobRow) -> Self {
        ScoringJob {
            id: row.id,
            kind: row.kind,
            status: row.status.parse().unwrap_or(JobStatus::Pending),
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            retry_count: row.retry_count.max(0) as u32,
            max_retries: row.max_retries.max(0) as u32,
            next_retry_at: row.next_retry_at,
            error_message: row.error_message,
            report: row.report,
            worker_id: row.worker_id,
        }
    }
}

impl JobQueue for ScoringJobRepository {
    async fn create_job(&self, request: CreateJobRequest) -> Result<ScoringJob, AppError> {
        let row = sqlx::query_as::<_, ScoringJobRow>(
            r#"
            INSERT INTO scoring_jobs (kind, max_retries)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(&request.kind)
        .bind(request.max_retries.unwrap_or(3) as i32)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.into())
    }

    async fn create_job_if_idle(
        &self,
        request: CreateJobRequest,
    ) -> Result<Option<ScoringJob>, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        // Serializes concurrent schedulers for the same kind until commit.
        sqlx::query(r#"SELECT pg_advisory_xact_lock(hashtext($1))"#)
            .bind(&request.kind)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let row = sqlx::query_as::<_, ScoringJobRow>(
            r#"
            INSERT INTO scoring_jobs (kind, max_retries)
            SELECT $1, $2
            WHERE NOT EXISTS (
                SELECT 1 FROM scoring_jobs
                WHERE kind = $1 AND status IN ('pending', 'running')
            )
            RETURNING *
            "#,
        )
        .bind(&request.kind)
        .bind(request.max_retries.unwrap_or(3) as i32)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn claim_job(&self, worker_id: &str) -> Result<Option<ScoringJob>, AppError> {
        let row = sqlx::query_as::<_, ScoringJobRow>(
            r#"
            UPDATE scoring_jobs
            SET status = 'running', worker_id = $1, started_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM scoring_jobs
                WHERE status = 'pending'
                  AND (next_retry_at IS NULL OR next_retry_at <= NOW())
                ORDER BY next_retry_at NULLS FIRST, created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        report: Option<serde_json::Value>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE scoring_jobs
            SET status = 'completed', completed_at = NOW(), updated_at = NOW(),
                report = $2, error_message = NULL, worker_id = NULL
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(report)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE scoring_jobs
            SET
                status = CASE WHEN $3::timestamptz IS NOT NULL THEN 'pending' ELSE 'failed' END,
                retry_count = CASE WHEN $3::timestamptz IS NOT NULL THEN retry_count + 1 ELSE retry_count END,
                next_retry_at = $3,
                error_message = $2,
                updated_at = NOW(),
                worker_id = NULL,
                started_at = CASE WHEN $3::timestamptz IS NOT NULL THEN NULL ELSE started_at END,
                completed_at = CASE WHEN $3::timestamptz IS NOT NULL THEN NULL ELSE NOW() END
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(next_retry_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ScoringJob>, AppError> {
        let row = sqlx::query_as::<_, ScoringJobRow>(r#"SELECT * FROM scoring_jobs WHERE id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<ScoringJob>, AppError> {
        let rows = sqlx::query_as::<_, ScoringJobRow>(
            r#"
            SELECT * FROM scoring_jobs
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(status.map(|s| s.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE scoring_jobs
            SET status = 'pending', worker_id = NULL, started_at = NULL, updated_at = NOW()
            WHERE worker_id = $1 AND status = 'running'
            "#,
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
