use crate::entities::{Job, JobStatus};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, kind, payload, run_at, attempts, max_attempts, backoff_seconds, \
     timeout_secs, status, last_error, visibility_till, reserved_by, created_at, updated_at";

pub struct JobRepository;

impl JobRepository {
    /// Enqueue a new job
    pub async fn enqueue(
        pool: &PgPool,
        kind: &str,
        payload: Value,
        run_at: Option<DateTime<Utc>>,
        max_attempts: Option<i32>,
        timeout_secs: i32,
    ) -> Result<Uuid, sqlx::Error> {
        let run_at = run_at.unwrap_or_else(Utc::now);
        let max_attempts = max_attempts.unwrap_or(1);

        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO jobs (kind, payload, run_at, max_attempts, timeout_secs)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(kind)
        .bind(payload)
        .bind(run_at)
        .bind(max_attempts)
        .bind(timeout_secs)
        .fetch_one(pool)
        .await?;

        Ok(id)
    }

    /// Fetch due jobs and reserve them for processing
    pub async fn fetch_due_jobs(
        pool: &PgPool,
        limit: i64,
        worker_id: Uuid,
        visibility_timeout_secs: i64,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let visibility_till = Utc::now() + chrono::Duration::seconds(visibility_timeout_secs);

        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'running'::job_status,
                visibility_till = $3,
                reserved_by = $2,
                updated_at = now()
            WHERE id IN (
                SELECT id
                FROM jobs
                WHERE (status = 'queued'::job_status OR
                      (status = 'running'::job_status AND visibility_till < now()))
                  AND run_at <= now()
                ORDER BY run_at
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        sqlx::query_as::<_, Job>(&sql)
            .bind(limit)
            .bind(worker_id)
            .bind(visibility_till)
            .fetch_all(pool)
            .await
    }

    pub async fn find(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, sqlx::Error> {
        let sql = format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS);
        sqlx::query_as::<_, Job>(&sql)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn status(pool: &PgPool, job_id: Uuid) -> Result<Option<JobStatus>, sqlx::Error> {
        sqlx::query_scalar("SELECT status FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// Mark job as succeeded. A job cancelled while it ran stays cancelled.
    pub async fn mark_success(pool: &PgPool, job_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'succeeded'::job_status,
                attempts = attempts + 1,
                visibility_till = NULL,
                reserved_by = NULL,
                updated_at = now()
            WHERE id = $1 AND status = 'running'::job_status
            "#,
        )
        .bind(job_id)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Mark job as failed and schedule retry or mark as permanently failed
    pub async fn mark_failure(
        pool: &PgPool,
        job_id: Uuid,
        error_message: &str,
        next_run_at: Option<DateTime<Utc>>,
        backoff_seconds: i32,
    ) -> Result<(), sqlx::Error> {
        let status = if next_run_at.is_some() {
            JobStatus::Queued
        } else {
            JobStatus::Failed
        };

        sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2,
                attempts = attempts + 1,
                last_error = $3,
                run_at = COALESCE($4, run_at),
                backoff_seconds = $5,
                visibility_till = NULL,
                reserved_by = NULL,
                updated_at = now()
            WHERE id = $1 AND status = 'running'::job_status
            "#,
        )
        .bind(job_id)
        .bind(status)
        .bind(error_message)
        .bind(next_run_at)
        .bind(backoff_seconds)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Extend visibility timeout for a running job
    pub async fn extend_visibility(
        pool: &PgPool,
        job_id: Uuid,
        visibility_timeout_secs: i64,
    ) -> Result<(), sqlx::Error> {
        let new_visibility_till = Utc::now() + chrono::Duration::seconds(visibility_timeout_secs);

        sqlx::query(
            r#"
            UPDATE jobs
            SET visibility_till = $2,
                updated_at = now()
            WHERE id = $1 AND status = 'running'::job_status
            "#,
        )
        .bind(job_id)
        .bind(new_visibility_till)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Flags a running job as cancelled. Returns `false` if it was not running.
    pub async fn cancel_running(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'cancelled'::job_status,
                last_error = 'cancelled',
                updated_at = now()
            WHERE id = $1 AND status = 'running'::job_status
            "#,
        )
        .bind(job_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
