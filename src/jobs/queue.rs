use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::entities::JobStatus;
use crate::jobs::JobRepository;
use crate::repositories::StoreError;

/// The API side's view of the job table: enqueue, inspect, cancel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a single-attempt job with a wall-clock `timeout`.
    async fn enqueue(&self, kind: &str, payload: Value, timeout: Duration)
    -> Result<Uuid, StoreError>;

    async fn status(&self, job_id: Uuid) -> Result<Option<JobStatus>, StoreError>;

    /// Cancels the job if a worker has started it. Queued or finished jobs
    /// are left alone and `false` is returned.
    async fn cancel(&self, job_id: Uuid) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(
        &self,
        kind: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<Uuid, StoreError> {
        let timeout_secs = i32::try_from(timeout.as_secs()).unwrap_or(i32::MAX);
        Ok(JobRepository::enqueue(&self.pool, kind, payload, None, Some(1), timeout_secs).await?)
    }

    async fn status(&self, job_id: Uuid) -> Result<Option<JobStatus>, StoreError> {
        Ok(JobRepository::status(&self.pool, job_id).await?)
    }

    async fn cancel(&self, job_id: Uuid) -> Result<bool, StoreError> {
        Ok(JobRepository::cancel_running(&self.pool, job_id).await?)
    }
}
