use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::cache::{CacheError, DEFAULT_TTL, KvStore, keys};
use crate::jobs::JobQueue;
use crate::repositories::StoreError;
use crate::runs::{Run, RunPayload, RunStore};

/// Budget for one document pipeline run. The model call dominates.
pub const DOCUMENT_PIPELINE_TIMEOUT: Duration = Duration::from_secs(20 * 60);
pub const SUMMARIZE_TIMEOUT: Duration = Duration::from_secs(15 * 60);
pub const EXTRACT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Queue payload of a `document_pipeline` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineJob {
    pub run_id: Uuid,
    pub document_id: Uuid,
}

/// Queue payload of an ad-hoc `summarize` or `extract` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskJob<I> {
    pub run_id: Uuid,
    pub input: I,
}

fn timeout_for(payload: &RunPayload) -> Duration {
    match payload {
        RunPayload::DocumentPipeline { .. } => DOCUMENT_PIPELINE_TIMEOUT,
        RunPayload::Summarize { .. } => SUMMARIZE_TIMEOUT,
        RunPayload::Extract { .. } => EXTRACT_TIMEOUT,
    }
}

fn job_payload(run_id: Uuid, payload: &RunPayload) -> Result<Value, serde_json::Error> {
    match payload {
        RunPayload::DocumentPipeline { input, .. } => serde_json::to_value(PipelineJob {
            run_id,
            document_id: input.document_id,
        }),
        RunPayload::Summarize { input, .. } => serde_json::to_value(TaskJob { run_id, input }),
        RunPayload::Extract { input, .. } => serde_json::to_value(TaskJob { run_id, input }),
    }
}

/// Turns requests for work into runs plus queued jobs.
///
/// Document pipeline runs are deduplicated through the per-document dispatch
/// lock (`doc_job:{id}` -> run id). The lock is only a hint: it expires with
/// the run and is re-validated against the job table before being trusted.
#[derive(Clone)]
pub struct JobDispatcher {
    queue: Arc<dyn JobQueue>,
    runs: RunStore,
    kv: Arc<dyn KvStore>,
}

impl JobDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, kv: Arc<dyn KvStore>) -> Self {
        Self {
            queue,
            runs: RunStore::new(kv.clone()),
            kv,
        }
    }

    pub fn runs(&self) -> &RunStore {
        &self.runs
    }

    /// Ensures a pipeline run is in flight for `document_id` and returns its id.
    #[instrument(skip(self))]
    pub async fn dispatch(&self, document_id: Uuid) -> Result<Uuid, DispatchError> {
        if let Some(run_id) = self.in_flight_run(document_id).await? {
            info!(%run_id, "Pipeline already in flight, reusing run");
            return Ok(run_id);
        }

        let run = self.submit(RunPayload::document_pipeline(document_id)).await?;

        let lock = Value::String(run.id.to_string());
        if let Err(e) = self
            .kv
            .set_ex(&keys::dispatch_lock(document_id), lock, DEFAULT_TTL)
            .await
        {
            // The job is already queued; a missing lock only weakens dedup.
            warn!(run_id = %run.id, error = %e, "Failed to set dispatch lock");
        }

        info!(run_id = %run.id, "Dispatched document pipeline");
        Ok(run.id)
    }

    /// Creates a run for `payload` and enqueues the job that executes it.
    #[instrument(skip_all, fields(kind = payload.kind()))]
    pub async fn submit(&self, payload: RunPayload) -> Result<Run, DispatchError> {
        let timeout = timeout_for(&payload);
        let run = self.runs.create(payload).await?;
        let job = job_payload(run.id, &run.payload).map_err(CacheError::from)?;

        let job_id = match self.queue.enqueue(run.payload.kind(), job, timeout).await {
            Ok(job_id) => job_id,
            Err(e) => {
                if let Err(fail_err) = self.runs.fail(run.id, &e.to_string()).await {
                    warn!(run_id = %run.id, error = %fail_err, "Failed to record run failure");
                }
                return Err(e.into());
            }
        };
        self.runs.attach_job(run.id, job_id).await?;

        info!(run_id = %run.id, %job_id, "Run enqueued");
        Ok(run)
    }

    /// Cancels a run whose job a worker has already started.
    ///
    /// Returns `false` when the run is unknown, still queued, or finished.
    #[instrument(skip(self))]
    pub async fn cancel(&self, run_id: Uuid) -> Result<bool, DispatchError> {
        let Some(job_id) = self.runs.job_for(run_id).await? else {
            return Ok(false);
        };
        if !self.queue.cancel(job_id).await? {
            return Ok(false);
        }
        self.runs.cancel(run_id).await?;
        info!(%job_id, "Run cancelled");
        Ok(true)
    }

    async fn in_flight_run(&self, document_id: Uuid) -> Result<Option<Uuid>, DispatchError> {
        let lock = self.kv.get(&keys::dispatch_lock(document_id)).await?;
        let Some(run_id) = lock
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
        else {
            return Ok(None);
        };

        let Some(job_id) = self.runs.job_for(run_id).await? else {
            return Ok(None);
        };
        let active = self
            .queue
            .status(job_id)
            .await?
            .is_some_and(|status| status.is_active());
        Ok(active.then_some(run_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryKvStore;
    use crate::entities::JobStatus;
    use crate::jobs::MockJobQueue;
    use crate::runs::{RunStatus, SummarizeInput};
    use mockall::predicate::eq;

    fn dispatcher(queue: MockJobQueue, kv: Arc<MemoryKvStore>) -> JobDispatcher {
        JobDispatcher::new(Arc::new(queue), kv)
    }

    #[tokio::test]
    async fn test_dispatch_creates_run_and_lock() {
        let kv = Arc::new(MemoryKvStore::new());
        let document_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();

        let mut queue = MockJobQueue::new();
        queue
            .expect_enqueue()
            .withf(move |kind, payload, timeout| {
                kind == "document_pipeline"
                    && payload["document_id"] == document_id.to_string()
                    && *timeout == DOCUMENT_PIPELINE_TIMEOUT
            })
            .times(1)
            .returning(move |_, _, _| Ok(job_id));

        let dispatcher = dispatcher(queue, kv.clone());
        let run_id = dispatcher.dispatch(document_id).await.unwrap();

        let lock = kv.get(&keys::dispatch_lock(document_id)).await.unwrap();
        assert_eq!(lock, Some(Value::String(run_id.to_string())));
        assert_eq!(dispatcher.runs().job_for(run_id).await.unwrap(), Some(job_id));

        let run = dispatcher.runs().get(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.payload, RunPayload::document_pipeline(document_id));
    }

    #[tokio::test]
    async fn test_dispatch_reuses_active_run() {
        let kv = Arc::new(MemoryKvStore::new());
        let document_id = Uuid::new_v4();
        let job_id = Uuid::new_v4();

        let mut queue = MockJobQueue::new();
        queue
            .expect_enqueue()
            .times(1)
            .returning(move |_, _, _| Ok(job_id));
        queue
            .expect_status()
            .with(eq(job_id))
            .times(1)
            .returning(|_| Ok(Some(JobStatus::Running)));

        let dispatcher = dispatcher(queue, kv);
        let first = dispatcher.dispatch(document_id).await.unwrap();
        let second = dispatcher.dispatch(document_id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_dispatch_ignores_stale_lock() {
        let kv = Arc::new(MemoryKvStore::new());
        let document_id = Uuid::new_v4();
        let old_job = Uuid::new_v4();
        let new_job = Uuid::new_v4();

        let mut queue = MockJobQueue::new();
        let mut jobs = vec![new_job, old_job];
        queue
            .expect_enqueue()
            .times(2)
            .returning(move |_, _, _| Ok(jobs.pop().unwrap()));
        queue
            .expect_status()
            .with(eq(old_job))
            .returning(|_| Ok(Some(JobStatus::Succeeded)));

        let dispatcher = dispatcher(queue, kv.clone());
        let first = dispatcher.dispatch(document_id).await.unwrap();
        let second = dispatcher.dispatch(document_id).await.unwrap();

        assert_ne!(first, second);
        let lock = kv.get(&keys::dispatch_lock(document_id)).await.unwrap();
        assert_eq!(lock, Some(Value::String(second.to_string())));
    }

    #[tokio::test]
    async fn test_enqueue_failure_fails_run_and_sets_no_lock() {
        let kv = Arc::new(MemoryKvStore::new());
        let document_id = Uuid::new_v4();

        let mut queue = MockJobQueue::new();
        queue
            .expect_enqueue()
            .returning(|_, _, _| Err(StoreError::Database(sqlx::Error::PoolTimedOut)));

        let dispatcher = dispatcher(queue, kv.clone());
        let result = dispatcher.dispatch(document_id).await;

        assert!(matches!(result, Err(DispatchError::Store(_))));
        assert!(kv.get(&keys::dispatch_lock(document_id)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enqueue_error_survives_unrecordable_run_failure() {
        let mut kv = crate::cache::MockKvStore::new();
        kv.expect_set_ex().times(1).returning(|_, _, _| Ok(()));
        kv.expect_get()
            .returning(|_| Err(CacheError::Backend(sqlx::Error::PoolClosed)));

        let mut queue = MockJobQueue::new();
        queue
            .expect_enqueue()
            .returning(|_, _, _| Err(StoreError::Database(sqlx::Error::PoolTimedOut)));

        let dispatcher = JobDispatcher::new(Arc::new(queue), Arc::new(kv));
        let result = dispatcher
            .submit(RunPayload::document_pipeline(Uuid::new_v4()))
            .await;

        assert!(matches!(result, Err(DispatchError::Store(_))));
    }

    #[tokio::test]
    async fn test_submit_uses_task_timeout() {
        let kv = Arc::new(MemoryKvStore::new());
        let mut queue = MockJobQueue::new();
        queue
            .expect_enqueue()
            .withf(|kind, payload, timeout| {
                kind == "summarize"
                    && payload["input"]["text"] == "Some text"
                    && *timeout == SUMMARIZE_TIMEOUT
            })
            .returning(|_, _, _| Ok(Uuid::new_v4()));

        let dispatcher = dispatcher(queue, kv);
        let run = dispatcher
            .submit(RunPayload::summarize(SummarizeInput {
                text: "Some text".into(),
                model: None,
                max_length: Some(500),
                language: "en".into(),
            }))
            .await
            .unwrap();
        assert_eq!(run.payload.kind(), "summarize");
    }

    #[tokio::test]
    async fn test_cancel_only_started_jobs() {
        let kv = Arc::new(MemoryKvStore::new());
        let job_id = Uuid::new_v4();

        let mut queue = MockJobQueue::new();
        queue.expect_enqueue().returning(move |_, _, _| Ok(job_id));
        let mut started = false;
        queue.expect_cancel().with(eq(job_id)).returning(move |_| {
            let result = started;
            started = true;
            Ok(result)
        });

        let dispatcher = dispatcher(queue, kv);
        let run = dispatcher
            .submit(RunPayload::document_pipeline(Uuid::new_v4()))
            .await
            .unwrap();

        assert!(!dispatcher.cancel(run.id).await.unwrap());
        assert!(dispatcher.cancel(run.id).await.unwrap());

        let run = dispatcher.runs().get(run.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert!(!dispatcher.cancel(Uuid::new_v4()).await.unwrap());
    }
}
