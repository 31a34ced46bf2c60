use crate::config::WorkerSettings;
use crate::entities::{Job, JobStatus};
use crate::jobs::{JobRegistry, JobRepository, calculate_backoff_delay};
use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    signal,
    sync::{Semaphore, mpsc},
    time::{interval, sleep},
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// How often a running job's row is checked for cancellation and its
/// visibility extended.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// How a handler invocation ended.
#[derive(Debug)]
pub enum Execution {
    Finished(Result<()>),
    TimedOut,
    Cancelled,
}

/// Drives `work` until it finishes, `budget` elapses, or `is_cancelled`
/// reports true on one of the heartbeats. The future is dropped on the two
/// early exits.
pub async fn execute_with_budget<W, P, F>(
    work: W,
    budget: Duration,
    heartbeat: Duration,
    mut is_cancelled: P,
) -> Execution
where
    W: Future<Output = Result<()>>,
    P: FnMut() -> F,
    F: Future<Output = bool>,
{
    tokio::pin!(work);
    let deadline = sleep(budget);
    tokio::pin!(deadline);
    let mut ticker = interval(heartbeat);
    ticker.tick().await;

    loop {
        tokio::select! {
            result = &mut work => return Execution::Finished(result),
            _ = &mut deadline => return Execution::TimedOut,
            _ = ticker.tick() => {
                if is_cancelled().await {
                    return Execution::Cancelled;
                }
            }
        }
    }
}

/// Main worker supervisor that orchestrates job processing
pub struct WorkerSupervisor {
    pool: PgPool,
    registry: Arc<JobRegistry>,
    settings: WorkerSettings,
    worker_id: Uuid,
    shutdown_token: CancellationToken,
}

impl WorkerSupervisor {
    pub fn new(pool: PgPool, registry: JobRegistry, settings: WorkerSettings) -> Self {
        Self {
            pool,
            registry: Arc::new(registry),
            settings,
            worker_id: Uuid::new_v4(),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Start the worker supervisor
    pub async fn run(self) -> Result<()> {
        info!(worker_id = %self.worker_id, kinds = ?self.registry.registered_kinds(), "Starting worker supervisor");
        info!(
            concurrency = self.settings.concurrency,
            poll_interval_ms = self.settings.poll_interval_ms,
            visibility_timeout_secs = self.settings.visibility_timeout_secs,
            "Worker configuration"
        );

        let (job_sender, job_receiver) = mpsc::channel(self.settings.concurrency * 2);
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency));

        let shutdown_token = self.shutdown_token.clone();
        tokio::spawn(async move {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Received shutdown signal, initiating graceful shutdown...");
            shutdown_token.cancel();
        });

        let fetcher_handle = tokio::spawn(
            Self::run_fetcher(
                self.pool.clone(),
                self.worker_id,
                self.settings.clone(),
                job_sender,
                self.shutdown_token.clone(),
            )
            .instrument(info_span!("fetcher", worker_id = %self.worker_id)),
        );

        let processor_handle = tokio::spawn(
            Self::run_processor(
                self.pool.clone(),
                self.registry.clone(),
                self.settings.clone(),
                job_receiver,
                semaphore.clone(),
                self.shutdown_token.clone(),
            )
            .instrument(info_span!("processor", worker_id = %self.worker_id)),
        );

        self.shutdown_token.cancelled().await;
        info!("Shutdown initiated, waiting for tasks to complete...");

        // Every permit back means every in-flight job has finished.
        let _permits = semaphore
            .acquire_many(self.settings.concurrency as u32)
            .await?;
        info!("All jobs completed, shutting down");

        let _ = tokio::join!(fetcher_handle, processor_handle);
        Ok(())
    }

    async fn run_fetcher(
        pool: PgPool,
        worker_id: Uuid,
        settings: WorkerSettings,
        job_sender: mpsc::Sender<Job>,
        shutdown_token: CancellationToken,
    ) -> Result<()> {
        let mut poll_interval = interval(Duration::from_millis(settings.poll_interval_ms));

        loop {
            tokio::select! {
                _ = shutdown_token.cancelled() => {
                    info!("Fetcher shutting down");
                    break;
                }
                _ = poll_interval.tick() => {
                    match JobRepository::fetch_due_jobs(
                        &pool,
                        settings.concurrency as i64,
                        worker_id,
                        settings.visibility_timeout_secs,
                    )
                    .await
                    {
                        Ok(jobs) => {
                            debug!("Fetched {} jobs", jobs.len());
                            for job in jobs {
                                if job_sender.send(job).await.is_err() {
                                    warn!("Job receiver dropped, stopping fetcher");
                                    return Ok(());
                                }
                            }
                        }
                        Err(e) => {
                            error!("Failed to fetch jobs: {}", e);
                            sleep(Duration::from_millis(1000)).await;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn run_processor(
        pool: PgPool,
        registry: Arc<JobRegistry>,
        settings: WorkerSettings,
        mut job_receiver: mpsc::Receiver<Job>,
        semaphore: Arc<Semaphore>,
        shutdown_token: CancellationToken,
    ) -> Result<()> {
        while let Some(job) = tokio::select! {
            _ = shutdown_token.cancelled() => None,
            job = job_receiver.recv() => job,
        } {
            let permit = semaphore.clone().acquire_owned().await?;
            let pool = pool.clone();
            let registry = registry.clone();
            let settings = settings.clone();

            let span = info_span!("job", id = %job.id, kind = %job.kind, attempt = job.attempts);
            tokio::spawn(
                async move {
                    let _permit = permit;
                    Self::process_job(pool, registry, settings, job).await;
                }
                .instrument(span),
            );
        }

        info!("Processor shutting down");
        Ok(())
    }

    async fn process_job(
        pool: PgPool,
        registry: Arc<JobRegistry>,
        settings: WorkerSettings,
        job: Job,
    ) {
        info!("Processing job {} (attempt {})", job.id, job.attempts + 1);

        let handler = match registry.handler(&job.kind) {
            Ok(handler) => handler,
            Err(e) => {
                error!("Failed to find handler for job {}: {}", job.id, e);
                let _ = JobRepository::mark_failure(
                    &pool,
                    job.id,
                    &format!("Failed to find handler: {}", e),
                    None,
                    0,
                )
                .await;
                return;
            }
        };

        let budget = Duration::from_secs(job.timeout_secs.max(1) as u64);
        let span = info_span!("job_execution", id = %job.id, kind = %job.kind);
        let work = handler.run(job.payload.clone(), span.clone()).instrument(span);
        let (pool_ref, job_id) = (&pool, job.id);
        let visibility = settings.visibility_timeout_secs;
        let probe = move || Self::heartbeat(pool_ref, job_id, visibility);

        match execute_with_budget(work, budget, HEARTBEAT_INTERVAL, probe).await {
            Execution::Finished(Ok(())) => {
                info!("Job {} completed successfully", job.id);
                if let Err(e) = JobRepository::mark_success(&pool, job.id).await {
                    error!("Failed to mark job {} as successful: {}", job.id, e);
                }
            }
            Execution::Finished(Err(e)) => {
                Self::handle_failure(&pool, &settings, &job, &e.to_string()).await;
            }
            Execution::TimedOut => {
                let reason = format!("Job timed out after {}s", budget.as_secs());
                warn!(job_id = %job.id, "{}", reason);
                handler.on_abandoned(job.payload.clone(), &reason).await;
                if let Err(e) =
                    JobRepository::mark_failure(&pool, job.id, &reason, None, 0).await
                {
                    error!("Failed to mark job {} as timed out: {}", job.id, e);
                }
            }
            Execution::Cancelled => {
                info!("Job {} cancelled while running", job.id);
                handler
                    .on_abandoned(job.payload.clone(), "Job was cancelled")
                    .await;
            }
        }
    }

    /// Extends the job's visibility and reports whether it has been cancelled.
    async fn heartbeat(pool: &PgPool, job_id: Uuid, visibility_timeout_secs: i64) -> bool {
        if let Err(e) = JobRepository::extend_visibility(pool, job_id, visibility_timeout_secs).await
        {
            warn!(%job_id, error = %e, "Failed to extend job visibility");
        }
        match JobRepository::status(pool, job_id).await {
            Ok(status) => status == Some(JobStatus::Cancelled),
            Err(e) => {
                warn!(%job_id, error = %e, "Failed to poll job status");
                false
            }
        }
    }

    async fn handle_failure(pool: &PgPool, settings: &WorkerSettings, job: &Job, error: &str) {
        let attempt = job.attempts + 1;
        error!("Job {} failed (attempt {}): {}", job.id, attempt, error);

        if attempt < job.max_attempts {
            let backoff_delay = calculate_backoff_delay(attempt, settings.base_backoff_secs);
            let next_run_at = Utc::now() + chrono::Duration::seconds(backoff_delay.as_secs() as i64);

            info!(
                "Job {} will retry in {} seconds (attempt {}/{})",
                job.id,
                backoff_delay.as_secs(),
                attempt + 1,
                job.max_attempts
            );

            if let Err(retry_err) = JobRepository::mark_failure(
                pool,
                job.id,
                error,
                Some(next_run_at),
                backoff_delay.as_secs() as i32,
            )
            .await
            {
                error!("Failed to schedule retry for job {}: {}", job.id, retry_err);
            }
        } else {
            info!("Job {} permanently failed after {} attempts", job.id, attempt);
            if let Err(fail_err) = JobRepository::mark_failure(pool, job.id, error, None, 0).await {
                error!("Failed to mark job {} as permanently failed: {}", job.id, fail_err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TICK: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_finished_work_is_returned() {
        let outcome = execute_with_budget(
            async { Ok(()) },
            Duration::from_secs(5),
            TICK,
            || async { false },
        )
        .await;
        assert!(matches!(outcome, Execution::Finished(Ok(()))));

        let outcome = execute_with_budget(
            async { Err(anyhow::anyhow!("boom")) },
            Duration::from_secs(5),
            TICK,
            || async { false },
        )
        .await;
        match outcome {
            Execution::Finished(Err(e)) => assert_eq!(e.to_string(), "boom"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_budget_exhaustion_times_out() {
        let outcome = execute_with_budget(
            async {
                sleep(Duration::from_secs(30)).await;
                Ok(())
            },
            Duration::from_millis(50),
            TICK,
            || async { false },
        )
        .await;
        assert!(matches!(outcome, Execution::TimedOut));
    }

    #[tokio::test]
    async fn test_cancellation_observed_on_heartbeat() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();

        let outcome = execute_with_budget(
            async {
                sleep(Duration::from_secs(30)).await;
                Ok(())
            },
            Duration::from_secs(30),
            TICK,
            move || {
                let seen = counter.fetch_add(1, Ordering::SeqCst);
                async move { seen >= 2 }
            },
        )
        .await;

        assert!(matches!(outcome, Execution::Cancelled));
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }
}
