use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{Span, error, info, instrument, warn};

use crate::cache::{KvStore, keys};
use crate::entities::DocumentStatus;
use crate::jobs::{JobHandler, PipelineJob};
use crate::pipeline::{PageFetcher, PipelineExecutor, PipelineOutcome, Summarizer};
use crate::progress::ProgressMirror;
use crate::repositories::DocumentRepository;
use crate::runs::{DocumentPipelineInput, DocumentPipelineResult, RunPayload, RunStore};

pub const KIND: &str = "document_pipeline";

/// Drives one document through the pipeline and records the outcome on its run.
pub struct DocumentPipelineHandler {
    executor: PipelineExecutor,
    documents: Arc<dyn DocumentRepository>,
    runs: RunStore,
    progress: ProgressMirror,
    kv: Arc<dyn KvStore>,
}

impl DocumentPipelineHandler {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        fetcher: Arc<dyn PageFetcher>,
        summarizer: Arc<dyn Summarizer>,
        kv: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            executor: PipelineExecutor::new(documents.clone(), fetcher, summarizer, kv.clone()),
            documents,
            runs: RunStore::new(kv.clone()),
            progress: ProgressMirror::new(kv.clone()),
            kv,
        }
    }

    async fn finish(&self, job: &PipelineJob, outcome: &PipelineOutcome) -> anyhow::Result<()> {
        let completed = |status: DocumentStatus, summary_length: Option<usize>| RunPayload::DocumentPipeline {
            input: DocumentPipelineInput {
                document_id: job.document_id,
            },
            result: Some(DocumentPipelineResult {
                document_id: job.document_id,
                status,
                summary_length,
            }),
        };

        match outcome {
            PipelineOutcome::Succeeded { summary_chars } => {
                self.runs
                    .complete(
                        job.run_id,
                        completed(DocumentStatus::Success, Some(*summary_chars)),
                    )
                    .await?;
                Ok(())
            }
            PipelineOutcome::AlreadyTerminal(status) => {
                self.runs.complete(job.run_id, completed(*status, None)).await?;
                Ok(())
            }
            PipelineOutcome::NotFound => {
                self.runs.fail(job.run_id, "Document not found").await?;
                anyhow::bail!("Document {} not found", job.document_id)
            }
            PipelineOutcome::Interrupted => {
                self.runs
                    .fail(job.run_id, "Document left the pipeline before completion")
                    .await?;
                Ok(())
            }
            PipelineOutcome::Failed { error } => {
                self.runs.fail(job.run_id, error).await?;
                anyhow::bail!("Pipeline failed: {}", error)
            }
        }
    }
}

#[async_trait]
impl JobHandler for DocumentPipelineHandler {
    #[instrument(skip_all, fields(document_id, run_id))]
    async fn run(&self, payload: Value, span: Span) -> anyhow::Result<()> {
        let job: PipelineJob = serde_json::from_value(payload)?;
        span.record("document_id", tracing::field::display(job.document_id));
        span.record("run_id", tracing::field::display(job.run_id));

        let outcome = match self.executor.run(job.document_id, Some(job.run_id)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Store failure while recording pipeline state");
                if let Err(fail_err) = self.runs.fail(job.run_id, &e.to_string()).await {
                    warn!(run_id = %job.run_id, error = %fail_err, "Failed to record run failure");
                }
                return Err(e.into());
            }
        };

        info!(?outcome, "Pipeline run finished");
        self.finish(&job, &outcome).await
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    async fn on_abandoned(&self, payload: Value, reason: &str) {
        let Ok(job) = serde_json::from_value::<PipelineJob>(payload) else {
            return;
        };
        warn!(document_id = %job.document_id, reason, "Pipeline run abandoned");

        let lock = Value::String(job.run_id.to_string());
        if let Err(e) = self
            .kv
            .delete_if(&keys::dispatch_lock(job.document_id), &lock)
            .await
        {
            warn!(document_id = %job.document_id, error = %e, "Failed to release dispatch lock");
        }
        if let Err(e) = self.documents.fail(job.document_id, reason).await {
            error!(document_id = %job.document_id, error = %e, "Failed to mark document failed");
        }
        self.progress
            .publish(job.document_id, DocumentStatus::Failed, None, Some(reason))
            .await;
        if let Err(e) = self.runs.fail(job.run_id, reason).await {
            warn!(run_id = %job.run_id, error = %e, "Failed to record run failure");
        }
    }
}
