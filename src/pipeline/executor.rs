use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::cache::{KvStore, keys};
use crate::entities::DocumentStatus;
use crate::extractor::{self, ExtractError};
use crate::fetcher::FetchError;
use crate::pipeline::{PageFetcher, Summarizer};
use crate::progress::ProgressMirror;
use crate::repositories::{DocumentRepository, StoreError};
use crate::runs::RunStore;
use crate::summarizer::{MAX_SUMMARY_CHARS, SummarizeError, trim_to_sentence_boundary};

/// Parsed text shorter than this (after trimming) fails the PARSING stage.
const MIN_PARSED_CHARS: usize = 10;

/// Why a pipeline run ended in FAILED. The display text is what lands in
/// `last_error`.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("{0}")]
    Extract(#[from] ExtractError),

    #[error("Parsed content is empty or too short (length: {0})")]
    ContentTooShort(usize),

    #[error("Failed to summarize text: {0}")]
    Summarize(#[from] SummarizeError),

    #[error("Failed to summarize text: model returned an empty summary")]
    EmptySummary,

    #[error("{0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// Document was already SUCCESS or FAILED; nothing was touched.
    AlreadyTerminal(DocumentStatus),
    NotFound,
    /// The row left the pipeline underneath us (reset to terminal or deleted).
    Interrupted,
    Succeeded { summary_chars: usize },
    Failed { error: String },
}

/// Runs one document through the pipeline.
///
/// Every stage entry is one store write plus a mirror update. Stage failures
/// are converted into a FAILED document here and never escape; the only `Err`
/// is a store failure while recording that FAILED state. The dispatch lock for
/// the document is released before the terminal write, so a resubmission that
/// lands after it dispatches a fresh run. When `run_id` is given, the lock is
/// only released while it still names that run.
pub struct PipelineExecutor {
    documents: Arc<dyn DocumentRepository>,
    fetcher: Arc<dyn PageFetcher>,
    summarizer: Arc<dyn Summarizer>,
    progress: ProgressMirror,
    runs: RunStore,
    kv: Arc<dyn KvStore>,
}

impl PipelineExecutor {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        fetcher: Arc<dyn PageFetcher>,
        summarizer: Arc<dyn Summarizer>,
        kv: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            documents,
            fetcher,
            summarizer,
            progress: ProgressMirror::new(kv.clone()),
            runs: RunStore::new(kv.clone()),
            kv,
        }
    }

    pub async fn run(
        &self,
        document_id: Uuid,
        run_id: Option<Uuid>,
    ) -> Result<PipelineOutcome, StoreError> {
        let span = info_span!("pipeline", %document_id);
        let result = self.drive(document_id, run_id).instrument(span).await;
        self.release_lock(document_id, run_id).await;
        result
    }

    async fn drive(
        &self,
        document_id: Uuid,
        run_id: Option<Uuid>,
    ) -> Result<PipelineOutcome, StoreError> {
        let Some(document) = self.documents.find_by_id(document_id).await? else {
            error!("Document not found");
            return Ok(PipelineOutcome::NotFound);
        };

        if document.status.is_terminal() {
            info!(status = document.status.as_str(), "Document already terminal, skipping");
            return Ok(PipelineOutcome::AlreadyTerminal(document.status));
        }

        match self.stages(document_id, &document.url, run_id).await {
            Ok(Some(summary_chars)) => {
                info!(summary_chars, "Pipeline completed successfully");
                Ok(PipelineOutcome::Succeeded { summary_chars })
            }
            Ok(None) => {
                warn!("Document left the pipeline mid-run");
                Ok(PipelineOutcome::Interrupted)
            }
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "Pipeline failed");
                self.release_lock(document_id, run_id).await;
                self.documents.fail(document_id, &message).await?;
                self.progress
                    .publish(document_id, DocumentStatus::Failed, None, Some(&message))
                    .await;
                Ok(PipelineOutcome::Failed { error: message })
            }
        }
    }

    /// `Ok(None)` when a stage write found the document no longer in flight.
    async fn stages(
        &self,
        document_id: Uuid,
        url: &str,
        run_id: Option<Uuid>,
    ) -> Result<Option<usize>, StageError> {
        info!(url, "Stage FETCHING");
        if !self.checkpoint(document_id, DocumentStatus::Fetching, run_id).await? {
            return Ok(None);
        }
        let page = self.fetcher.fetch_page(url).await?;

        info!(bytes = page.body_raw.len(), "Stage PARSING");
        if !self.checkpoint(document_id, DocumentStatus::Parsing, run_id).await? {
            return Ok(None);
        }
        let content = extractor::extract(&page)?;
        let parsed_chars = content.text.trim().chars().count();
        if parsed_chars < MIN_PARSED_CHARS {
            return Err(StageError::ContentTooShort(parsed_chars));
        }

        info!(parsed_chars, "Stage SUMMARIZING");
        if !self.checkpoint(document_id, DocumentStatus::Summarizing, run_id).await? {
            return Ok(None);
        }
        let language = extractor::detect_language(&content.text).map(|l| l.name.to_string());
        let generated = self.summarizer.summarize(&content.text, language).await?;

        let generated_chars = generated.chars().count();
        let summary = if generated_chars > MAX_SUMMARY_CHARS {
            warn!(generated_chars, "Summary over limit, trimming");
            trim_to_sentence_boundary(&generated, MAX_SUMMARY_CHARS)
        } else {
            generated.as_str()
        }
        .trim();
        if summary.is_empty() {
            return Err(StageError::EmptySummary);
        }

        self.release_lock(document_id, run_id).await;
        if !self.documents.complete(document_id, summary).await? {
            return Ok(None);
        }
        self.progress
            .publish(document_id, DocumentStatus::Success, Some(1.0), None)
            .await;

        Ok(Some(summary.chars().count()))
    }

    async fn checkpoint(
        &self,
        document_id: Uuid,
        stage: DocumentStatus,
        run_id: Option<Uuid>,
    ) -> Result<bool, StoreError> {
        if !self.documents.begin_stage(document_id, stage).await? {
            return Ok(false);
        }
        self.progress.publish(document_id, stage, None, None).await;

        if let Some(run_id) = run_id
            && let Err(e) = self
                .runs
                .mark_processing(run_id, stage.checkpoint() * 100.0)
                .await
        {
            warn!(%run_id, error = %e, "Failed to update run progress");
        }
        Ok(true)
    }

    async fn release_lock(&self, document_id: Uuid, run_id: Option<Uuid>) {
        let key = keys::dispatch_lock(document_id);
        let released = match run_id {
            Some(run_id) => self.kv.delete_if(&key, &Value::String(run_id.to_string())).await,
            None => self.kv.delete(&key).await,
        };
        if let Err(e) = released {
            warn!(%document_id, error = %e, "Failed to release dispatch lock");
        }
    }
}
