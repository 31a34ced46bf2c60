//! Ephemeral run records: one per enqueued unit of work.
//!
//! A run is stored as JSON under `run:{id}` with a one hour TTL. Its payload is
//! a tagged variant per run type so each carries a strongly shaped input and
//! result; the loose JSON form only exists at the storage/HTTP boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::cache::{CacheError, DEFAULT_TTL, KvStore, keys};
use crate::entities::DocumentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPipelineInput {
    pub document_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPipelineResult {
    pub document_id: Uuid,
    pub status: DocumentStatus,
    pub summary_length: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizeInput {
    pub text: String,
    pub model: Option<String>,
    pub max_length: Option<usize>,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SummarizeResult {
    pub summary: String,
    pub original_length: usize,
    pub summary_length: usize,
    pub compression_ratio: f64,
    pub model_used: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExtractOptions {
    pub include_links: bool,
    pub include_images: bool,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractInput {
    pub url: String,
    #[serde(flatten)]
    pub options: ExtractOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExtractResult {
    pub extracted_content: String,
    pub url: String,
    pub extraction_options: ExtractOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
}

/// Per-type input and (once completed) result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunPayload {
    DocumentPipeline {
        input: DocumentPipelineInput,
        result: Option<DocumentPipelineResult>,
    },
    Summarize {
        input: SummarizeInput,
        result: Option<SummarizeResult>,
    },
    Extract {
        input: ExtractInput,
        result: Option<ExtractResult>,
    },
}

impl RunPayload {
    pub fn document_pipeline(document_id: Uuid) -> Self {
        Self::DocumentPipeline {
            input: DocumentPipelineInput { document_id },
            result: None,
        }
    }

    pub fn summarize(input: SummarizeInput) -> Self {
        Self::Summarize {
            input,
            result: None,
        }
    }

    pub fn extract(input: ExtractInput) -> Self {
        Self::Extract {
            input,
            result: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::DocumentPipeline { .. } => "document_pipeline",
            Self::Summarize { .. } => "summarize",
            Self::Extract { .. } => "extract",
        }
    }

    /// Result rendered as JSON, `None` until the run has completed.
    pub fn result_json(&self) -> Option<Value> {
        let value = match self {
            Self::DocumentPipeline { result, .. } => serde_json::to_value(result.as_ref()?),
            Self::Summarize { result, .. } => serde_json::to_value(result.as_ref()?),
            Self::Extract { result, .. } => serde_json::to_value(result.as_ref()?),
        };
        value.ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    #[serde(flatten)]
    pub payload: RunPayload,
    pub status: RunStatus,
    /// Percentage, 0 to 100.
    pub progress: f64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn new(payload: RunPayload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            payload,
            status: RunStatus::Pending,
            progress: 0.0,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn transition(&mut self, status: RunStatus, progress: f64) {
        let now = Utc::now();
        self.status = status;
        self.progress = progress.clamp(0.0, 100.0);
        self.updated_at = now;
        if status.is_finished() {
            self.completed_at = Some(now);
        }
    }
}

/// Storage for [`Run`] records and their job pointers.
#[derive(Clone)]
pub struct RunStore {
    kv: Arc<dyn KvStore>,
}

impl RunStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn create(&self, payload: RunPayload) -> Result<Run, CacheError> {
        let run = Run::new(payload);
        self.save(&run).await?;
        Ok(run)
    }

    pub async fn get(&self, run_id: Uuid) -> Result<Option<Run>, CacheError> {
        match self.kv.get(&keys::run(run_id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, run: &Run) -> Result<(), CacheError> {
        let value = serde_json::to_value(run)?;
        self.kv.set_ex(&keys::run(run.id), value, DEFAULT_TTL).await
    }

    /// Applies `f` to the stored run and refreshes its TTL.
    ///
    /// Runs that have expired, or already reached a finished status, are left
    /// untouched and `None` is returned.
    async fn modify<F>(&self, run_id: Uuid, f: F) -> Result<Option<Run>, CacheError>
    where
        F: FnOnce(&mut Run),
    {
        let Some(mut run) = self.get(run_id).await? else {
            return Ok(None);
        };
        if run.status.is_finished() {
            return Ok(None);
        }
        f(&mut run);
        self.save(&run).await?;
        Ok(Some(run))
    }

    pub async fn mark_processing(
        &self,
        run_id: Uuid,
        progress: f64,
    ) -> Result<Option<Run>, CacheError> {
        self.modify(run_id, |run| {
            run.transition(RunStatus::Processing, progress)
        })
        .await
    }

    /// Marks the run completed with `payload` carrying its result.
    pub async fn complete(
        &self,
        run_id: Uuid,
        payload: RunPayload,
    ) -> Result<Option<Run>, CacheError> {
        self.modify(run_id, |run| {
            run.payload = payload;
            run.transition(RunStatus::Completed, 100.0);
        })
        .await
    }

    pub async fn fail(&self, run_id: Uuid, message: &str) -> Result<Option<Run>, CacheError> {
        self.modify(run_id, |run| {
            run.error_message = Some(message.to_string());
            run.transition(RunStatus::Failed, 0.0);
        })
        .await
    }

    pub async fn cancel(&self, run_id: Uuid) -> Result<Option<Run>, CacheError> {
        self.modify(run_id, |run| run.transition(RunStatus::Cancelled, 0.0))
            .await
    }

    /// Remembers which queue job executes `run_id`.
    pub async fn attach_job(&self, run_id: Uuid, job_id: Uuid) -> Result<(), CacheError> {
        self.kv
            .set_ex(&keys::run_job(run_id), Value::String(job_id.to_string()), DEFAULT_TTL)
            .await
    }

    pub async fn job_for(&self, run_id: Uuid) -> Result<Option<Uuid>, CacheError> {
        let value = self.kv.get(&keys::run_job(run_id)).await?;
        Ok(value
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok()))
    }
}
