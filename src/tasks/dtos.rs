use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::documents::dtos::validate_http_url;
use crate::runs::{Run, RunStatus};
use crate::summarizer::ModelInfo;

pub const MAX_TEXT_CHARS: usize = 100_000;
pub const MIN_SUMMARY_LENGTH: usize = 50;
pub const MAX_SUMMARY_LENGTH: usize = 2000;

fn default_max_length() -> Option<usize> {
    Some(500)
}

fn default_language() -> String {
    "en".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SummarizeRequest {
    pub text: String,
    /// Model to use instead of the configured default.
    pub model: Option<String>,
    #[serde(default = "default_max_length")]
    pub max_length: Option<usize>,
    #[serde(default = "default_language")]
    pub language: String,
}

impl SummarizeRequest {
    pub fn validate(&self) -> Result<(), String> {
        let chars = self.text.chars().count();
        if chars == 0 {
            return Err("text must not be empty".to_string());
        }
        if chars > MAX_TEXT_CHARS {
            return Err(format!("text must be at most {} characters", MAX_TEXT_CHARS));
        }
        if let Some(max) = self.max_length
            && !(MIN_SUMMARY_LENGTH..=MAX_SUMMARY_LENGTH).contains(&max)
        {
            return Err(format!(
                "max_length must be between {} and {}",
                MIN_SUMMARY_LENGTH, MAX_SUMMARY_LENGTH
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ExtractRequest {
    pub url: String,
    #[serde(default = "default_true")]
    pub include_links: bool,
    #[serde(default)]
    pub include_images: bool,
    #[serde(default = "default_language")]
    pub language: String,
}

impl ExtractRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_http_url(&self.url)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskAccepted {
    pub task_id: Uuid,
    pub status: String,
    pub message: String,
}

impl TaskAccepted {
    pub fn new(task_id: Uuid, what: &str) -> Self {
        Self {
            task_id,
            status: "processing".to_string(),
            message: format!("{} task created successfully", what),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProgressResponse {
    pub task_id: Uuid,
    pub status: RunStatus,
    /// Percentage, 0 to 100.
    pub progress: f64,
    pub message: String,
    #[schema(value_type = Option<Object>)]
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Run> for ProgressResponse {
    fn from(run: Run) -> Self {
        Self {
            task_id: run.id,
            message: progress_message(&run),
            status: run.status,
            progress: run.progress,
            result: run.payload.result_json(),
            created_at: run.created_at,
            updated_at: run.updated_at,
        }
    }
}

/// Human readable description of where a run is.
pub fn progress_message(run: &Run) -> String {
    match run.status {
        RunStatus::Pending => "Task is queued and waiting to be processed".to_string(),
        RunStatus::Processing => match run.progress {
            p if p < 25.0 => "Initializing task...",
            p if p < 50.0 => "Processing task...",
            p if p < 75.0 => "Finalizing task...",
            _ => "Almost done...",
        }
        .to_string(),
        RunStatus::Completed => "Task completed successfully".to_string(),
        RunStatus::Failed => format!(
            "Task failed: {}",
            run.error_message.as_deref().unwrap_or("Unknown error")
        ),
        RunStatus::Cancelled => "Task was cancelled".to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CancelResponse {
    pub task_id: Uuid,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}
