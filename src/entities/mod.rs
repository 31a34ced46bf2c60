use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// --- PostgreSQL Enums ---
#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[sqlx(type_name = "document_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentStatus {
    Pending,
    Fetching,
    Parsing,
    Summarizing,
    Success,
    Failed,
}

impl DocumentStatus {
    /// Progress checkpoint written when a document enters this status.
    pub fn checkpoint(self) -> f64 {
        match self {
            Self::Pending => 0.0,
            Self::Fetching => 0.2,
            Self::Parsing => 0.4,
            Self::Summarizing => 0.9,
            Self::Success => 1.0,
            Self::Failed => 0.0,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Fetching => "FETCHING",
            Self::Parsing => "PARSING",
            Self::Summarizing => "SUMMARIZING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }
}

#[derive(sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Queued or running jobs still hold their document's dispatch lock.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }
}

/// --- Tables ---

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub status: DocumentStatus,
    pub summary: Option<String>,
    pub progress: f64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub kind: String,               // logical job name
    pub payload: serde_json::Value, // job data as JSONB
    pub run_at: DateTime<Utc>,      // next time the job is eligible
    pub attempts: i32,              // execution attempts so far
    pub max_attempts: i32,          // maximum attempts before giving up
    pub backoff_seconds: i32,       // populated when job fails
    pub timeout_secs: i32,          // wall-clock budget for one attempt
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub visibility_till: Option<DateTime<Utc>>, // set while "running"
    pub reserved_by: Option<Uuid>,              // worker instance id
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
