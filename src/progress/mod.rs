//! Read-optimised mirror of a document's latest stage, progress and error.
//!
//! Writes are best-effort: a cache failure is logged and swallowed so it can
//! never fail a pipeline stage. The durable `documents` row stays authoritative.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::cache::{CacheError, DEFAULT_TTL, KvStore, keys};
use crate::entities::DocumentStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProgressRecord {
    pub document_id: Uuid,
    pub stage: DocumentStatus,
    pub progress: f64,
    pub timestamp: DateTime<Utc>,
    pub error_message: Option<String>,
}

#[derive(Clone)]
pub struct ProgressMirror {
    kv: Arc<dyn KvStore>,
}

impl ProgressMirror {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Records `stage` for `document_id`. `progress` defaults to the stage's checkpoint.
    pub async fn publish(
        &self,
        document_id: Uuid,
        stage: DocumentStatus,
        progress: Option<f64>,
        error_message: Option<&str>,
    ) {
        let record = ProgressRecord {
            document_id,
            stage,
            progress: progress.unwrap_or_else(|| stage.checkpoint()),
            timestamp: Utc::now(),
            error_message: error_message.map(str::to_owned),
        };

        if let Err(e) = self.write(&record).await {
            warn!(%document_id, stage = stage.as_str(), error = %e, "Failed to mirror progress");
        }
    }

    async fn write(&self, record: &ProgressRecord) -> Result<(), CacheError> {
        let value = serde_json::to_value(record)?;
        self.kv
            .set_ex(&keys::document_progress(record.document_id), value, DEFAULT_TTL)
            .await
    }

    /// Latest mirrored record, `None` once the entry has expired.
    pub async fn latest(&self, document_id: Uuid) -> Result<Option<ProgressRecord>, CacheError> {
        match self.kv.get(&keys::document_progress(document_id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}
