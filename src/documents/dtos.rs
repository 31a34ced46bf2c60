use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{Document, DocumentStatus};

pub const MAX_NAME_CHARS: usize = 255;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateDocumentRequest {
    /// Unique display name, 1 to 255 characters.
    pub name: String,
    /// Unique http(s) URL of the page to summarize.
    pub url: String,
}

impl CreateDocumentRequest {
    pub fn validate(&self) -> Result<(), String> {
        let name_chars = self.name.chars().count();
        if name_chars == 0 {
            return Err("name must not be empty".to_string());
        }
        if name_chars > MAX_NAME_CHARS {
            return Err(format!("name must be at most {} characters", MAX_NAME_CHARS));
        }
        validate_http_url(&self.url)
    }
}

/// Accepts only absolute http/https URLs with a host.
pub fn validate_http_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| format!("url is not a valid URL: {}", e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err("url must use http or https".to_string());
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err("url must have a host".to_string());
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub status: DocumentStatus,
    pub name: String,
    pub url: String,
    pub summary: Option<String>,
    /// Fraction complete, 0.0 to 1.0.
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(document: Document) -> Self {
        Self {
            id: document.id,
            status: document.status,
            name: document.name,
            url: document.url,
            summary: document.summary,
            progress: document.progress,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}
