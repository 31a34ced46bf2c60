//! The document pipeline: FETCHING -> PARSING -> SUMMARIZING -> SUCCESS | FAILED.

pub mod executor;

pub use executor::{PipelineExecutor, PipelineOutcome, StageError};

use async_trait::async_trait;

use crate::fetcher::{FetchError, PageResponse, SafeFetcher};
use crate::summarizer::{OllamaClient, SummarizeError};

/// Source of page bodies for the FETCHING stage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<PageResponse, FetchError>;
}

#[async_trait]
impl PageFetcher for SafeFetcher {
    async fn fetch_page(&self, url: &str) -> Result<PageResponse, FetchError> {
        self.fetch(url).await
    }
}

/// Text generation for the SUMMARIZING stage and for ad-hoc summarize runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        text: &str,
        language_hint: Option<String>,
    ) -> Result<String, SummarizeError>;

    async fn summarize_text(
        &self,
        text: &str,
        model: Option<String>,
        max_length: Option<usize>,
        language: String,
    ) -> Result<String, SummarizeError>;

    fn default_model(&self) -> String;
}

#[async_trait]
impl Summarizer for OllamaClient {
    async fn summarize(
        &self,
        text: &str,
        language_hint: Option<String>,
    ) -> Result<String, SummarizeError> {
        OllamaClient::summarize(self, text, language_hint.as_deref()).await
    }

    async fn summarize_text(
        &self,
        text: &str,
        model: Option<String>,
        max_length: Option<usize>,
        language: String,
    ) -> Result<String, SummarizeError> {
        OllamaClient::summarize_text(self, text, model.as_deref(), max_length, &language).await
    }

    fn default_model(&self) -> String {
        OllamaClient::default_model(self).to_string()
    }
}
