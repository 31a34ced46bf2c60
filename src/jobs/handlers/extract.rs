use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{Span, info, instrument, warn};
use uuid::Uuid;

use crate::cache::KvStore;
use crate::extractor::{self, collect_images, collect_links};
use crate::jobs::{JobHandler, TaskJob};
use crate::pipeline::PageFetcher;
use crate::runs::{ExtractInput, ExtractResult, RunPayload, RunStore};

pub const KIND: &str = "extract";

/// Ad-hoc fetch-and-extract of a single URL.
pub struct ExtractHandler {
    fetcher: Arc<dyn PageFetcher>,
    runs: RunStore,
}

impl ExtractHandler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, kv: Arc<dyn KvStore>) -> Self {
        Self {
            fetcher,
            runs: RunStore::new(kv),
        }
    }

    async fn step(&self, run_id: Uuid, progress: f64) -> anyhow::Result<bool> {
        Ok(self.runs.mark_processing(run_id, progress).await?.is_some())
    }

    async fn extract(&self, job: &TaskJob<ExtractInput>) -> anyhow::Result<()> {
        let input = &job.input;
        if !self.step(job.run_id, 25.0).await? {
            return Ok(());
        }

        let page = self.fetcher.fetch_page(&input.url).await?;
        if !self.step(job.run_id, 50.0).await? {
            return Ok(());
        }

        let content = extractor::extract(&page)?;
        if !self.step(job.run_id, 75.0).await? {
            return Ok(());
        }

        let options = &input.options;
        let links = options
            .include_links
            .then(|| collect_links(&page.body_utf8, &page.url_final));
        let images = options
            .include_images
            .then(|| collect_images(&page.body_utf8, &page.url_final));
        info!(
            chars = content.text.chars().count(),
            strategy = ?content.strategy,
            "Content extracted"
        );

        let result = ExtractResult {
            extracted_content: content.text,
            url: input.url.clone(),
            extraction_options: options.clone(),
            links,
            images,
        };
        self.runs
            .complete(
                job.run_id,
                RunPayload::Extract {
                    input: input.clone(),
                    result: Some(result),
                },
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for ExtractHandler {
    #[instrument(skip_all, fields(run_id, url))]
    async fn run(&self, payload: Value, span: Span) -> anyhow::Result<()> {
        let job: TaskJob<ExtractInput> = serde_json::from_value(payload)?;
        span.record("run_id", tracing::field::display(job.run_id));
        span.record("url", job.input.url.as_str());

        if let Err(e) = self.extract(&job).await {
            if let Err(fail_err) = self.runs.fail(job.run_id, &e.to_string()).await {
                warn!(run_id = %job.run_id, error = %fail_err, "Failed to record run failure");
            }
            return Err(e);
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    async fn on_abandoned(&self, payload: Value, reason: &str) {
        if let Ok(job) = serde_json::from_value::<TaskJob<ExtractInput>>(payload)
            && let Err(e) = self.runs.fail(job.run_id, reason).await
        {
            warn!(run_id = %job.run_id, error = %e, "Failed to record run failure");
        }
    }
}
