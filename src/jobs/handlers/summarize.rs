use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{Span, info, instrument, warn};
use uuid::Uuid;

use crate::cache::KvStore;
use crate::jobs::{JobHandler, TaskJob};
use crate::pipeline::Summarizer;
use crate::runs::{RunPayload, RunStore, SummarizeInput, SummarizeResult};

pub const KIND: &str = "summarize";

/// Ad-hoc summarization of caller-supplied text.
pub struct SummarizeHandler {
    summarizer: Arc<dyn Summarizer>,
    runs: RunStore,
}

impl SummarizeHandler {
    pub fn new(summarizer: Arc<dyn Summarizer>, kv: Arc<dyn KvStore>) -> Self {
        Self {
            summarizer,
            runs: RunStore::new(kv),
        }
    }

    /// `false` once the run has been cancelled, finished or expired.
    async fn step(&self, run_id: Uuid, progress: f64) -> anyhow::Result<bool> {
        Ok(self.runs.mark_processing(run_id, progress).await?.is_some())
    }

    async fn summarize(&self, job: &TaskJob<SummarizeInput>) -> anyhow::Result<()> {
        let input = &job.input;
        if !self.step(job.run_id, 25.0).await? {
            return Ok(());
        }

        let model = input
            .model
            .clone()
            .unwrap_or_else(|| self.summarizer.default_model());
        if !self.step(job.run_id, 50.0).await? {
            return Ok(());
        }

        let summary = self
            .summarizer
            .summarize_text(
                &input.text,
                Some(model.clone()),
                input.max_length,
                input.language.clone(),
            )
            .await?;
        if !self.step(job.run_id, 75.0).await? {
            return Ok(());
        }

        let original_length = input.text.chars().count();
        let summary_length = summary.chars().count();
        let compression_ratio = if original_length > 0 {
            summary_length as f64 / original_length as f64
        } else {
            0.0
        };
        info!(original_length, summary_length, "Summary generated");

        let result = SummarizeResult {
            summary,
            original_length,
            summary_length,
            compression_ratio,
            model_used: model,
            language: input.language.clone(),
        };
        self.runs
            .complete(
                job.run_id,
                RunPayload::Summarize {
                    input: input.clone(),
                    result: Some(result),
                },
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobHandler for SummarizeHandler {
    #[instrument(skip_all, fields(run_id))]
    async fn run(&self, payload: Value, span: Span) -> anyhow::Result<()> {
        let job: TaskJob<SummarizeInput> = serde_json::from_value(payload)?;
        span.record("run_id", tracing::field::display(job.run_id));

        if let Err(e) = self.summarize(&job).await {
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
        if let Ok(job) = serde_json::from_value::<TaskJob<SummarizeInput>>(payload)
            && let Err(e) = self.runs.fail(job.run_id, reason).await
        {
            warn!(run_id = %job.run_id, error = %e, "Failed to record run failure");
        }
    }
}
