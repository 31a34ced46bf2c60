use async_trait::async_trait;
use serde_json::Value;
use tracing::Span;

/// Executes one kind of job. Handlers own their dependencies; the worker only
/// hands over the payload.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn run(&self, payload: Value, span: Span) -> anyhow::Result<()>;

    fn kind(&self) -> &'static str;

    /// Called when the worker stops `run` early, because the job's time budget
    /// ran out or it was cancelled. Lets the handler leave its records in a
    /// terminal state.
    async fn on_abandoned(&self, _payload: Value, _reason: &str) {}
}
