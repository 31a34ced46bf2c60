use anyhow::Result;
use precis::{
    cache::{KvStore, PgKvStore},
    config::Config,
    fetcher::SafeFetcher,
    jobs::{
        DocumentPipelineHandler, ExtractHandler, JobRegistry, SummarizeHandler, WorkerSupervisor,
    },
    repositories::PgDocumentRepository,
    summarizer::OllamaClient,
    telemetry,
};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

/// How often expired cache rows are swept.
const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    telemetry::init_tracing(config.log_format());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(config.database_url())
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let documents = Arc::new(PgDocumentRepository::new(pool.clone()));
    let cache = PgKvStore::new(pool.clone());
    let kv: Arc<dyn KvStore> = Arc::new(cache.clone());
    let fetcher = Arc::new(SafeFetcher::new(config.fetcher().clone())?);
    let ollama = Arc::new(OllamaClient::new(config.ollama().clone())?);

    if !ollama.check_health().await {
        warn!(base_url = %config.ollama().base_url, "Ollama is not reachable yet");
    }

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match cache.purge_expired().await {
                Ok(purged) if purged > 0 => info!(purged, "Purged expired cache entries"),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Cache purge failed"),
            }
        }
    });

    let mut registry = JobRegistry::new();
    registry.register(DocumentPipelineHandler::new(
        documents,
        fetcher.clone(),
        ollama.clone(),
        kv.clone(),
    ));
    registry.register(SummarizeHandler::new(ollama, kv.clone()));
    registry.register(ExtractHandler::new(fetcher, kv));

    let supervisor = WorkerSupervisor::new(pool, registry, config.worker().clone());
    supervisor.run().await
}
