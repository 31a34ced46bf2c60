use sqlx::{Pool, Postgres};
use std::sync::Arc;

use crate::cache::{KvStore, PgKvStore};
use crate::jobs::{JobDispatcher, JobQueue, PgJobQueue};
use crate::progress::ProgressMirror;
use crate::repositories::{DocumentRepository, PgDocumentRepository};
use crate::runs::RunStore;
use crate::summarizer::OllamaClient;

/// Handles shared by every request. Built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: Pool<Postgres>,
    pub documents: Arc<dyn DocumentRepository>,
    pub kv: Arc<dyn KvStore>,
    pub dispatcher: JobDispatcher,
    pub progress: ProgressMirror,
    pub ollama: Arc<OllamaClient>,
}

impl AppState {
    pub fn new(pool: Pool<Postgres>, ollama: OllamaClient) -> Self {
        let documents = Arc::new(PgDocumentRepository::new(pool.clone()));
        let kv: Arc<dyn KvStore> = Arc::new(PgKvStore::new(pool.clone()));
        let queue = Arc::new(PgJobQueue::new(pool.clone()));
        Self::from_parts(pool, documents, kv, queue, Arc::new(ollama))
    }

    pub fn from_parts(
        db_pool: Pool<Postgres>,
        documents: Arc<dyn DocumentRepository>,
        kv: Arc<dyn KvStore>,
        queue: Arc<dyn JobQueue>,
        ollama: Arc<OllamaClient>,
    ) -> Self {
        Self {
            db_pool,
            documents,
            dispatcher: JobDispatcher::new(queue, kv.clone()),
            progress: ProgressMirror::new(kv.clone()),
            kv,
            ollama,
        }
    }

    pub fn runs(&self) -> &RunStore {
        self.dispatcher.runs()
    }
}
