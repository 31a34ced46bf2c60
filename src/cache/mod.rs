//! Ephemeral key/value storage with per-key expiry.
//!
//! Run records, dispatch locks and the progress mirror all live here. Nothing
//! stored through this module is authoritative: every entry expires on its own
//! and readers must treat a miss as "unknown", not as an error.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryKvStore;
pub use postgres::PgKvStore;

/// TTL shared by run records, dispatch locks and progress entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("cache value could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the live value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Stores `value` under `key`, replacing any previous value and TTL.
    async fn set_ex(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;

    /// Removes `key`. Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Removes `key` only while it still holds `expected`.
    async fn delete_if(&self, key: &str, expected: &Value) -> Result<bool, CacheError>;

    /// Cheap reachability check used by readiness probes.
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Key helpers. Centralised so the API and worker processes agree on layout.
pub mod keys {
    use uuid::Uuid;

    pub fn run(run_id: Uuid) -> String {
        format!("run:{}", run_id)
    }

    pub fn run_job(run_id: Uuid) -> String {
        format!("run_job:{}", run_id)
    }

    pub fn dispatch_lock(document_id: Uuid) -> String {
        format!("doc_job:{}", document_id)
    }

    pub fn document_progress(document_id: Uuid) -> String {
        format!("doc_progress:{}", document_id)
    }
}
