pub mod document;

pub use document::{DocumentRepository, PgDocumentRepository};

#[cfg(test)]
pub use document::MockDocumentRepository;

use thiserror::Error;

/// Failures talking to the durable store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
