use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{Document, DocumentStatus};
use crate::repositories::StoreError;

const DOCUMENT_COLUMNS: &str =
    "id, name, url, status, summary, progress, last_error, created_at, updated_at";

/// Durable storage for documents.
///
/// Every pipeline transition is a single statement so a concurrent reader never
/// observes a new status next to a stale progress, summary or error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>, StoreError>;

    async fn find_by_name_and_url(
        &self,
        name: &str,
        url: &str,
    ) -> Result<Option<Document>, StoreError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Document>, StoreError>;

    async fn find_by_url(&self, url: &str) -> Result<Option<Document>, StoreError>;

    /// Inserts a PENDING document. Returns `None` when the name or url is
    /// already taken, leaving the existing row untouched.
    async fn try_create(&self, name: &str, url: &str) -> Result<Option<Document>, StoreError>;

    /// Puts a document back to PENDING with summary, error and progress cleared.
    async fn reset_for_resummary(&self, id: Uuid) -> Result<Option<Document>, StoreError>;

    /// Enters `status` and raises progress to its checkpoint. Returns `false`
    /// if the document is missing or already terminal.
    async fn begin_stage(&self, id: Uuid, status: DocumentStatus) -> Result<bool, StoreError>;

    /// SUCCESS with `summary` and progress exactly 1.0.
    async fn complete(&self, id: Uuid, summary: &str) -> Result<bool, StoreError>;

    /// FAILED with `error` recorded and progress 0.0.
    async fn fail(&self, id: Uuid, error: &str) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, filter: &str, binds: &[&str]) -> Result<Option<Document>, StoreError> {
        let sql = format!("SELECT {} FROM documents WHERE {}", DOCUMENT_COLUMNS, filter);
        let mut query = sqlx::query_as::<_, Document>(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        Ok(query.fetch_optional(&self.pool).await?)
    }
}

#[async_trait]
impl DocumentRepository for PgDocumentRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        let sql = format!("SELECT {} FROM documents WHERE id = $1", DOCUMENT_COLUMNS);
        let document = sqlx::query_as::<_, Document>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(document)
    }

    async fn find_by_name_and_url(
        &self,
        name: &str,
        url: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.find_one("name = $1 AND url = $2", &[name, url]).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Document>, StoreError> {
        self.find_one("name = $1", &[name]).await
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Document>, StoreError> {
        self.find_one("url = $1", &[url]).await
    }

    async fn try_create(&self, name: &str, url: &str) -> Result<Option<Document>, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO documents (name, url, status, progress)
            VALUES ($1, $2, 'PENDING', 0.0)
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        );
        let document = sqlx::query_as::<_, Document>(&sql)
            .bind(name)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(document)
    }

    async fn reset_for_resummary(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        let sql = format!(
            r#"
            UPDATE documents
            SET status     = 'PENDING',
                summary    = NULL,
                last_error = NULL,
                progress   = 0.0,
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        );
        let document = sqlx::query_as::<_, Document>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(document)
    }

    async fn begin_stage(&self, id: Uuid, status: DocumentStatus) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET status     = $2,
                progress   = GREATEST(progress, $3),
                updated_at = now()
            WHERE id = $1
              AND status NOT IN ('SUCCESS', 'FAILED')
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(status.checkpoint())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete(&self, id: Uuid, summary: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET status     = 'SUCCESS',
                summary    = $2,
                last_error = NULL,
                progress   = 1.0,
                updated_at = now()
            WHERE id = $1
              AND status NOT IN ('SUCCESS', 'FAILED')
            "#,
        )
        .bind(id)
        .bind(summary)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET status     = 'FAILED',
                last_error = $2,
                progress   = 0.0,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
