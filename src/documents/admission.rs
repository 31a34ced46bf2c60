use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::Document;
use crate::error::AppError;
use crate::jobs::JobDispatcher;
use crate::repositories::DocumentRepository;

/// Decides whether a submission creates a document, re-triggers an existing
/// one, or conflicts with documents that already own its name or url.
#[derive(Clone)]
pub struct AdmissionController {
    documents: Arc<dyn DocumentRepository>,
    dispatcher: JobDispatcher,
}

impl AdmissionController {
    pub fn new(documents: Arc<dyn DocumentRepository>, dispatcher: JobDispatcher) -> Self {
        Self {
            documents,
            dispatcher,
        }
    }

    #[instrument(skip(self))]
    pub async fn admit(&self, name: &str, url: &str) -> Result<Document, AppError> {
        if let Some(existing) = self.documents.find_by_name_and_url(name, url).await? {
            info!(document_id = %existing.id, "Exact match, re-triggering");
            return self.retrigger(existing.id).await;
        }

        self.check_conflicts(name, url).await?;

        if let Some(created) = self.documents.try_create(name, url).await? {
            info!(document_id = %created.id, "Document created");
            self.dispatch(created.id).await;
            return Ok(created);
        }

        // A concurrent submission won the insert.
        warn!("Create lost a uniqueness race, re-checking");
        if let Some(existing) = self.documents.find_by_name_and_url(name, url).await? {
            return self.retrigger(existing.id).await;
        }
        self.check_conflicts(name, url).await?;

        Err(AppError::StoreIntegrity(format!(
            "insert of name '{}' and url '{}' was rejected but no owning document exists",
            name, url
        )))
    }

    async fn retrigger(&self, id: Uuid) -> Result<Document, AppError> {
        let Some(document) = self.documents.reset_for_resummary(id).await? else {
            return Err(AppError::StoreIntegrity(format!(
                "document {} disappeared while being re-triggered",
                id
            )));
        };
        self.dispatch(document.id).await;
        Ok(document)
    }

    async fn check_conflicts(&self, name: &str, url: &str) -> Result<(), AppError> {
        let by_name = self.documents.find_by_name(name).await?;
        let by_url = self.documents.find_by_url(url).await?;

        let message = match (by_name, by_url) {
            (Some(a), Some(b)) if a.id == b.id => format!(
                "Conflict: Both name '{}' and URL '{}' already exist on document {}",
                name, url, a.id
            ),
            (Some(a), Some(b)) => format!(
                "Conflict: Name '{}' exists on document {} and URL '{}' exists on document {}",
                name, a.id, url, b.id
            ),
            (Some(a), None) => {
                format!("Conflict: Name '{}' already exists on document {}", name, a.id)
            }
            (None, Some(b)) => {
                format!("Conflict: URL '{}' already exists on document {}", url, b.id)
            }
            (None, None) => return Ok(()),
        };
        Err(AppError::Conflict(message))
    }

    /// Dispatch failures leave the document PENDING and are only logged.
    async fn dispatch(&self, document_id: Uuid) {
        match self.dispatcher.dispatch(document_id).await {
            Ok(run_id) => info!(%document_id, %run_id, "Pipeline run requested"),
            Err(e) => error!(%document_id, error = %e, "Failed to dispatch pipeline run"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryKvStore;
    use crate::entities::DocumentStatus;
    use crate::jobs::MockJobQueue;
    use crate::repositories::{MockDocumentRepository, StoreError};
    use chrono::Utc;
    use mockall::predicate::eq;

    const NAME: &str = "Doc A";
    const URL: &str = "https://example.com/a";

    fn document(name: &str, url: &str, status: DocumentStatus) -> Document {
        Document {
            id: Uuid::new_v4(),
            name: name.into(),
            url: url.into(),
            status,
            summary: None,
            progress: status.checkpoint(),
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn queue_expecting(enqueues: usize) -> MockJobQueue {
        let mut queue = MockJobQueue::new();
        queue
            .expect_enqueue()
            .times(enqueues)
            .returning(|_, _, _| Ok(Uuid::new_v4()));
        queue
    }

    fn controller(repo: MockDocumentRepository, queue: MockJobQueue) -> AdmissionController {
        let kv = Arc::new(MemoryKvStore::new());
        AdmissionController::new(Arc::new(repo), JobDispatcher::new(Arc::new(queue), kv))
    }

    #[tokio::test]
    async fn test_new_document_is_created_and_dispatched() {
        let created = document(NAME, URL, DocumentStatus::Pending);
        let created_id = created.id;

        let mut repo = MockDocumentRepository::new();
        repo.expect_find_by_name_and_url().returning(|_, _| Ok(None));
        repo.expect_find_by_name().returning(|_| Ok(None));
        repo.expect_find_by_url().returning(|_| Ok(None));
        repo.expect_try_create()
            .withf(|name, url| name == NAME && url == URL)
            .times(1)
            .returning(move |_, _| Ok(Some(created.clone())));

        let result = controller(repo, queue_expecting(1)).admit(NAME, URL).await.unwrap();
        assert_eq!(result.id, created_id);
        assert_eq!(result.status, DocumentStatus::Pending);
        assert_eq!(result.progress, 0.0);
        assert!(result.summary.is_none());
    }

    #[tokio::test]
    async fn test_exact_match_is_reset_and_redispatched() {
        let mut existing = document(NAME, URL, DocumentStatus::Success);
        existing.summary = Some("Old summary.".into());
        let id = existing.id;
        let mut reset = existing.clone();
        reset.status = DocumentStatus::Pending;
        reset.summary = None;
        reset.progress = 0.0;

        let mut repo = MockDocumentRepository::new();
        repo.expect_find_by_name_and_url()
            .returning(move |_, _| Ok(Some(existing.clone())));
        repo.expect_reset_for_resummary()
            .with(eq(id))
            .times(1)
            .returning(move |_| Ok(Some(reset.clone())));
        repo.expect_try_create().never();

        let result = controller(repo, queue_expecting(1)).admit(NAME, URL).await.unwrap();
        assert_eq!(result.id, id);
        assert_eq!(result.status, DocumentStatus::Pending);
        assert!(result.summary.is_none());
    }

    #[tokio::test]
    async fn test_name_conflict() {
        let owner = document(NAME, "https://example.com/other", DocumentStatus::Success);
        let owner_id = owner.id;

        let mut repo = MockDocumentRepository::new();
        repo.expect_find_by_name_and_url().returning(|_, _| Ok(None));
        repo.expect_find_by_name()
            .returning(move |_| Ok(Some(owner.clone())));
        repo.expect_find_by_url().returning(|_| Ok(None));
        repo.expect_try_create().never();

        let err = controller(repo, queue_expecting(0))
            .admit(NAME, URL)
            .await
            .unwrap_err();
        match err {
            AppError::Conflict(message) => assert_eq!(
                message,
                format!("Conflict: Name 'Doc A' already exists on document {}", owner_id)
            ),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_split_conflict_names_both_owners() {
        let name_owner = document(NAME, "https://example.com/b", DocumentStatus::Success);
        let url_owner = document("Doc B", URL, DocumentStatus::Failed);
        let (a, b) = (name_owner.id, url_owner.id);

        let mut repo = MockDocumentRepository::new();
        repo.expect_find_by_name_and_url().returning(|_, _| Ok(None));
        repo.expect_find_by_name()
            .returning(move |_| Ok(Some(name_owner.clone())));
        repo.expect_find_by_url()
            .returning(move |_| Ok(Some(url_owner.clone())));

        let err = controller(repo, queue_expecting(0))
            .admit(NAME, URL)
            .await
            .unwrap_err();
        let AppError::Conflict(message) = err else {
            panic!("expected conflict");
        };
        assert!(message.contains(&a.to_string()));
        assert!(message.contains(&b.to_string()));
    }

    #[tokio::test]
    async fn test_lost_race_becomes_retrigger() {
        let winner = document(NAME, URL, DocumentStatus::Pending);
        let id = winner.id;
        let mut lookups = 0;

        let mut repo = MockDocumentRepository::new();
        let found = winner.clone();
        repo.expect_find_by_name_and_url().times(2).returning(move |_, _| {
            lookups += 1;
            Ok((lookups > 1).then(|| found.clone()))
        });
        repo.expect_find_by_name().returning(|_| Ok(None));
        repo.expect_find_by_url().returning(|_| Ok(None));
        repo.expect_try_create().times(1).returning(|_, _| Ok(None));
        repo.expect_reset_for_resummary()
            .with(eq(id))
            .returning(move |_| Ok(Some(winner.clone())));

        let result = controller(repo, queue_expecting(1)).admit(NAME, URL).await.unwrap();
        assert_eq!(result.id, id);
    }

    #[tokio::test]
    async fn test_unexplained_rejection_is_integrity_error() {
        let mut repo = MockDocumentRepository::new();
        repo.expect_find_by_name_and_url().returning(|_, _| Ok(None));
        repo.expect_find_by_name().returning(|_| Ok(None));
        repo.expect_find_by_url().returning(|_| Ok(None));
        repo.expect_try_create().returning(|_, _| Ok(None));

        let err = controller(repo, queue_expecting(0))
            .admit(NAME, URL)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StoreIntegrity(_)));
    }

    #[tokio::test]
    async fn test_dispatch_failure_still_returns_document() {
        let created = document(NAME, URL, DocumentStatus::Pending);
        let id = created.id;

        let mut repo = MockDocumentRepository::new();
        repo.expect_find_by_name_and_url().returning(|_, _| Ok(None));
        repo.expect_find_by_name().returning(|_| Ok(None));
        repo.expect_find_by_url().returning(|_| Ok(None));
        repo.expect_try_create()
            .returning(move |_, _| Ok(Some(created.clone())));

        let mut queue = MockJobQueue::new();
        queue
            .expect_enqueue()
            .returning(|_, _, _| Err(StoreError::Database(sqlx::Error::PoolTimedOut)));

        let result = controller(repo, queue).admit(NAME, URL).await.unwrap();
        assert_eq!(result.id, id);
        assert_eq!(result.status, DocumentStatus::Pending);
    }
}
