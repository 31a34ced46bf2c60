use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    documents::{
        AdmissionController,
        dtos::{CreateDocumentRequest, DocumentResponse},
    },
    error::{AppError, ErrorResponse},
    progress::ProgressRecord,
};

#[utoipa::path(
    post,
    path = "/api/v1/documents",
    tag = "documents",
    request_body = CreateDocumentRequest,
    responses(
        (status = 202, description = "Document created or re-triggered", body = DocumentResponse),
        (status = 409, description = "Name or url owned by another document", body = ErrorResponse),
        (status = 422, description = "Invalid input", body = ErrorResponse)
    )
)]
pub async fn create_document(
    State(state): State<AppState>,
    payload: Result<Json<CreateDocumentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DocumentResponse>), AppError> {
    let Json(payload) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    payload.validate().map_err(AppError::Validation)?;

    let admission = AdmissionController::new(state.documents.clone(), state.dispatcher.clone());
    let document = admission.admit(&payload.name, &payload.url).await?;

    Ok((StatusCode::ACCEPTED, Json(document.into())))
}

#[utoipa::path(
    get,
    path = "/api/v1/documents/{id}",
    tag = "documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document", body = DocumentResponse),
        (status = 404, description = "No such document", body = ErrorResponse)
    )
)]
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>, AppError> {
    let document = state
        .documents
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document {} not found", id)))?;

    Ok(Json(document.into()))
}

/// Latest mirrored pipeline progress. Entries expire an hour after the last
/// stage change.
#[utoipa::path(
    get,
    path = "/api/v1/documents/{id}/progress",
    tag = "documents",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Latest progress record", body = ProgressRecord),
        (status = 404, description = "No recent progress", body = ErrorResponse)
    )
)]
pub async fn get_document_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProgressRecord>, AppError> {
    let record = state
        .progress
        .latest(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No progress recorded for document {}", id)))?;

    Ok(Json(record))
}
