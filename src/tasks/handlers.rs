use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use tracing::error;
use uuid::Uuid;

use crate::{
    app_state::AppState,
    error::{AppError, ErrorResponse},
    runs::{ExtractInput, ExtractOptions, RunPayload, SummarizeInput},
    tasks::dtos::{
        CancelResponse, ExtractRequest, ModelsResponse, ProgressResponse, SummarizeRequest,
        TaskAccepted,
    },
};

fn validation(rejection: JsonRejection) -> AppError {
    AppError::Validation(rejection.body_text())
}

#[utoipa::path(
    post,
    path = "/api/v1/summarize",
    tag = "tasks",
    request_body = SummarizeRequest,
    responses(
        (status = 202, description = "Summarization queued", body = TaskAccepted),
        (status = 422, description = "Invalid input", body = ErrorResponse)
    )
)]
pub async fn summarize(
    State(state): State<AppState>,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskAccepted>), AppError> {
    let Json(request) = payload.map_err(validation)?;
    request.validate().map_err(AppError::Validation)?;

    let run = state
        .dispatcher
        .submit(RunPayload::summarize(SummarizeInput {
            text: request.text,
            model: request.model,
            max_length: request.max_length,
            language: request.language,
        }))
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAccepted::new(run.id, "Summarization")),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/extract",
    tag = "tasks",
    request_body = ExtractRequest,
    responses(
        (status = 202, description = "Extraction queued", body = TaskAccepted),
        (status = 422, description = "Invalid input", body = ErrorResponse)
    )
)]
pub async fn extract(
    State(state): State<AppState>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskAccepted>), AppError> {
    let Json(request) = payload.map_err(validation)?;
    request.validate().map_err(AppError::Validation)?;

    let run = state
        .dispatcher
        .submit(RunPayload::extract(ExtractInput {
            url: request.url,
            options: ExtractOptions {
                include_links: request.include_links,
                include_images: request.include_images,
                language: request.language,
            },
        }))
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskAccepted::new(run.id, "Extraction")),
    ))
}

/// Progress of any run. Runs expire an hour after their last update, after
/// which they are indistinguishable from ids that never existed.
#[utoipa::path(
    get,
    path = "/api/v1/progress/{task_id}",
    tag = "tasks",
    params(("task_id" = Uuid, Path, description = "Run id")),
    responses(
        (status = 200, description = "Run progress", body = ProgressResponse),
        (status = 404, description = "Unknown or expired run", body = ErrorResponse)
    )
)]
pub async fn get_progress(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<ProgressResponse>, AppError> {
    let run = state
        .runs()
        .get(task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task not found: {}", task_id)))?;

    Ok(Json(run.into()))
}

#[utoipa::path(
    post,
    path = "/api/v1/progress/{task_id}/cancel",
    tag = "tasks",
    params(("task_id" = Uuid, Path, description = "Run id")),
    responses(
        (status = 200, description = "Whether the run was cancelled", body = CancelResponse)
    )
)]
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, AppError> {
    let cancelled = state.dispatcher.cancel(task_id).await?;
    Ok(Json(CancelResponse { task_id, cancelled }))
}

#[utoipa::path(
    get,
    path = "/api/v1/models",
    tag = "tasks",
    responses(
        (status = 200, description = "Models offered by the generation service", body = ModelsResponse),
        (status = 500, description = "Generation service unavailable", body = ErrorResponse)
    )
)]
pub async fn list_models(
    State(state): State<AppState>,
) -> Result<Json<ModelsResponse>, AppError> {
    let models = state.ollama.list_models().await.map_err(|e| {
        error!(error = %e, "Failed to list models");
        AppError::Processing(format!("Failed to list models: {}", e))
    })?;

    Ok(Json(ModelsResponse { models }))
}
