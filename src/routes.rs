use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    app_state::AppState,
    documents, error, health, progress, runs, summarizer, tasks,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::liveness,
        health::readiness,
        documents::handlers::create_document,
        documents::handlers::get_document,
        documents::handlers::get_document_progress,
        tasks::handlers::summarize,
        tasks::handlers::extract,
        tasks::handlers::get_progress,
        tasks::handlers::cancel_task,
        tasks::handlers::list_models,
    ),
    components(schemas(
        health::HealthResponse,
        health::ReadinessResponse,
        error::ErrorResponse,
        documents::dtos::CreateDocumentRequest,
        documents::dtos::DocumentResponse,
        progress::ProgressRecord,
        tasks::dtos::SummarizeRequest,
        tasks::dtos::ExtractRequest,
        tasks::dtos::TaskAccepted,
        tasks::dtos::ProgressResponse,
        tasks::dtos::CancelResponse,
        tasks::dtos::ModelsResponse,
        runs::RunStatus,
        summarizer::ModelInfo,
    )),
    tags(
        (name = "documents", description = "Submit pages and read their summaries"),
        (name = "tasks", description = "Ad-hoc summarize and extract runs"),
        (name = "health", description = "Liveness and readiness probes")
    )
)]
pub struct ApiDoc;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/documents", post(documents::handlers::create_document))
        .route("/documents/{id}", get(documents::handlers::get_document))
        .route(
            "/documents/{id}/progress",
            get(documents::handlers::get_document_progress),
        )
        .route("/summarize", post(tasks::handlers::summarize))
        .route("/extract", post(tasks::handlers::extract))
        .route("/progress/{task_id}", get(tasks::handlers::get_progress))
        .route(
            "/progress/{task_id}/cancel",
            post(tasks::handlers::cancel_task),
        )
        .route("/models", get(tasks::handlers::list_models))
}

/// The full HTTP surface with tracing and request-id layers applied.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::liveness))
        .route("/readyz", get(health::readiness))
        .nest("/api/v1", api_routes())
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(error::stamp_request_id))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
