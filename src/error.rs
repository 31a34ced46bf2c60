use axum::{
    Json,
    extract::Request,
    http::{HeaderName, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

use crate::cache::CacheError;
use crate::jobs::DispatchError;
use crate::repositories::StoreError;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Errors surfaced by HTTP handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Processing(String),

    #[error("Database integrity error: {0}")]
    StoreIntegrity(String),

    /// Logged in full, rendered generically.
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub request_id: Option<String>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Processing(_) | Self::StoreIntegrity(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Processing(_) => "PROCESSING_ERROR",
            Self::StoreIntegrity(_) => "STORE_INTEGRITY_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(detail) => {
                error!(detail = %detail, "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: message,
            code: self.code().to_string(),
            request_id: None,
        };
        let mut response = (self.status(), Json(body.clone())).into_response();
        response.extensions_mut().insert(body);
        response
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Copies the request's `x-request-id` into error bodies produced by
/// [`AppError`], so clients can quote it when reporting a failure.
pub async fn stamp_request_id(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let response = next.run(request).await;

    let (Some(request_id), Some(body)) = (
        request_id,
        response.extensions().get::<ErrorResponse>().cloned(),
    ) else {
        return response;
    };

    let status = response.status();
    let mut stamped = (
        status,
        Json(ErrorResponse {
            request_id: Some(request_id),
            ..body
        }),
    )
        .into_response();
    if let Some(value) = response.headers().get(&REQUEST_ID_HEADER) {
        stamped
            .headers_mut()
            .insert(REQUEST_ID_HEADER.clone(), value.clone());
    }
    stamped
}
