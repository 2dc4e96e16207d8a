//! API handlers for the compose service

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use composer_common::{ComposeMetadata, ComposeRequest, ComposeResult, ComposeStatus, Version};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    openapi,
    service::{ComposeApi, ContractError},
};

/// Shared application state
pub struct AppState {
    pub api: Arc<dyn ComposeApi>,
}

impl AppState {
    pub fn new(api: Arc<dyn ComposeApi>) -> Self {
        Self { api }
    }
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<ContractError> for ApiError {
    fn from(err: ContractError) -> Self {
        let status = match &err {
            ContractError::Validation(_) | ContractError::InvalidId(_) => StatusCode::BAD_REQUEST,
            ContractError::NotFound(_) | ContractError::NotReady(_) => StatusCode::NOT_FOUND,
            ContractError::Storage(e) => {
                error!("Storage error: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection {
            JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::BAD_REQUEST,
        };

        ApiError {
            status,
            message: rejection.body_text(),
        }
    }
}

/// Health check
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "compose-service"
    }))
}

/// Submit a new compose
pub async fn compose_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ComposeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ComposeResult>), ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected compose body: {}", rejection.body_text());
        ApiError::from(rejection)
    })?;

    info!(
        "Compose request for {} with {} image requests",
        request.distribution,
        request.image_requests.len()
    );

    let id = state.api.submit(request).await.map_err(|e| {
        warn!("Compose request rejected: {}", e);
        ApiError::from(e)
    })?;

    Ok((
        StatusCode::CREATED,
        Json(ComposeResult { id: id.to_string() }),
    ))
}

/// Get compose status
pub async fn compose_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ComposeStatus>, ApiError> {
    info!("Getting status for compose: {}", id);

    let status = state.api.status(&id).await?;
    Ok(Json(status))
}

/// Get compose metadata
pub async fn compose_metadata_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ComposeMetadata>, ApiError> {
    info!("Getting metadata for compose: {}", id);

    let metadata = state.api.metadata(&id).await?;
    Ok(Json(metadata))
}

pub async fn openapi_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(openapi::document(&state.api.version().version))
}

pub async fn version_handler(State(state): State<Arc<AppState>>) -> Json<Version> {
    Json(state.api.version())
}
