//! Compose Service
//!
//! Asynchronous image build service. Clients submit compose requests over
//! HTTP and poll for their status while workers drive each compose through
//! the build pipeline.
//!
//! Endpoints:
//! - `POST /compose` queue a compose, 201 with its id
//! - `GET /compose/{id}` compose status
//! - `GET /compose/{id}/metadata` build artifacts
//! - `GET /openapi.json` API description
//! - `GET /version` service version
//! - `GET /health` liveness

pub mod client;
pub mod config;
pub mod handlers;
pub mod models;
pub mod openapi;
pub mod pipeline;
pub mod service;
pub mod storage;
pub mod worker;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use client::ComposeClient;
pub use config::{Config, PipelineKind, StoreBackend};
pub use handlers::AppState;
pub use models::ComposeJob;
pub use pipeline::{CommandPipeline, MockPipeline, Pipeline};
pub use service::{ComposeApi, ComposeService, ContractError};
pub use storage::{ComposeStore, MemoryStore, RedisStore};
pub use worker::Worker;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/compose", post(handlers::compose_handler))
        .route("/compose/{id}", get(handlers::compose_status_handler))
        .route(
            "/compose/{id}/metadata",
            get(handlers::compose_metadata_handler),
        )
        .route("/openapi.json", get(handlers::openapi_handler))
        .route("/version", get(handlers::version_handler))
        .with_state(shared_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
