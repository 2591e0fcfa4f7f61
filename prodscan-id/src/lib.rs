//! prodscan-id library interface
//!
//! Exposes the identification pipeline and HTTP router for the binary and
//! for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::pipeline::Pipeline;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Identification pipeline (stateless oracle clients inside)
    pub pipeline: Arc<Pipeline>,
    /// Maximum accepted upload body size in bytes
    pub max_upload_bytes: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last request-level error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, max_upload_bytes: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            max_upload_bytes,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::upload_routes(state.max_upload_bytes))
        .merge(api::health_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
