//! # Guide API
//!
//! HTTP service exposing the guide repository to the authoring and viewing
//! clients.
//!
//! ## Endpoints
//!
//! | Method | Path                               | Repository call   |
//! |--------|------------------------------------|-------------------|
//! | GET    | `/api/guides`                      | `list_summaries`  |
//! | GET    | `/api/guides/{id}`                 | `get_by_id`       |
//! | POST   | `/api/guides`                      | `create`          |
//! | PUT    | `/api/guides/{id}`                 | `update`          |
//! | DELETE | `/api/guides/{id}`                 | `delete`          |
//! | POST   | `/api/maintenance/reconcile-index` | `reconcile_index` |
//!
//! Maintenance routes live outside `/api/guides` so that every id, including
//! `reconcile`, addresses a guide.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Axum HTTP Server                         │
//! │               (CORS, tracing, body limit)                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 AppState (GuideRepository)                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │        KvDriver: filesystem | Redis | managed KV REST       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method, Uri, header},
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use guide_persistence::{BackendKind, GuideRepository};

pub use config::Config;
pub use error::{ApiError, ApiResult};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state for Axum handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn GuideRepository>,
    pub backend: BackendKind,
}

impl AppState {
    pub const fn new(repo: Arc<dyn GuideRepository>, backend: BackendKind) -> Self {
        Self { repo, backend }
    }
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": VERSION,
        "backend": state.backend.as_str(),
    }))
}

async fn service_info() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Interactive Guides API",
        "version": VERSION,
        "endpoints": {
            "health": "/health",
            "guides": "/api/guides",
            "reconcile": "/api/maintenance/reconcile-index",
        }
    }))
}

async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::NotFound {
        entity_type: "Route".to_string(),
        id: uri.path().to_string(),
    }
}

/// CORS policy for the configured origins; `*` allows any origin
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|e| {
                    tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                })
                .ok()
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Build the Axum router
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        // Guide endpoints
        .route(
            "/api/guides",
            get(handlers::list_guides).post(handlers::create_guide),
        )
        .route(
            "/api/guides/{id}",
            get(handlers::get_guide)
                .put(handlers::update_guide)
                .delete(handlers::delete_guide),
        )
        // Maintenance
        .route(
            "/api/maintenance/reconcile-index",
            post(handlers::reconcile_index),
        )
        // Health check
        .route("/health", get(health_check))
        .route("/", get(service_info))
        .fallback(route_not_found)
        // State and middleware
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}
