// HTTP routes for the patrol dashboard

use crate::dashboard::DashboardState;
use crate::static_files::serve_index;
use crate::websocket::websocket_handler;
use agri_eye::dispatcher::DispatchCounts;
use axum::{
    extract::State,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Body of every control endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model_loaded: bool,
    pub patrolling: bool,
    pub inference: InferenceStats,
}

#[derive(Debug, Serialize)]
pub struct InferenceStats {
    pub dispatched: u64,
    pub dropped: u64,
    pub completed: u64,
    pub failed: u64,
}

impl From<DispatchCounts> for InferenceStats {
    fn from(counts: DispatchCounts) -> Self {
        Self {
            dispatched: counts.dispatched,
            dropped: counts.dropped,
            completed: counts.completed,
            failed: counts.failed,
        }
    }
}

/// Create the dashboard router
pub fn create_router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/health", get(health_handler))
        .route("/api/v1/init", post(init_handler))
        .route("/api/v1/start", post(start_handler))
        .route("/api/v1/stop", post(stop_handler))
        .route("/ws", get(websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_loaded: state.is_model_loaded(),
        patrolling: state.is_patrolling(),
        inference: state.dispatcher().stats().into(),
    })
}

async fn init_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(StatusResponse {
        status: state.init().await,
    })
}

async fn start_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(StatusResponse { status: state.start().await })
}

async fn stop_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(StatusResponse { status: state.stop() })
}
