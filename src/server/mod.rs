pub mod auth;
pub mod files;
pub mod routes;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::{JobDispatcher, ProgressTracker};
use crate::models::AppConfig;
use crate::server::auth::SessionStore;
use crate::storage::{FeedbackStore, JobStore, UserStore};

/// Shared application state for the Axum server.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<UserStore>,
    pub jobs: Arc<JobStore>,
    pub feedback: Arc<FeedbackStore>,
    pub progress: Arc<ProgressTracker>,
    pub dispatcher: JobDispatcher,
    pub sessions: SessionStore,
    pub uploads_dir: PathBuf,
    pub separated_dir: PathBuf,
    pub start_time: Instant,
}

/// Create the Axum router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    // Leave headroom above the upload ceiling for multipart framing; the
    // handler enforces the exact limit.
    let body_limit = state.config.max_upload_bytes as usize + 64 * 1024;

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .route("/api/logout", post(auth::logout))
        .route("/api/me", get(auth::me))
        .route("/api/jobs", get(routes::list_jobs).post(routes::upload))
        .route("/api/jobs/{id}/progress", get(routes::get_progress))
        .route("/api/jobs/{id}/feedback", post(routes::post_feedback))
        .route("/api/admin/overview", get(routes::admin_overview))
        .route("/api/audio/{job_id}/{file}", get(files::serve_stem))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
