pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};

use crate::extraction;
use crate::intake::handlers;
use crate::state::AppState;

/// `max_upload_bytes` replaces axum's 2 MB default body limit on every route.
pub fn build_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Intake API
        .route("/api/v1/intake/sessions", post(handlers::handle_open_session))
        .route(
            "/api/v1/intake/sessions/:id",
            get(handlers::handle_get_session).delete(handlers::handle_close_session),
        )
        .route(
            "/api/v1/intake/sessions/:id/file",
            post(handlers::handle_select_file).delete(handlers::handle_remove_file),
        )
        .route(
            "/api/v1/intake/sessions/:id/upload",
            post(handlers::handle_start_upload),
        )
        .route(
            "/api/v1/intake/sessions/:id/fields",
            patch(handlers::handle_edit_field),
        )
        .route(
            "/api/v1/intake/sessions/:id/confirm",
            post(handlers::handle_confirm),
        )
        .route(
            "/api/v1/intake/sessions/:id/reset",
            post(handlers::handle_reset),
        )
        .route(
            "/api/v1/intake/sessions/:id/preview",
            get(handlers::handle_preview),
        )
        .route(
            "/api/v1/intake/sessions/:id/review",
            get(handlers::handle_review),
        )
        // Reference extraction service
        .route("/api/upload", post(extraction::handle_extract))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
