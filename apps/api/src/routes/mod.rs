pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use crate::analysis::handlers::handle_analyze;
use crate::features::handlers::{handle_cover_letter, handle_interview_prep, handle_job_match};
use crate::rate_limit::enforce_rate_limit;
use crate::state::AppState;

/// Room for multipart boundaries and the text fields on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 256 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    // AI endpoints sit behind the per-caller rate limiter.
    let ai_routes = Router::new()
        .route("/analyze", post(handle_analyze))
        .route("/cover-letter", post(handle_cover_letter))
        .route("/interview-prep", post(handle_interview_prep))
        .route("/job-match", post(handle_job_match))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_rate_limit,
        ))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/health", get(health::health_handler))
        .merge(ai_routes)
        .with_state(state)
}
