use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/reports", post(handlers::submit_form))
        .route("/partials/feed", get(handlers::feed))
        .route("/api/reports", get(handlers::list_reports).post(handlers::create_report))
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/status", get(handlers::get_status))
        .route("/api/reload", post(handlers::reload))
        .with_state(state)
}
