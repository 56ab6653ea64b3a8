//! HTTP route handlers for the dashboard API.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;

use crate::state::AppState;

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/task", get(get_task))
}

async fn health() -> &'static str {
    "ok"
}

/// GET /api/task - the retained task_info event.
async fn get_task(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let payload = state.broker.task_info().ok_or(StatusCode::NOT_FOUND)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], payload))
}
