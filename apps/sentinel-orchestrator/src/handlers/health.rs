use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthReport {
    status: &'static str,
}

/// GET /health — liveness probe. Does not touch the database; a process
/// that can answer this request has a working Tokio runtime and axum
/// listener, which is all a load balancer needs to know.
pub async fn handle_health(State(_state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    (StatusCode::OK, Json(HealthReport { status: "ok" }))
}
