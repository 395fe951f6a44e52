use std::time::Duration;

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{health, scans};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let control_plane = Router::new()
        .route("/scans", post(scans::handle_start_scan))
        .route("/scans/:scan_id", get(scans::handle_get_scan))
        .route("/scans/cancel", post(scans::handle_cancel_scan));

    Router::new()
        .route("/health", get(health::handle_health))
        .nest("/api/v1", control_plane)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
