use axum::{
    extract::DefaultBodyLimit,
    http::header,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{convert, events, handlers, middleware::metrics_middleware};
use crate::metrics::encode_metrics;
use crate::state::AppState;

/// Multipart framing on top of the raw upload.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state
        .config()
        .server
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/formats", get(handlers::list_formats))
        // Conversion
        .route("/convert", post(convert::convert))
        .route("/convert/json", post(convert::convert_json))
        // Event log
        .route("/events", get(events::query_events))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        encode_metrics(),
    )
}
