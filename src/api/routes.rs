//! Router construction

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::handlers;
use crate::middleware::GlobalRateLimitLayer;
use crate::AppState;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let settings = state.settings.clone();

    let mut router = Router::new()
        .route("/generate", post(handlers::generate))
        .route("/health", get(handlers::health))
        .with_state(state);

    if settings.rate_limit.global_enabled {
        info!(
            requests_per_second = settings.rate_limit.requests_per_second,
            burst_size = settings.rate_limit.burst_size,
            "Global rate limit enabled"
        );
        router = router.layer(GlobalRateLimitLayer::from_config(&settings.rate_limit));
    }

    router
        .layer(DefaultBodyLimit::max(settings.server.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
