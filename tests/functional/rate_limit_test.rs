//! Functional tests for the global rate limit layer

use axum::{
    body::Body,
    http::{header::RETRY_AFTER, Request, StatusCode},
    Router,
};
use imagechat_gateway::{api::create_router, config::Settings, middleware::GlobalRateLimitLayer, AppState};
use std::sync::Arc;
use tower::ServiceExt;

fn create_test_app(rps: u32, burst: u32) -> Router {
    Router::new()
        .route("/health", axum::routing::get(|| async { "healthy" }))
        .route("/test", axum::routing::get(|| async { "OK" }))
        .layer(GlobalRateLimitLayer::new(rps, burst))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_allows_within_limit() {
    let app = create_test_app(100, 100);

    let response = app.oneshot(get("/test")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_burst_capacity() {
    let app = create_test_app(1, 5);

    for _ in 0..5 {
        let response = app.clone().oneshot(get("/test")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_exceeded_returns_retry_after() {
    let app = create_test_app(1, 1);

    let response = app.clone().oneshot(get("/test")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(get("/test")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "1");

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_health_bypass() {
    let app = create_test_app(1, 1);

    for _ in 0..5 {
        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_router_applies_global_guard_when_enabled() {
    let mut settings = Settings::default();
    settings.rate_limit.global_enabled = true;
    settings.rate_limit.requests_per_second = 1;
    settings.rate_limit.burst_size = 1;
    let app = create_router(Arc::new(AppState::new(settings, None, None)));

    let post = || {
        Request::builder()
            .method("POST")
            .uri("/generate")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"prompt":"hi"}"#))
            .unwrap()
    };

    // First call reaches the handler and fails on the missing key
    let response = app.clone().oneshot(post()).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = app.clone().oneshot(post()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
