//! Server-wide flood guard using the Governor crate
//!
//! Caps total request throughput regardless of client identity. Per-client
//! admission is enforced separately inside the generate handler.

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use governor::{
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{
    num::NonZeroU32,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::warn;

use crate::config::RateLimitConfig;
use crate::error::AppError;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>;

/// Paths that are never throttled
const EXEMPT_PATHS: &[&str] = &["/health"];

/// Global rate limiting layer
#[derive(Clone)]
pub struct GlobalRateLimitLayer {
    limiter: SharedRateLimiter,
}

impl GlobalRateLimitLayer {
    /// Zero values fall back to one request per second
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst_size).unwrap_or(rps);
        let quota = Quota::per_second(rps).allow_burst(burst);

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.burst_size)
    }
}

impl<S> Layer<S> for GlobalRateLimitLayer {
    type Service = GlobalRateLimit<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GlobalRateLimit {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Global rate limiting middleware service
#[derive(Clone)]
pub struct GlobalRateLimit<S> {
    inner: S,
    limiter: SharedRateLimiter,
}

impl<S> Service<Request<Body>> for GlobalRateLimit<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        if EXEMPT_PATHS.contains(&request.uri().path()) {
            return Box::pin(self.inner.call(request));
        }

        match self.limiter.check() {
            Ok(_) => Box::pin(self.inner.call(request)),
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                let retry_after_secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
                warn!(retry_after_secs, "Global rate limit exceeded");
                Box::pin(async move {
                    Ok(AppError::RateLimited {
                        retry_after_secs: retry_after_secs.max(1),
                    }
                    .into_response())
                })
            }
        }
    }
}
