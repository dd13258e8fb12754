//! Per-client inbound rate limiting.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// How often idle buckets are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
        }
    }

    /// Tokens the bucket would hold at `now`.
    fn projected(&self, capacity: f64, refill_rate: f64, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        (self.tokens + elapsed * refill_rate).min(capacity)
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64, now: Instant) -> bool {
        self.tokens = self.projected(capacity, refill_rate, now);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Buckets keyed by client IP.
///
/// A bucket that has refilled to capacity is indistinguishable from a new
/// one, so such buckets are dropped on a periodic sweep.
pub struct RateLimiterState {
    buckets: DashMap<String, TokenBucket>,
    rps: f64,
    burst: f64,
    last_sweep: Mutex<Instant>,
}

impl RateLimiterState {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            rps: f64::from(config.requests_per_second),
            burst: f64::from(config.burst_size.max(1)),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Number of clients currently holding a bucket.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    fn check(&self, key: &str, now: Instant) -> bool {
        self.maybe_sweep(now);

        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst, now));
        bucket.try_acquire(self.burst, self.rps, now)
    }

    fn maybe_sweep(&self, now: Instant) {
        {
            let mut last = self.last_sweep.lock().expect("rate limiter mutex poisoned");
            if now.saturating_duration_since(*last) < SWEEP_INTERVAL {
                return;
            }
            *last = now;
        }

        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.projected(self.burst, self.rps, now) < self.burst);
        tracing::debug!(
            removed = before.saturating_sub(self.buckets.len()),
            remaining = self.buckets.len(),
            "Swept idle rate limit buckets"
        );
    }
}

/// Middleware rejecting clients that exceed their bucket with 429.
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if state.check(&key, Instant::now()) {
        next.run(request).await
    } else {
        tracing::warn!(client = %key, "Rate limit exceeded");
        metrics::record_rate_limited();
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "rate_limited",
                "message": "Rate limit exceeded",
            })),
        )
            .into_response()
    }
}
