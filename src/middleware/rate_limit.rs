//! Token bucket rate limiting per client.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use tower::{Service, ServiceExt};

use crate::chain::{BoxHandler, MiddlewareError};
use crate::config::schema::RateLimitConfig;
use crate::observability::metrics;

/// Key used when neither the source header nor the peer address is known.
const SHARED_KEY: &str = "shared";

/// Minimum spacing between sweeps of idle buckets.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// A simple token bucket.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct Limiter {
    name: String,
    average: f64,
    burst: f64,
    source_header: Option<HeaderName>,
    buckets: DashMap<String, TokenBucket>,
    /// A bucket untouched this long has refilled completely.
    idle_after: Duration,
    next_sweep: Mutex<Instant>,
}

impl Limiter {
    fn client_key<B>(&self, req: &Request<B>) -> String {
        if let Some(header) = &self.source_header {
            if let Some(value) = req.headers().get(header).and_then(|v| v.to_str().ok()) {
                return value.to_string();
            }
        }
        match req.extensions().get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(addr)) => addr.ip().to_string(),
            None => SHARED_KEY.to_string(),
        }
    }

    fn check(&self, key: String) -> bool {
        self.maybe_sweep(Instant::now());

        let mut bucket = self
            .buckets
            .entry(key)
            .or_insert_with(|| TokenBucket::new(self.burst));
        bucket.try_acquire(self.burst, self.average)
    }

    fn maybe_sweep(&self, now: Instant) {
        {
            let Ok(mut next_sweep) = self.next_sweep.lock() else {
                return;
            };
            if now < *next_sweep {
                return;
            }
            *next_sweep = now + self.idle_after.max(MIN_SWEEP_INTERVAL);
        }
        self.evict_idle(now);
    }

    /// Drop buckets that are full again. A fresh bucket behaves the same.
    fn evict_idle(&self, now: Instant) {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_update) < self.idle_after);
        let evicted = before.saturating_sub(self.buckets.len());
        if evicted > 0 {
            tracing::debug!(middleware = %self.name, evicted, "Evicted idle rate limit buckets");
        }
    }
}

/// Rejects clients exceeding `average` requests per second (after `burst`)
/// with `429 Too Many Requests`.
#[derive(Clone)]
pub struct RateLimit {
    next: BoxHandler,
    limiter: Arc<Limiter>,
}

impl RateLimit {
    pub fn new(
        name: &str,
        config: &RateLimitConfig,
        next: BoxHandler,
    ) -> Result<Self, MiddlewareError> {
        if config.average == 0 {
            return Err(MiddlewareError::InvalidRate("average must be greater than zero"));
        }
        let burst = config.burst.unwrap_or(config.average);
        if burst == 0 {
            return Err(MiddlewareError::InvalidRate("burst must be greater than zero"));
        }
        let source_header = config
            .source_header
            .as_deref()
            .map(HeaderName::try_from)
            .transpose()
            .map_err(|e| MiddlewareError::InvalidHeader {
                name: config.source_header.clone().unwrap_or_default(),
                reason: e.to_string(),
            })?;

        let idle_after = Duration::from_secs_f64(f64::from(burst) / f64::from(config.average));

        Ok(Self {
            next,
            limiter: Arc::new(Limiter {
                name: name.to_string(),
                average: f64::from(config.average),
                burst: f64::from(burst),
                source_header,
                buckets: DashMap::new(),
                idle_after,
                next_sweep: Mutex::new(Instant::now() + idle_after.max(MIN_SWEEP_INTERVAL)),
            }),
        })
    }
}

impl Service<Request<Body>> for RateLimit {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let key = self.limiter.client_key(&req);

        if self.limiter.check(key.clone()) {
            return self.next.clone().oneshot(req).boxed();
        }

        tracing::warn!(middleware = %self.limiter.name, client = %key, "Rate limit exceeded");
        metrics::record_rate_limited(&self.limiter.name);
        let response = (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response();
        futures_util::future::ready(Ok(response)).boxed()
    }
}
