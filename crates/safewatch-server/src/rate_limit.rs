//! Per-IP token-bucket rate limiting for the HTTP API.
//!
//! Requests are charged by route: liveness checks are free, a presence
//! socket upgrade costs several tokens since it pins a long-lived
//! connection, everything else costs one.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use safewatch_shared::constants::WS_PATH;

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_seen: Instant,
}

impl Bucket {
    fn full(burst: f64) -> Self {
        Self {
            tokens: burst,
            last_seen: Instant::now(),
        }
    }

    /// Refill for the time since the last request, then take `cost` tokens.
    fn take(&mut self, per_sec: f64, burst: f64, cost: f64) -> bool {
        let now = Instant::now();
        let refill = now.duration_since(self.last_seen).as_secs_f64() * per_sec;
        self.last_seen = now;
        self.tokens = (self.tokens + refill).min(burst);

        if self.tokens < cost {
            return false;
        }
        self.tokens -= cost;
        true
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    buckets: Arc<Mutex<HashMap<IpAddr, Bucket>>>,
    per_sec: f64,
    burst: f64,
}

impl RateLimiter {
    pub fn new(per_sec: f64, burst: f64) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            per_sec,
            burst,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.rate_limit_per_sec, config.rate_limit_burst)
    }

    /// Charge `cost` tokens to `ip`, capped at the burst size.
    pub async fn allow(&self, ip: IpAddr, cost: f64) -> bool {
        let cost = cost.min(self.burst);
        let mut buckets = self.buckets.lock().await;
        buckets
            .entry(ip)
            .or_insert_with(|| Bucket::full(self.burst))
            .take(self.per_sec, self.burst, cost)
    }

    /// Drop buckets idle for longer than `max_idle_secs`.
    pub async fn purge_idle(&self, max_idle_secs: f64) {
        let mut buckets = self.buckets.lock().await;
        let before = buckets.len();
        let now = Instant::now();
        buckets.retain(|_, b| now.duration_since(b.last_seen).as_secs_f64() < max_idle_secs);

        let removed = before - buckets.len();
        if removed > 0 {
            debug!(removed, "Purged idle rate-limit buckets");
        }
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let cost = request_cost(req.uri().path());
    if cost > 0.0 {
        if let Some(ip) = client_ip(&req) {
            if !limiter.allow(ip, cost).await {
                warn!(ip = %ip, path = %req.uri().path(), cost, "Rate limit exceeded");
                return ServerError::RateLimited.into_response();
            }
        }
    }

    next.run(req).await
}

/// Capped at the burst size by [`RateLimiter::allow`].
const WS_UPGRADE_COST: f64 = 5.0;

fn request_cost(path: &str) -> f64 {
    match path {
        "/health" => 0.0,
        p if p == WS_PATH => WS_UPGRADE_COST,
        _ => 1.0,
    }
}

/// Peer address first, then X-Forwarded-For, then X-Real-IP.
fn client_ip<B>(req: &Request<B>) -> Option<IpAddr> {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Some(addr.ip());
    }

    let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok())
        .or_else(|| header("x-real-ip").and_then(|v| v.trim().parse().ok()))
}
