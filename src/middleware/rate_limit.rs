// Sliding-window rate limiting keyed by client address
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::HttpError;

const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

// In-memory only; each instance counts its own traffic.
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<Buckets>>,
    max_requests: usize,
    window: Duration,
}

struct Buckets {
    requests: HashMap<String, Vec<Instant>>,
    last_sweep: Instant,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(Buckets {
                requests: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            max_requests,
            window,
        }
    }

    pub fn is_allowed(&self, key: &str) -> bool {
        self.is_allowed_at(key, Instant::now())
    }

    fn is_allowed_at(&self, key: &str, now: Instant) -> bool {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Forget clients with nothing left in the window, at most once per window
        if now.saturating_duration_since(state.last_sweep) >= self.window {
            let window = self.window;
            state.requests.retain(|_, timestamps| {
                timestamps.retain(|&timestamp| now.saturating_duration_since(timestamp) < window);
                !timestamps.is_empty()
            });
            state.last_sweep = now;
        }

        let entry = state.requests.entry(key.to_string()).or_default();

        // Drop requests that fell out of the window
        entry.retain(|&timestamp| now.saturating_duration_since(timestamp) < self.window);

        if entry.len() < self.max_requests {
            entry.push(now);
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .requests
            .len()
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, HttpError> {
    let client_id = client_id(&request);

    if !limiter.is_allowed(&client_id) {
        tracing::warn!("Rate limit hit for {} on {}", client_id, request.uri().path());
        return Err(HttpError::too_many_requests());
    }

    Ok(next.run(request).await)
}

/// First `x-forwarded-for` hop when behind a proxy, otherwise the peer
/// address the server accepted the connection from.
fn client_id(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn api_rate_limiter() -> RateLimiter {
    RateLimiter::new(100, FIFTEEN_MINUTES)
}

pub fn login_rate_limiter() -> RateLimiter {
    RateLimiter::new(10, FIFTEEN_MINUTES)
}
