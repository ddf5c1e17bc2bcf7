//! Fixed-window request limiter for the AI endpoints.
//!
//! A rejected request never reaches the orchestrator; clients see 429
//! `RATE_LIMITED` and are expected to wait, not treat it as a failure.

use std::collections::HashMap;
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::errors::AppError;
use crate::state::AppState;

/// Windows are pruned once the map grows past this many callers.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Counts one request for `key`; false once the window's quota is spent.
    pub async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut lock = self.windows.lock().await;

        if lock.len() > PRUNE_THRESHOLD {
            let window = self.window;
            lock.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = lock.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.limit {
            false
        } else {
            entry.count += 1;
            true
        }
    }
}

/// First hop of `x-forwarded-for`, then `x-real-ip`, then a shared anonymous bucket.
pub fn caller_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .unwrap_or("anonymous")
        .to_string()
}

pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let key = caller_key(request.headers());
    if !state.rate_limiter.allow(&key).await {
        warn!(caller = %key, path = %request.uri().path(), "Rate limit exceeded");
        return AppError::RateLimited.into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test(start_paused = true)]
    async fn test_limit_resets_after_window() {
        let limiter = FixedWindowLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.allow("1.2.3.4").await);
        assert!(limiter.allow("1.2.3.4").await);
        assert!(!limiter.allow("1.2.3.4").await);
        assert!(limiter.allow("5.6.7.8").await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.allow("1.2.3.4").await);
    }

    #[test]
    fn test_caller_key_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("9.9.9.9, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(caller_key(&headers), "9.9.9.9");

        headers.remove("x-forwarded-for");
        assert_eq!(caller_key(&headers), "10.0.0.2");

        assert_eq!(caller_key(&HeaderMap::new()), "anonymous");
    }

    #[test]
    fn test_blank_forwarded_header_falls_through_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" , 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(caller_key(&headers), "10.0.0.2");

        headers.insert("x-forwarded-for", HeaderValue::from_static(""));
        assert_eq!(caller_key(&headers), "10.0.0.2");
    }
}
