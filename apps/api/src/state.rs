use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::ModelInvoker;
use crate::rate_limit::FixedWindowLimiter;

/// Shared application state injected into all route handlers via Axum extractors.
/// Holds no per-request mutable data apart from the rate limiter's counters.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub invoker: ModelInvoker,
    pub rate_limiter: Arc<FixedWindowLimiter>,
}

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use super::*;
    use crate::llm_client::ModelTransport;

    pub fn test_config(backends: &[&str], rate_limit_per_minute: u32) -> Config {
        Config {
            gemini_api_key: "test-key".to_string(),
            gemini_api_base: "http://127.0.0.1:9".to_string(),
            ai_models: backends.iter().map(|b| b.to_string()).collect(),
            ai_timeout: Duration::from_secs(60),
            ai_quota_retries: 1,
            ai_quota_backoff: Duration::from_secs(2),
            rate_limit_per_minute,
            max_upload_bytes: 64 * 1024,
            max_cv_chars: 30_000,
            port: 0,
            rust_log: "debug".to_string(),
        }
    }

    pub fn test_state(
        transport: Arc<dyn ModelTransport>,
        backends: &[&str],
        rate_limit_per_minute: u32,
    ) -> AppState {
        let config = test_config(backends, rate_limit_per_minute);
        AppState {
            rate_limiter: Arc::new(FixedWindowLimiter::per_minute(rate_limit_per_minute)),
            invoker: ModelInvoker::new(transport, config.invocation_policy()),
            config,
        }
    }
}
