use std::time::Duration;

use anyhow::{Context, Result};

use crate::llm_client::InvocationPolicy;

const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_AI_MODELS: &str = "gemini-2.5-flash,gemini-2.0-flash,gemini-2.5-flash-lite";

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    /// Ordered backend list: primary first, then fallbacks.
    pub ai_models: Vec<String>,
    pub ai_timeout: Duration,
    pub ai_quota_retries: u32,
    pub ai_quota_backoff: Duration,
    pub rate_limit_per_minute: u32,
    pub max_upload_bytes: usize,
    pub max_cv_chars: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let ai_models = parse_model_list(
            &std::env::var("AI_MODELS").unwrap_or_else(|_| DEFAULT_AI_MODELS.to_string()),
        );
        if ai_models.is_empty() {
            anyhow::bail!("AI_MODELS must name at least one model backend");
        }

        Ok(Config {
            gemini_api_key: require_env("GEMINI_API_KEY")?,
            gemini_api_base: std::env::var("GEMINI_API_BASE")
                .unwrap_or_else(|_| DEFAULT_GEMINI_API_BASE.to_string()),
            ai_models,
            ai_timeout: Duration::from_secs(parse_env("AI_TIMEOUT_SECS", 60)?),
            ai_quota_retries: parse_env("AI_QUOTA_RETRIES", 1)?,
            ai_quota_backoff: Duration::from_millis(parse_env("AI_QUOTA_BACKOFF_MS", 2000)?),
            rate_limit_per_minute: parse_env("RATE_LIMIT_PER_MINUTE", 10)?,
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 5 * 1024 * 1024)?,
            max_cv_chars: parse_env("MAX_CV_CHARS", 30_000)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// The fallback policy handed to the model invoker.
    pub fn invocation_policy(&self) -> InvocationPolicy {
        InvocationPolicy {
            backends: self.ai_models.clone(),
            per_call_timeout: self.ai_timeout,
            quota_retries: self.ai_quota_retries,
            quota_backoff: self.ai_quota_backoff,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}
