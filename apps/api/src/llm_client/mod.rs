/// LLM Client — the single point of entry for all model calls in CVLens.
///
/// ARCHITECTURAL RULE: No other module may call a model provider directly.
/// All LLM interactions MUST go through `ModelInvoker`.
///
/// The fallback behaviour is data, not control flow: `InvocationPolicy` lists the
/// backends in order and carries the per-call timeout and quota retry settings.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub mod gemini;
pub mod prompts;
pub mod response_parser;

use response_parser::{parse_model_json, UnparsableResponse};

/// Token accounting reported by a backend. Absent usage never fails a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// What a transport hands back for a 2xx response with a usable candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCompletion {
    pub text: String,
    pub usage: Option<Usage>,
}

/// A successful invocation: the text, its usage, and which backend produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
    pub backend: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("API error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response body: {0}")]
    Malformed(String),
}

/// One provider wire protocol. Implementations must not retry internally.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn generate(
        &self,
        backend: &str,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<RawCompletion, TransportError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success { usage: Option<Usage> },
    RateLimited,
    TransientError(String),
    Timeout,
}

/// One call against one backend. Lives only as long as the request.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationAttempt {
    pub backend: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationPolicy {
    pub backends: Vec<String>,
    pub per_call_timeout: Duration,
    /// Extra attempts on the same backend after an HTTP 429.
    pub quota_retries: u32,
    pub quota_backoff: Duration,
}

impl InvocationPolicy {
    /// Upper bound on how long `invoke` can take before giving up.
    pub fn worst_case_duration(&self) -> Duration {
        let per_backend = self.per_call_timeout * (self.quota_retries + 1)
            + self.quota_backoff * self.quota_retries;
        per_backend * self.backends.len() as u32
    }
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("all AI backends unavailable after {} attempts", .attempts.len())]
    AiUnavailable { attempts: Vec<InvocationAttempt> },
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error(transparent)]
    Unavailable(#[from] InvokeError),

    #[error("model output could not be parsed: {source}")]
    Unparsable {
        source: UnparsableResponse,
        raw: String,
    },
}

/// Walks the policy's backends in order until one produces a usable completion.
#[derive(Clone)]
pub struct ModelInvoker {
    transport: Arc<dyn ModelTransport>,
    policy: InvocationPolicy,
}

impl ModelInvoker {
    pub fn new(transport: Arc<dyn ModelTransport>, policy: InvocationPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &InvocationPolicy {
        &self.policy
    }

    /// Per backend: 429 → back off and retry the same backend up to
    /// `quota_retries` times; any other failure or a timeout → next backend.
    pub async fn invoke(&self, prompt: &str, system: Option<&str>) -> Result<Completion, InvokeError> {
        let mut attempts: Vec<InvocationAttempt> = Vec::new();

        for backend in &self.policy.backends {
            let mut quota_retries_left = self.policy.quota_retries;

            loop {
                let started_at = Utc::now();
                let clock = Instant::now();
                let result = tokio::time::timeout(
                    self.policy.per_call_timeout,
                    self.transport.generate(backend, prompt, system),
                )
                .await;
                let elapsed = clock.elapsed();

                let outcome = match result {
                    Err(_) => AttemptOutcome::Timeout,
                    Ok(Ok(raw)) if raw.text.trim().is_empty() => {
                        AttemptOutcome::TransientError("empty candidate text".to_string())
                    }
                    Ok(Ok(raw)) => {
                        attempts.push(InvocationAttempt {
                            backend: backend.clone(),
                            started_at,
                            elapsed,
                            outcome: AttemptOutcome::Success { usage: raw.usage },
                        });
                        log_usage(backend, raw.usage, elapsed, attempts.len());
                        return Ok(Completion {
                            text: raw.text,
                            usage: raw.usage,
                            backend: backend.clone(),
                        });
                    }
                    Ok(Err(TransportError::Status { status: 429, .. })) => {
                        AttemptOutcome::RateLimited
                    }
                    Ok(Err(e)) => AttemptOutcome::TransientError(e.to_string()),
                };

                warn!(
                    backend = %backend,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "AI backend attempt failed: {outcome:?}"
                );

                let retry_same = outcome == AttemptOutcome::RateLimited && quota_retries_left > 0;
                attempts.push(InvocationAttempt {
                    backend: backend.clone(),
                    started_at,
                    elapsed,
                    outcome,
                });

                if !retry_same {
                    break;
                }
                quota_retries_left -= 1;
                debug!(
                    "Quota hit on {backend}, retrying after {}ms",
                    self.policy.quota_backoff.as_millis()
                );
                tokio::time::sleep(self.policy.quota_backoff).await;
            }
        }

        warn!(
            "All {} AI backends exhausted after {} attempts",
            self.policy.backends.len(),
            attempts.len()
        );
        Err(InvokeError::AiUnavailable { attempts })
    }

    /// Invokes once and runs the output through the JSON response parser.
    pub async fn call_json(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<(Value, Completion), LlmError> {
        let completion = self.invoke(prompt, system).await?;
        match parse_model_json(&completion.text) {
            Ok(value) => Ok((value, completion)),
            Err(source) => Err(LlmError::Unparsable {
                source,
                raw: completion.text,
            }),
        }
    }
}

fn log_usage(backend: &str, usage: Option<Usage>, elapsed: Duration, attempt_count: usize) {
    match usage {
        Some(u) => info!(
            backend,
            input_tokens = u.input_tokens,
            output_tokens = u.output_tokens,
            total_tokens = u.total_tokens,
            elapsed_ms = elapsed.as_millis() as u64,
            attempts = attempt_count,
            "AI call succeeded"
        ),
        None => info!(
            backend,
            elapsed_ms = elapsed.as_millis() as u64,
            attempts = attempt_count,
            "AI call succeeded (no usage metadata)"
        ),
    }
}
