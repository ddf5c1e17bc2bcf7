//! Client-held analysis state machine.
//!
//! `Idle -> Submitting -> Success | Busy | Failed`. `Busy` and `Failed` retry
//! back into `Submitting`; `reset` returns to `Idle`. A successful report is
//! written to durable storage before it becomes the in-memory state.

use std::time::Duration;

use async_trait::async_trait;
use cvlens_contract::{ErrorBody, Language, ReportContract};
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use crate::storage::{CheckoutSnapshot, DurableStore};

pub const PROGRESS_TICK: Duration = Duration::from_millis(500);
/// Simulated progress never passes this until the response arrives.
pub const PROGRESS_CAP: u8 = 95;
const PROGRESS_STEP: u8 = 5;

pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong while analyzing your CV. Please try again.";
pub const BUSY_MESSAGE: &str = "Our AI service is busy right now. Please wait a moment and try again.";
pub const NETWORK_FAILURE_MESSAGE: &str = "Could not reach the server. Check your connection and try again.";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid API base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("network error: {0}")]
    Network(String),
}

/// Raw HTTP outcome; classification happens in the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct AnalysisSubmission {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub job_description: String,
    pub language: Language,
}

impl AnalysisSubmission {
    fn job_description(&self) -> Option<&str> {
        Some(self.job_description.trim()).filter(|jd| !jd.is_empty())
    }
}

#[async_trait]
pub trait AnalysisApi: Send + Sync {
    async fn analyze(&self, submission: &AnalysisSubmission) -> Result<ApiResponse, TransportError>;
}

/// Multipart upload to `POST {base}/analyze`.
pub struct HttpAnalysisApi {
    client: reqwest::Client,
    analyze_url: Url,
}

impl HttpAnalysisApi {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client: reqwest::Client::new(),
            analyze_url: base.join("analyze")?,
        })
    }

    pub fn analyze_url(&self) -> &Url {
        &self.analyze_url
    }
}

#[async_trait]
impl AnalysisApi for HttpAnalysisApi {
    async fn analyze(&self, submission: &AnalysisSubmission) -> Result<ApiResponse, TransportError> {
        let file = Part::bytes(submission.bytes.clone())
            .file_name(submission.file_name.clone())
            .mime_str(&submission.content_type)
            .map_err(|e| TransportError::InvalidUpload(e.to_string()))?;
        let form = Form::new()
            .part("file", file)
            .text("jobDescription", submission.job_description.clone())
            .text("language", submission.language.code());

        let response = self
            .client
            .post(self.analyze_url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(ApiResponse { status, body })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisPhase {
    Idle,
    Submitting,
    Success(Box<ReportContract>),
    /// AI backends exhausted or rate limited: wait and retry.
    Busy { message: String },
    Failed { message: String },
}

pub struct AnalysisMachine {
    phase: AnalysisPhase,
    job_description: Option<String>,
    durable: DurableStore,
    progress: watch::Sender<u8>,
}

impl AnalysisMachine {
    pub fn new(durable: DurableStore) -> Self {
        let (progress, _) = watch::channel(0);
        Self {
            phase: AnalysisPhase::Idle,
            job_description: None,
            durable,
            progress,
        }
    }

    pub fn phase(&self) -> &AnalysisPhase {
        &self.phase
    }

    pub fn report(&self) -> Option<&ReportContract> {
        match &self.phase {
            AnalysisPhase::Success(report) => Some(report),
            _ => None,
        }
    }

    pub fn job_description(&self) -> Option<&str> {
        self.job_description.as_deref()
    }

    pub fn progress(&self) -> u8 {
        *self.progress.borrow()
    }

    /// Progress updates for rendering. Carries no correctness meaning.
    pub fn watch_progress(&self) -> watch::Receiver<u8> {
        self.progress.subscribe()
    }

    /// Reload path: shows the last cached analysis, if any.
    pub fn restore_from_storage(&mut self) -> bool {
        match self.durable.load_analysis() {
            Some(report) => {
                self.job_description = self.durable.load_job_description();
                self.phase = AnalysisPhase::Success(Box::new(report));
                self.progress.send_replace(100);
                debug!("Restored cached analysis");
                true
            }
            None => false,
        }
    }

    /// Checkout return path: the pre-checkout snapshot replaces whatever is shown.
    pub fn restore_snapshot(&mut self, snapshot: CheckoutSnapshot) {
        self.job_description = snapshot.job_description;
        if let Some(report) = snapshot.analysis {
            self.phase = AnalysisPhase::Success(Box::new(report));
            self.progress.send_replace(100);
        }
    }

    /// Enters `Submitting`. Returns `false` (and changes nothing) when already submitting.
    fn begin(&mut self) -> bool {
        if self.phase == AnalysisPhase::Submitting {
            debug!("Ignoring duplicate submit");
            return false;
        }
        self.phase = AnalysisPhase::Submitting;
        self.progress.send_replace(0);
        true
    }

    pub fn tick_progress(&mut self) {
        if self.phase != AnalysisPhase::Submitting {
            return;
        }
        self.progress
            .send_modify(|p| *p = p.saturating_add(PROGRESS_STEP).min(PROGRESS_CAP));
    }

    /// Uploads and drives the machine to a terminal phase. A no-op while a
    /// submission is already in flight.
    pub async fn submit(
        &mut self,
        api: &dyn AnalysisApi,
        submission: AnalysisSubmission,
    ) -> &AnalysisPhase {
        if !self.begin() {
            return &self.phase;
        }

        let mut flight = InFlight {
            machine: &mut *self,
            settled: false,
        };
        let request = api.analyze(&submission);
        tokio::pin!(request);
        let mut ticker = tokio::time::interval(PROGRESS_TICK);
        ticker.tick().await;

        let outcome = loop {
            tokio::select! {
                outcome = &mut request => break outcome,
                _ = ticker.tick() => flight.machine.tick_progress(),
            }
        };

        flight.machine.finish(outcome, submission.job_description());
        flight.settled = true;
        drop(flight);
        &self.phase
    }

    fn finish(&mut self, outcome: Result<ApiResponse, TransportError>, job_description: Option<&str>) {
        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                warn!("Analysis request failed: {e}");
                self.phase = AnalysisPhase::Failed {
                    message: NETWORK_FAILURE_MESSAGE.to_string(),
                };
                return;
            }
        };

        if (200..300).contains(&response.status) {
            match serde_json::from_str::<ReportContract>(&response.body) {
                Ok(report) => self.succeed(report, job_description),
                Err(e) => {
                    warn!("Analysis response did not match the report contract: {e}");
                    self.phase = AnalysisPhase::Failed {
                        message: GENERIC_FAILURE_MESSAGE.to_string(),
                    };
                }
            }
            return;
        }

        let error: Option<ErrorBody> = serde_json::from_str(&response.body).ok();
        let message = error.as_ref().and_then(|e| e.message.clone());
        let busy = matches!(response.status, 429 | 503) || error.as_ref().is_some_and(ErrorBody::is_busy);

        info!(status = response.status, busy, "Analysis request rejected");
        self.phase = if busy {
            AnalysisPhase::Busy {
                message: message.unwrap_or_else(|| BUSY_MESSAGE.to_string()),
            }
        } else {
            AnalysisPhase::Failed {
                message: message.unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
            }
        };
    }

    fn succeed(&mut self, report: ReportContract, job_description: Option<&str>) {
        if let Err(e) = self.durable.save_analysis(&report, job_description) {
            warn!("Analysis could not be cached, it will not survive a reload: {e}");
        }
        self.job_description = job_description.map(str::to_string);
        self.phase = AnalysisPhase::Success(Box::new(report));
        self.progress.send_replace(100);
    }

    /// Back to `Idle` and drops the cached analysis. Entitlements are untouched.
    pub fn reset(&mut self) {
        self.durable.clear_analysis();
        self.job_description = None;
        self.phase = AnalysisPhase::Idle;
        self.progress.send_replace(0);
    }
}

/// Puts an abandoned submission back to `Idle` so the next submit is not
/// swallowed by the duplicate-submit check.
struct InFlight<'a> {
    machine: &'a mut AnalysisMachine,
    settled: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("Analysis submission dropped before completion");
            self.machine.phase = AnalysisPhase::Idle;
            self.machine.progress.send_replace(0);
        }
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::testing::{submission, FakeApi};
    use super::*;
    use crate::storage::fixtures::{report, stores};

    fn ok_body() -> String {
        serde_json::to_string(&report("Jane Doe")).unwrap()
    }

    #[tokio::test]
    async fn test_success_is_cached_before_display() {
        let (_, durable, _) = stores();
        let mut machine = AnalysisMachine::new(durable.clone());
        let api = FakeApi::replying(200, ok_body());

        let phase = machine.submit(&api, submission("  Rust engineer ")).await;
        assert_eq!(phase, &AnalysisPhase::Success(Box::new(report("Jane Doe"))));
        assert_eq!(machine.progress(), 100);
        assert_eq!(machine.job_description(), Some("Rust engineer"));
        assert_eq!(durable.load_analysis(), Some(report("Jane Doe")));
    }

    #[tokio::test]
    async fn test_cached_success_survives_reload() {
        let (_, durable, _) = stores();
        let mut machine = AnalysisMachine::new(durable.clone());
        machine
            .submit(&FakeApi::replying(200, ok_body()), submission(""))
            .await;
        let before = machine.report().cloned();

        let mut reloaded = AnalysisMachine::new(durable);
        assert!(reloaded.restore_from_storage());
        assert_eq!(reloaded.report().cloned(), before);
        assert_eq!(reloaded.job_description(), None);
    }

    #[tokio::test]
    async fn test_busy_is_distinct_from_failure() {
        let (_, durable, _) = stores();
        let mut machine = AnalysisMachine::new(durable);

        let busy = FakeApi::replying(503, json!({"error": "AI_BUSY"}).to_string());
        machine.submit(&busy, submission("")).await;
        assert_eq!(
            machine.phase(),
            &AnalysisPhase::Busy {
                message: BUSY_MESSAGE.to_string()
            }
        );

        let limited = FakeApi::replying(
            429,
            json!({"error": "RATE_LIMITED", "message": "Slow down."}).to_string(),
        );
        machine.submit(&limited, submission("")).await;
        assert_eq!(
            machine.phase(),
            &AnalysisPhase::Busy {
                message: "Slow down.".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_client_errors_carry_server_message() {
        let (_, durable, _) = stores();
        let mut machine = AnalysisMachine::new(durable.clone());
        let api = FakeApi::replying(
            400,
            json!({"error": "NOT_A_CV", "message": "This looks like a recipe."}).to_string(),
        );
        machine.submit(&api, submission("")).await;
        assert_eq!(
            machine.phase(),
            &AnalysisPhase::Failed {
                message: "This looks like a recipe.".to_string()
            }
        );
        assert_eq!(durable.load_analysis(), None);
    }

    #[tokio::test]
    async fn test_unreadable_error_body_uses_generic_message() {
        let (_, durable, _) = stores();
        let mut machine = AnalysisMachine::new(durable);
        machine
            .submit(&FakeApi::replying(500, "<html>oops</html>"), submission(""))
            .await;
        assert_eq!(
            machine.phase(),
            &AnalysisPhase::Failed {
                message: GENERIC_FAILURE_MESSAGE.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_submit_while_submitting_is_a_noop() {
        let (_, durable, _) = stores();
        let mut machine = AnalysisMachine::new(durable);
        let api = FakeApi::replying(200, ok_body());

        assert!(machine.begin());
        assert!(!machine.begin());
        let phase = machine.submit(&api, submission("")).await;
        assert_eq!(phase, &AnalysisPhase::Submitting);
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_submit_does_not_block_the_next_one() {
        let (_, durable, _) = stores();
        let mut machine = AnalysisMachine::new(durable);
        let slow = FakeApi::new(
            vec![Ok(ApiResponse {
                status: 200,
                body: ok_body(),
            })],
            Duration::from_secs(300),
        );

        let abandoned =
            tokio::time::timeout(Duration::from_secs(5), machine.submit(&slow, submission(""))).await;
        assert!(abandoned.is_err());
        assert_eq!(machine.phase(), &AnalysisPhase::Idle);
        assert_eq!(machine.progress(), 0);

        let api = FakeApi::replying(200, ok_body());
        machine.submit(&api, submission("")).await;
        assert_eq!(api.calls(), 1);
        assert!(matches!(machine.phase(), AnalysisPhase::Success(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_capped_until_response() {
        let (_, durable, _) = stores();
        let mut machine = AnalysisMachine::new(durable);
        let mut progress = machine.watch_progress();
        let api = FakeApi::new(
            vec![Ok(ApiResponse {
                status: 200,
                body: ok_body(),
            })],
            Duration::from_secs(30),
        );

        let observer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while progress.changed().await.is_ok() {
                let value = *progress.borrow();
                seen.push(value);
                if value == 100 {
                    break;
                }
            }
            seen
        });

        machine.submit(&api, submission("")).await;
        let seen = observer.await.unwrap();

        assert_eq!(seen.last(), Some(&100));
        let simulated = &seen[..seen.len() - 1];
        assert!(simulated.iter().all(|p| *p <= PROGRESS_CAP));
        assert!(simulated.windows(2).all(|w| w[0] <= w[1]));
        assert!(simulated.contains(&PROGRESS_CAP));
    }

    #[tokio::test]
    async fn test_retry_from_failure_and_reset() {
        let (_, durable, _) = stores();
        let mut machine = AnalysisMachine::new(durable.clone());
        let api = FakeApi::new(
            vec![
                Err(TransportError::Network("connection refused".to_string())),
                Ok(ApiResponse {
                    status: 200,
                    body: ok_body(),
                }),
            ],
            Duration::ZERO,
        );

        machine.submit(&api, submission("")).await;
        assert_eq!(
            machine.phase(),
            &AnalysisPhase::Failed {
                message: NETWORK_FAILURE_MESSAGE.to_string()
            }
        );
        machine.submit(&api, submission("")).await;
        assert!(machine.report().is_some());

        machine.reset();
        assert_eq!(machine.phase(), &AnalysisPhase::Idle);
        assert_eq!(durable.load_analysis(), None);
    }

    #[tokio::test]
    async fn test_http_api_uploads_multipart_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/analyze"))
            .and(body_string_contains("name=\"jobDescription\""))
            .and(body_string_contains("Platform engineer"))
            .and(body_string_contains("filename=\"cv.txt\""))
            .respond_with(ResponseTemplate::new(200).set_body_string(ok_body()))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpAnalysisApi::new(&format!("{}/api", server.uri())).unwrap();
        assert!(api.analyze_url().as_str().ends_with("/api/analyze"));

        let response = api.analyze(&submission("Platform engineer")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(
            serde_json::from_str::<ReportContract>(&response.body).unwrap(),
            report("Jane Doe")
        );
    }

    #[tokio::test]
    async fn test_http_api_surfaces_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .respond_with(
                ResponseTemplate::new(503).set_body_json(json!({"error": "AI_BUSY"})),
            )
            .mount(&server)
            .await;

        let api = HttpAnalysisApi::new(&server.uri()).unwrap();
        let (_, durable, _) = stores();
        let mut machine = AnalysisMachine::new(durable);
        machine.submit(&api, submission("")).await;
        assert!(matches!(machine.phase(), AnalysisPhase::Busy { .. }));
    }
}
