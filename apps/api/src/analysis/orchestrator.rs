//! CV Analysis — orchestrates one analysis request end to end.
//!
//! Flow: build prompt → ModelInvoker (once) → response parser →
//!       NOT_A_CV sentinel check → contract assembly + invariants.
//!
//! Every path ends in one of the four `AnalysisResult` variants. Retry policy
//! lives entirely in the invoker; this layer never retries.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cvlens_contract::{Language, ReportContract};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analysis::contract::{detect_not_a_cv, into_report};
use crate::analysis::prompts::{
    analysis_system_instruction, build_analysis_prompt, GENERIC_JOB_SENTINEL,
};
use crate::errors::AppError;
use crate::llm_client::prompts::truncate_chars;
use crate::llm_client::{LlmError, ModelInvoker};

/// Max characters of offending model output written to the error log.
const RAW_LOG_CHARS: usize = 2_000;

/// An immutable analysis request. Construct through `AnalysisRequest::new`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    cv_text: String,
    job_description: Option<String>,
    language: Language,
}

impl AnalysisRequest {
    /// Truncates the CV to `max_cv_chars` and folds blank or sentinel job
    /// descriptions into "generic application".
    pub fn new(
        cv_text: &str,
        job_description: Option<&str>,
        language: Language,
        max_cv_chars: usize,
    ) -> Self {
        let job_description = job_description
            .map(str::trim)
            .filter(|jd| !is_generic_job_description(jd))
            .map(String::from);

        Self {
            cv_text: truncate_chars(cv_text.trim(), max_cv_chars).to_string(),
            job_description,
            language,
        }
    }

    pub fn cv_text(&self) -> &str {
        &self.cv_text
    }

    pub fn job_description(&self) -> Option<&str> {
        self.job_description.as_deref()
    }

    pub fn language(&self) -> Language {
        self.language
    }
}

/// Blank text and the generic-application sentinel both mean "no target job".
pub fn is_generic_job_description(job_description: &str) -> bool {
    let jd = job_description.trim();
    jd.is_empty() || jd.eq_ignore_ascii_case(GENERIC_JOB_SENTINEL)
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    Ok(Box<ReportContract>),
    /// Legitimate negative classification; maps to 400.
    NotACv(String),
    /// Every backend exhausted; maps to 503 `AI_BUSY`.
    ServiceUnavailable,
    /// Unparsable output or contract breach; detail is logged, never returned.
    ValidationError(String),
}

impl IntoResponse for AnalysisResult {
    fn into_response(self) -> Response {
        match self {
            AnalysisResult::Ok(report) => (StatusCode::OK, Json(*report)).into_response(),
            AnalysisResult::NotACv(message) => AppError::NotACv(message).into_response(),
            AnalysisResult::ServiceUnavailable => AppError::AiBusy.into_response(),
            AnalysisResult::ValidationError(reason) => {
                AppError::AnalysisFailed(reason).into_response()
            }
        }
    }
}

pub async fn analyze(invoker: &ModelInvoker, request: &AnalysisRequest) -> AnalysisResult {
    let analysis_id = Uuid::new_v4();
    let has_job_description = request.job_description.is_some();
    info!(
        %analysis_id,
        language = %request.language,
        cv_chars = request.cv_text.chars().count(),
        has_job_description,
        "Starting CV analysis"
    );

    let prompt = build_analysis_prompt(&request.cv_text, request.job_description());
    let system = analysis_system_instruction(request.language);

    let (value, completion) = match invoker.call_json(&prompt, Some(system.as_str())).await {
        Ok(ok) => ok,
        Err(LlmError::Unavailable(e)) => {
            warn!(%analysis_id, "Analysis aborted: {e}");
            return AnalysisResult::ServiceUnavailable;
        }
        Err(LlmError::Unparsable { source, raw }) => {
            error!(
                %analysis_id,
                raw = truncate_chars(&raw, RAW_LOG_CHARS),
                "Unparsable analysis output: {source}"
            );
            return AnalysisResult::ValidationError(source.to_string());
        }
    };

    if let Some(message) = detect_not_a_cv(&value) {
        info!(%analysis_id, backend = %completion.backend, "Document classified as not a CV");
        return AnalysisResult::NotACv(message);
    }

    match into_report(value.clone(), &request.cv_text, has_job_description) {
        Ok(report) => {
            info!(
                %analysis_id,
                backend = %completion.backend,
                current = report.scores.current,
                potential = report.scores.potential,
                "CV analysis complete"
            );
            AnalysisResult::Ok(Box::new(report))
        }
        Err(e) => {
            error!(
                %analysis_id,
                raw = truncate_chars(&value.to_string(), RAW_LOG_CHARS),
                "Analysis output violated the report contract: {e}"
            );
            AnalysisResult::ValidationError(e.to_string())
        }
    }
}
