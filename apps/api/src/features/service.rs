//! Cover letter, interview prep and job match generation.
//!
//! Each feature invokes the model once. `AiUnavailable` becomes 503 `AI_BUSY`;
//! unparsable or off-contract output becomes a generic 500 with the raw text logged.

use cvlens_contract::{
    CoverLetterResponse, InterviewPrepResponse, InterviewQuestion, JobMatchResponse,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::analysis::contract::job_fit_from_value;
use crate::analysis::orchestrator::AnalysisRequest;
use crate::analysis::prompts::GENERIC_JOB_SENTINEL;
use crate::errors::AppError;
use crate::features::prompts::{
    feature_system_instruction, fill_template, COVER_LETTER_PROMPT_TEMPLATE,
    INTERVIEW_PREP_PROMPT_TEMPLATE, JOB_MATCH_PROMPT_TEMPLATE,
};
use crate::llm_client::prompts::truncate_chars;
use crate::llm_client::{LlmError, ModelInvoker};

const RAW_LOG_CHARS: usize = 2_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCoverLetter {
    #[serde(default)]
    cover_letter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInterviewPrep {
    #[serde(default)]
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQuestion {
    #[serde(default)]
    question: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    answer_hint: Option<String>,
}

async fn run_feature(
    feature: &'static str,
    invoker: &ModelInvoker,
    template: &str,
    request: &AnalysisRequest,
) -> Result<Value, AppError> {
    let prompt = fill_template(
        template,
        request.cv_text(),
        request.job_description().unwrap_or(GENERIC_JOB_SENTINEL),
    );
    let system = feature_system_instruction(request.language());

    match invoker.call_json(&prompt, Some(system.as_str())).await {
        Ok((value, completion)) => {
            info!(feature, backend = %completion.backend, "Feature generation complete");
            Ok(value)
        }
        Err(LlmError::Unavailable(e)) => {
            warn!(feature, "Feature generation aborted: {e}");
            Err(AppError::AiBusy)
        }
        Err(LlmError::Unparsable { source, raw }) => {
            error!(
                feature,
                raw = truncate_chars(&raw, RAW_LOG_CHARS),
                "Unparsable feature output: {source}"
            );
            Err(AppError::AnalysisFailed(format!("{feature}: {source}")))
        }
    }
}

fn contract_violation(feature: &'static str, value: &Value, reason: impl std::fmt::Display) -> AppError {
    error!(
        feature,
        raw = truncate_chars(&value.to_string(), RAW_LOG_CHARS),
        "Feature output violated its contract: {reason}"
    );
    AppError::AnalysisFailed(format!("{feature}: {reason}"))
}

pub async fn generate_cover_letter(
    invoker: &ModelInvoker,
    request: &AnalysisRequest,
) -> Result<CoverLetterResponse, AppError> {
    const FEATURE: &str = "cover_letter";
    let value = run_feature(FEATURE, invoker, COVER_LETTER_PROMPT_TEMPLATE, request).await?;

    let raw: RawCoverLetter = serde_json::from_value(value.clone())
        .map_err(|e| contract_violation(FEATURE, &value, e))?;
    let cover_letter = raw
        .cover_letter
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| contract_violation(FEATURE, &value, "coverLetter is missing or empty"))?;

    Ok(CoverLetterResponse {
        cover_letter,
        language: request.language(),
    })
}

pub async fn generate_interview_prep(
    invoker: &ModelInvoker,
    request: &AnalysisRequest,
) -> Result<InterviewPrepResponse, AppError> {
    const FEATURE: &str = "interview_prep";
    let value = run_feature(FEATURE, invoker, INTERVIEW_PREP_PROMPT_TEMPLATE, request).await?;

    let raw: RawInterviewPrep = serde_json::from_value(value.clone())
        .map_err(|e| contract_violation(FEATURE, &value, e))?;
    let questions: Vec<InterviewQuestion> = raw
        .questions
        .into_iter()
        .filter(|q| !q.question.trim().is_empty())
        .map(|q| InterviewQuestion {
            question: q.question.trim().to_string(),
            category: q
                .category
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "general".to_string()),
            answer_hint: q.answer_hint.unwrap_or_default().trim().to_string(),
        })
        .collect();

    if questions.is_empty() {
        return Err(contract_violation(FEATURE, &value, "no interview questions"));
    }

    Ok(InterviewPrepResponse {
        questions,
        language: request.language(),
    })
}

/// Requires a concrete (non-generic) job description.
pub async fn match_job(
    invoker: &ModelInvoker,
    request: &AnalysisRequest,
) -> Result<JobMatchResponse, AppError> {
    const FEATURE: &str = "job_match";
    if request.job_description().is_none() {
        return Err(AppError::Validation(
            "A job description is required for job matching.".to_string(),
        ));
    }

    let value = run_feature(FEATURE, invoker, JOB_MATCH_PROMPT_TEMPLATE, request).await?;
    let job_fit =
        job_fit_from_value(value.clone()).map_err(|e| contract_violation(FEATURE, &value, e))?;

    Ok(JobMatchResponse { job_fit })
}
