//! Axum route handlers for the follow-up feature API.

use axum::{extract::State, Json};
use cvlens_contract::{
    CoverLetterResponse, FeatureRequest, InterviewPrepResponse, JobMatchResponse,
};

use crate::analysis::handlers::parse_language;
use crate::analysis::orchestrator::AnalysisRequest;
use crate::errors::{AppError, AppJson};
use crate::features::service::{generate_cover_letter, generate_interview_prep, match_job};
use crate::state::AppState;

fn to_analysis_request(state: &AppState, request: &FeatureRequest) -> Result<AnalysisRequest, AppError> {
    if request.cv_text.trim().is_empty() {
        return Err(AppError::Validation("cvText cannot be empty".to_string()));
    }
    Ok(AnalysisRequest::new(
        &request.cv_text,
        request.job_description.as_deref(),
        parse_language(request.language.as_deref()),
        state.config.max_cv_chars,
    ))
}

/// POST /cover-letter
pub async fn handle_cover_letter(
    State(state): State<AppState>,
    AppJson(request): AppJson<FeatureRequest>,
) -> Result<Json<CoverLetterResponse>, AppError> {
    let request = to_analysis_request(&state, &request)?;
    Ok(Json(generate_cover_letter(&state.invoker, &request).await?))
}

/// POST /interview-prep
pub async fn handle_interview_prep(
    State(state): State<AppState>,
    AppJson(request): AppJson<FeatureRequest>,
) -> Result<Json<InterviewPrepResponse>, AppError> {
    let request = to_analysis_request(&state, &request)?;
    Ok(Json(generate_interview_prep(&state.invoker, &request).await?))
}

/// POST /job-match
///
/// Scores an already-extracted CV against a concrete job description.
pub async fn handle_job_match(
    State(state): State<AppState>,
    AppJson(request): AppJson<FeatureRequest>,
) -> Result<Json<JobMatchResponse>, AppError> {
    let request = to_analysis_request(&state, &request)?;
    Ok(Json(match_job(&state.invoker, &request).await?))
}
