//! Axum route handler for `POST /analyze`.

use axum::{
    extract::{multipart::{MultipartError, MultipartRejection}, Multipart, State},
    http::StatusCode,
};
use bytes::Bytes;
use cvlens_contract::Language;
use tracing::{debug, warn};

use crate::analysis::orchestrator::{analyze, AnalysisRequest, AnalysisResult};
use crate::errors::AppError;
use crate::extract::{detect_kind, extract_text};
use crate::state::AppState;

struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    data: Bytes,
}

#[derive(Default)]
struct AnalyzeForm {
    file: Option<UploadedFile>,
    job_description: Option<String>,
    language: Option<String>,
}

/// POST /analyze
///
/// Multipart form: `file` (PDF/TXT/MD), optional `jobDescription`, optional `language`.
/// Input problems are rejected here, before the orchestrator is reached.
pub async fn handle_analyze(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<AnalysisResult, AppError> {
    let multipart = multipart?;
    let limit = state.config.max_upload_bytes;
    let form = read_form(multipart, limit).await?;

    let file = form.file.ok_or(AppError::NoFile)?;
    if file.data.is_empty() {
        return Err(AppError::NoFile);
    }
    if file.data.len() > limit {
        return Err(AppError::FileTooLarge { limit });
    }

    let kind = detect_kind(&file.file_name, file.content_type.as_deref())?;
    debug!(
        file_name = %file.file_name,
        bytes = file.data.len(),
        ?kind,
        "Extracting CV text"
    );
    let cv_text = extract_text(kind, file.data).await?;

    let language = parse_language(form.language.as_deref());
    let request = AnalysisRequest::new(
        &cv_text,
        form.job_description.as_deref(),
        language,
        state.config.max_cv_chars,
    );

    Ok(analyze(&state.invoker, &request).await)
}

async fn read_form(mut multipart: Multipart, limit: usize) -> Result<AnalyzeForm, AppError> {
    let mut form = AnalyzeForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(String::from);
                let data = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    data,
                });
            }
            "jobDescription" => {
                form.job_description =
                    Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            "language" => {
                form.language = Some(field.text().await.map_err(|e| multipart_error(e, limit))?);
            }
            other => debug!("Ignoring unknown multipart field '{other}'"),
        }
    }

    Ok(form)
}

fn multipart_error(e: MultipartError, limit: usize) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::FileTooLarge { limit }
    } else {
        AppError::Validation(format!("Malformed upload: {}", e.body_text()))
    }
}

/// Unknown or missing language codes fall back to English.
pub fn parse_language(raw: Option<&str>) -> Language {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Language::default(),
        Some(code) => code.parse().unwrap_or_else(|e| {
            warn!("{e}; falling back to English");
            Language::default()
        }),
    }
}
