use axum::{
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection,
        FromRequest,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cvlens_contract::{codes, ErrorBody};
use thiserror::Error;

pub const GENERIC_FAILURE_MESSAGE: &str =
    "We could not complete the analysis. Please try again in a moment.";

pub const AI_BUSY_MESSAGE: &str =
    "Our AI service is busy right now. Please wait a moment and try again.";

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("No file provided")]
    NoFile,

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("File exceeds {limit} bytes")]
    FileTooLarge { limit: usize },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not a CV: {0}")]
    NotACv(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("AI backends unavailable")]
    AiBusy,

    /// Contract violation or unparsable model output. The detail is logged, never returned.
    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("Invalid JSON body: {}", rejection.body_text()))
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::Validation(format!("Invalid upload: {}", rejection.body_text()))
    }
}

/// `Json` extractor whose rejections use the `ErrorBody` shape.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NoFile => (
                StatusCode::BAD_REQUEST,
                codes::NO_FILE,
                "Please upload your CV as a PDF or text file.".to_string(),
            ),
            AppError::UnsupportedFileType(kind) => (
                StatusCode::BAD_REQUEST,
                codes::UNSUPPORTED_FILE_TYPE,
                format!("Unsupported file type '{kind}'. Upload a PDF, TXT or MD file."),
            ),
            AppError::FileTooLarge { limit } => (
                StatusCode::BAD_REQUEST,
                codes::FILE_TOO_LARGE,
                format!("The file is too large. The maximum size is {} MB.", limit / (1024 * 1024)),
            ),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, codes::INVALID_REQUEST, msg.clone())
            }
            AppError::NotACv(msg) => (StatusCode::BAD_REQUEST, codes::NOT_A_CV, msg.clone()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                codes::RATE_LIMITED,
                "Too many requests. Please wait a minute before trying again.".to_string(),
            ),
            AppError::AiBusy => (
                StatusCode::SERVICE_UNAVAILABLE,
                codes::AI_BUSY,
                AI_BUSY_MESSAGE.to_string(),
            ),
            AppError::AnalysisFailed(detail) => {
                tracing::error!("Analysis failed: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    codes::ANALYSIS_FAILED,
                    GENERIC_FAILURE_MESSAGE.to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    codes::INTERNAL_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
        };

        (status, Json(ErrorBody::new(code, message))).into_response()
    }
}
