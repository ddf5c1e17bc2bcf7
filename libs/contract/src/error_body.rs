use serde::{Deserialize, Serialize};

/// Machine-readable error codes carried in `ErrorBody::error`.
pub mod codes {
    pub const NO_FILE: &str = "NO_FILE";
    pub const UNSUPPORTED_FILE_TYPE: &str = "UNSUPPORTED_FILE_TYPE";
    pub const FILE_TOO_LARGE: &str = "FILE_TOO_LARGE";
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
    pub const NOT_A_CV: &str = "NOT_A_CV";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const AI_BUSY: &str = "AI_BUSY";
    pub const ANALYSIS_FAILED: &str = "ANALYSIS_FAILED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Body of every non-2xx response: `{"error": CODE, "message": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: code.to_string(),
            message: Some(message.into()),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.error == codes::AI_BUSY
    }
}
