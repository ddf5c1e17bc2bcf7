use serde::{Deserialize, Serialize};

/// The successful analysis report returned by `POST /analyze`.
///
/// Invariants (enforced by the server before serialization):
/// - `scores.potential >= scores.current`
/// - `job_fit` is `Some` iff a non-generic job description was supplied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportContract {
    pub contact_info: ContactInfo,
    pub scores: Scores,
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    pub job_fit: Option<JobFit>,
    #[serde(default)]
    pub missing_keywords: Vec<KeywordSuggestion>,
    pub improved_cv: String,
    /// The extracted CV text, echoed so follow-up features can run without re-upload.
    pub cv_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub linkedin: Option<String>,
}

/// All scores are on a 0–100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    pub current: u8,
    pub potential: u8,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub ats_compatibility: u8,
    pub impact: u8,
    pub clarity: u8,
    pub keyword_match: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFit {
    pub score: u8,
    #[serde(default)]
    pub matched_keywords: Vec<String>,
    #[serde(default)]
    pub missing_requirements: Vec<String>,
    pub verdict: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordSuggestion {
    pub keyword: String,
    pub suggestion: Option<String>,
}
