//! Validates parsed model JSON into the `ReportContract` wire type.
//!
//! The model's output is loosely typed: scores arrive as ints, floats or
//! numeric strings, optional strings arrive as "" or "N/A". Everything is
//! normalized here so nothing downstream trusts the raw shape.

use cvlens_contract::{
    ContactInfo, JobFit, KeywordSuggestion, ReportContract, ScoreBreakdown, Scores,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::analysis::prompts::NOT_A_CV_SENTINEL;

pub const DEFAULT_NOT_A_CV_MESSAGE: &str =
    "The uploaded document does not appear to be a CV or résumé.";

#[derive(Debug, Error, PartialEq)]
pub enum ContractError {
    #[error("model output has the wrong shape: {0}")]
    Shape(String),

    #[error("required field '{0}' is missing or empty")]
    MissingField(&'static str),

    #[error("jobFit is missing although a job description was supplied")]
    MissingJobFit,
}

// ────────────────────────────────────────────────────────────────────────────
// Raw model shapes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReport {
    #[serde(default)]
    contact_info: Option<RawContact>,
    #[serde(default)]
    scores: Option<RawScores>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    strengths: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    improvements: Vec<String>,
    #[serde(default)]
    job_fit: Option<RawJobFit>,
    #[serde(default, deserialize_with = "null_as_empty")]
    missing_keywords: Vec<RawKeyword>,
    #[serde(default)]
    improved_cv: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawContact {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    linkedin: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScores {
    #[serde(default, deserialize_with = "lenient_score")]
    current: Option<u8>,
    #[serde(default, deserialize_with = "lenient_score")]
    potential: Option<u8>,
    #[serde(default)]
    breakdown: Option<RawBreakdown>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBreakdown {
    #[serde(default, deserialize_with = "lenient_score")]
    ats_compatibility: Option<u8>,
    #[serde(default, deserialize_with = "lenient_score")]
    impact: Option<u8>,
    #[serde(default, deserialize_with = "lenient_score")]
    clarity: Option<u8>,
    #[serde(default, deserialize_with = "lenient_score")]
    keyword_match: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawJobFit {
    #[serde(default, deserialize_with = "lenient_score")]
    score: Option<u8>,
    #[serde(default, deserialize_with = "null_as_empty")]
    matched_keywords: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    missing_requirements: Vec<String>,
    #[serde(default)]
    verdict: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawKeyword {
    Plain(String),
    Detailed {
        keyword: String,
        #[serde(default)]
        suggestion: Option<String>,
    },
}

/// Treats an explicit `null` list the same as an absent one.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts 87, 87.4, "87" or "87%"; rounds and clamps into 0–100.
fn lenient_score<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(score_from_value(&value))
}

fn score_from_value(value: &Value) -> Option<u8> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    Some(number.round().clamp(0.0, 100.0) as u8)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("n/a") && !s.eq_ignore_ascii_case("null"))
}

// ────────────────────────────────────────────────────────────────────────────
// Sentinel + contract assembly
// ────────────────────────────────────────────────────────────────────────────

/// Returns the model's explanation when it classified the document as not a CV.
pub fn detect_not_a_cv(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    let flagged = match error {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    };
    if !flagged {
        return None;
    }
    if let Value::String(code) = error {
        if code != NOT_A_CV_SENTINEL {
            warn!("Model returned unexpected error sentinel '{code}', treating as NOT_A_CV");
        }
    }

    let message = value
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_NOT_A_CV_MESSAGE);
    Some(message.to_string())
}

/// Assembles a `ReportContract`, enforcing the score and jobFit invariants.
pub fn into_report(
    value: Value,
    cv_text: &str,
    has_job_description: bool,
) -> Result<ReportContract, ContractError> {
    let raw: RawReport =
        serde_json::from_value(value).map_err(|e| ContractError::Shape(e.to_string()))?;

    let raw_scores = raw.scores.ok_or(ContractError::MissingField("scores"))?;
    let current = raw_scores
        .current
        .ok_or(ContractError::MissingField("scores.current"))?;
    let mut potential = raw_scores
        .potential
        .ok_or(ContractError::MissingField("scores.potential"))?;
    if potential < current {
        warn!("Model returned potential {potential} < current {current}; raising potential");
        potential = current;
    }
    let breakdown = raw_scores.breakdown.unwrap_or_default();

    let summary = non_blank(raw.summary).ok_or(ContractError::MissingField("summary"))?;
    let improved_cv = non_blank(raw.improved_cv).ok_or(ContractError::MissingField("improvedCv"))?;

    let job_fit = match (has_job_description, raw.job_fit) {
        (true, Some(fit)) => Some(into_job_fit(fit)?),
        (true, None) => return Err(ContractError::MissingJobFit),
        (false, Some(_)) => {
            warn!("Model returned jobFit for a generic application; dropping it");
            None
        }
        (false, None) => None,
    };

    let contact = raw.contact_info.unwrap_or_default();

    Ok(ReportContract {
        contact_info: ContactInfo {
            name: non_blank(contact.name).unwrap_or_default(),
            email: non_blank(contact.email),
            phone: non_blank(contact.phone),
            location: non_blank(contact.location),
            linkedin: non_blank(contact.linkedin),
        },
        scores: Scores {
            current,
            potential,
            breakdown: ScoreBreakdown {
                ats_compatibility: breakdown.ats_compatibility.unwrap_or(0),
                impact: breakdown.impact.unwrap_or(0),
                clarity: breakdown.clarity.unwrap_or(0),
                keyword_match: breakdown.keyword_match.unwrap_or(0),
            },
        },
        summary,
        strengths: raw.strengths,
        improvements: raw.improvements,
        job_fit,
        missing_keywords: raw
            .missing_keywords
            .into_iter()
            .map(|k| match k {
                RawKeyword::Plain(keyword) => KeywordSuggestion {
                    keyword,
                    suggestion: None,
                },
                RawKeyword::Detailed {
                    keyword,
                    suggestion,
                } => KeywordSuggestion {
                    keyword,
                    suggestion: non_blank(suggestion),
                },
            })
            .filter(|k| !k.keyword.trim().is_empty())
            .collect(),
        improved_cv,
        cv_text: cv_text.to_string(),
    })
}

pub(crate) fn into_job_fit(raw: RawJobFit) -> Result<JobFit, ContractError> {
    Ok(JobFit {
        score: raw.score.ok_or(ContractError::MissingField("jobFit.score"))?,
        matched_keywords: raw.matched_keywords,
        missing_requirements: raw.missing_requirements,
        verdict: non_blank(raw.verdict).unwrap_or_default(),
    })
}

/// Reads `{"jobFit": {...}}` (or a bare job-fit object) from `/job-match` output.
pub fn job_fit_from_value(value: Value) -> Result<JobFit, ContractError> {
    let inner = match value {
        Value::Object(mut map) if map.contains_key("jobFit") => {
            map.remove("jobFit").unwrap_or(Value::Null)
        }
        other => other,
    };
    if inner.is_null() {
        return Err(ContractError::MissingJobFit);
    }
    let raw: RawJobFit =
        serde_json::from_value(inner).map_err(|e| ContractError::Shape(e.to_string()))?;
    into_job_fit(raw)
}
