//! Wire types shared by the CVLens API server and the client core.
//!
//! Everything here is serialized as camelCase JSON. The server produces these
//! shapes; the client stores and renders them. Neither side may add fields
//! without updating both.

pub mod error_body;
pub mod features;
pub mod language;
pub mod report;

pub use error_body::{codes, ErrorBody};
pub use features::{
    CoverLetterResponse, FeatureRequest, InterviewPrepResponse, InterviewQuestion,
    JobMatchResponse,
};
pub use language::{Language, UnknownLanguage};
pub use report::{
    ContactInfo, JobFit, KeywordSuggestion, ReportContract, ScoreBreakdown, Scores,
};
