// All LLM prompt constants for the follow-up features.

use cvlens_contract::Language;

use crate::llm_client::prompts::{
    fill_placeholders, output_language_instruction, JSON_ONLY_INSTRUCTION,
    NO_FABRICATION_INSTRUCTION,
};

const CAREER_COACH_PERSONA: &str = "You are an experienced career coach who writes \
    specific, evidence-based application material.";

pub fn feature_system_instruction(language: Language) -> String {
    format!(
        "{CAREER_COACH_PERSONA}\n{}\n{JSON_ONLY_INSTRUCTION}",
        output_language_instruction(language)
    )
}

/// Cover letter prompt. Replace: {no_fabrication}, {job_description}, {cv_text}
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"{no_fabrication}

Write a one-page cover letter (250–400 words) for the candidate below.
Open with the role and the single strongest reason the candidate fits it,
back two or three claims with evidence from the CV, and close with a call to action.

Return a JSON object:
{"coverLetter": "Dear Hiring Manager,\n\n..."}

TARGET JOB DESCRIPTION:
{job_description}

CANDIDATE CV:
{cv_text}"#;

/// Interview prep prompt. Replace: {no_fabrication}, {job_description}, {cv_text}
pub const INTERVIEW_PREP_PROMPT_TEMPLATE: &str = r#"{no_fabrication}

Prepare the candidate below for an interview. Produce 8 to 12 likely questions mixing
"technical", "behavioral" and "situational" categories, each grounded in the CV or the job.
For each question give a short hint on how THIS candidate should answer, citing CV evidence.

Return a JSON object:
{"questions": [{"question": "...", "category": "technical", "answerHint": "..."}]}

TARGET JOB DESCRIPTION:
{job_description}

CANDIDATE CV:
{cv_text}"#;

/// Job match prompt. Replace: {job_description}, {cv_text}
pub const JOB_MATCH_PROMPT_TEMPLATE: &str = r#"Compare the candidate CV against the job description.
Score the fit from 0 to 100 where 100 means every hard requirement is clearly evidenced.

Return a JSON object:
{"jobFit": {"score": 72, "matchedKeywords": ["..."], "missingRequirements": ["..."], "verdict": "One sentence verdict."}}

JOB DESCRIPTION:
{job_description}

CANDIDATE CV:
{cv_text}"#;

pub fn fill_template(template: &str, cv_text: &str, job_description: &str) -> String {
    fill_placeholders(
        template,
        &[
            ("no_fabrication", NO_FABRICATION_INSTRUCTION),
            ("job_description", job_description),
            ("cv_text", cv_text),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_template_replaces_every_placeholder() {
        for template in [
            COVER_LETTER_PROMPT_TEMPLATE,
            INTERVIEW_PREP_PROMPT_TEMPLATE,
            JOB_MATCH_PROMPT_TEMPLATE,
        ] {
            let prompt = fill_template(template, "CV BODY", "JD BODY");
            assert!(prompt.contains("CV BODY"));
            assert!(prompt.contains("JD BODY"));
            assert!(!prompt.contains("{cv_text}"));
            assert!(!prompt.contains("{job_description}"));
            assert!(!prompt.contains("{no_fabrication}"));
        }
    }
}
