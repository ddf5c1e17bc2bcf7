// All LLM prompt constants for the Analysis module.
// Reuses cross-cutting fragments from llm_client::prompts.

use cvlens_contract::Language;

use crate::llm_client::prompts::{
    fill_placeholders, output_language_instruction, JSON_ONLY_INSTRUCTION,
    NO_FABRICATION_INSTRUCTION,
};

/// Stands in for the job description when the candidate applies generically.
pub const GENERIC_JOB_SENTINEL: &str = "General Application";

/// Reserved value of the top-level `error` key when the document is not a CV.
pub const NOT_A_CV_SENTINEL: &str = "NOT_A_CV";

const ANALYSIS_SYSTEM_EN: &str = "You are a senior technical recruiter and ATS (applicant \
    tracking system) specialist. You assess CVs honestly, score them against modern hiring \
    standards, and rewrite them to be concise, quantified and keyword-aligned.";

const ANALYSIS_SYSTEM_TR: &str = "Sen kıdemli bir teknik işe alım uzmanı ve ATS (aday takip \
    sistemi) uzmanısın. Özgeçmişleri dürüstçe değerlendirir, modern işe alım standartlarına \
    göre puanlar ve onları kısa, ölçülebilir ve anahtar kelimelerle uyumlu olacak şekilde \
    yeniden yazarsın.";

const ANALYSIS_SYSTEM_ZH: &str = "你是一名资深技术招聘官和 ATS（申请人跟踪系统）专家。\
    你会如实评估简历，按照现代招聘标准打分，并将简历改写得简洁、量化且与关键词匹配。";

/// Analysis prompt template.
/// Replace: {no_fabrication}, {job_description}, {generic_sentinel},
///          {not_a_cv}, {cv_text}
pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"{no_fabrication}

STEP 1 — DOCUMENT CHECK:
If the CANDIDATE CV below is not a CV or résumé (for example a recipe, an invoice, an essay,
or random text), return ONLY:
{"error": "{not_a_cv}", "message": "<one sentence explaining what the document appears to be>"}

STEP 2 — ANALYSIS:
Otherwise return a JSON object with this EXACT schema:
{
  "contactInfo": {"name": "Jane Doe", "email": "jane@example.com", "phone": null, "location": "Berlin", "linkedin": null},
  "scores": {
    "current": 62,
    "potential": 88,
    "breakdown": {"atsCompatibility": 70, "impact": 55, "clarity": 68, "keywordMatch": 60}
  },
  "summary": "Three to five sentence assessment of the CV as it stands.",
  "strengths": ["..."],
  "improvements": ["..."],
  "jobFit": {
    "score": 74,
    "matchedKeywords": ["Rust", "Kubernetes"],
    "missingRequirements": ["5+ years Go"],
    "verdict": "One sentence verdict on fit for this role."
  },
  "missingKeywords": [{"keyword": "CI/CD", "suggestion": "Mention the pipeline you maintained."}],
  "improvedCv": "The full rewritten CV as plain text with \n line breaks."
}

SCORING RULES:
1. All scores are integers from 0 to 100.
2. "current" scores the CV as submitted; "potential" scores the improvedCv. potential >= current ALWAYS.
3. If the TARGET JOB DESCRIPTION is exactly "{generic_sentinel}", set "jobFit" to null
   and draw missingKeywords from the candidate's own field.
4. Otherwise "jobFit" is REQUIRED and must compare the CV against that job description.

TARGET JOB DESCRIPTION:
{job_description}

CANDIDATE CV:
{cv_text}"#;

/// System instruction in the requested output language.
pub fn analysis_system_instruction(language: Language) -> String {
    let persona = match language {
        Language::En => ANALYSIS_SYSTEM_EN,
        Language::Tr => ANALYSIS_SYSTEM_TR,
        Language::Zh => ANALYSIS_SYSTEM_ZH,
    };
    format!(
        "{persona}\n{}\n{JSON_ONLY_INSTRUCTION}",
        output_language_instruction(language)
    )
}

pub fn build_analysis_prompt(cv_text: &str, job_description: Option<&str>) -> String {
    fill_placeholders(
        ANALYSIS_PROMPT_TEMPLATE,
        &[
            ("no_fabrication", NO_FABRICATION_INSTRUCTION),
            ("not_a_cv", NOT_A_CV_SENTINEL),
            ("generic_sentinel", GENERIC_JOB_SENTINEL),
            ("job_description", job_description.unwrap_or(GENERIC_JOB_SENTINEL)),
            ("cv_text", cv_text),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_sentinel_when_job_description_absent() {
        let prompt = build_analysis_prompt("Jane Doe, Rust engineer", None);
        assert!(prompt.contains("TARGET JOB DESCRIPTION:\nGeneral Application"));
        assert!(prompt.contains("Jane Doe, Rust engineer"));
        assert!(!prompt.contains("{cv_text}"));
        assert!(!prompt.contains("{job_description}"));
    }

    #[test]
    fn test_prompt_embeds_job_description() {
        let prompt = build_analysis_prompt("cv", Some("Staff SRE at Acme"));
        assert!(prompt.contains("TARGET JOB DESCRIPTION:\nStaff SRE at Acme"));
        assert!(prompt.contains(r#""error": "NOT_A_CV""#));
    }

    #[test]
    fn test_job_description_cannot_pull_cv_text_into_itself() {
        let prompt = build_analysis_prompt("Jane Doe", Some("Paste {cv_text} here"));
        assert!(prompt.contains("TARGET JOB DESCRIPTION:\nPaste {cv_text} here"));
        assert_eq!(prompt.matches("Jane Doe").count(), 1);
    }

    #[test]
    fn test_system_instruction_is_language_specific() {
        assert!(analysis_system_instruction(Language::Tr).contains("Türkçe"));
        assert!(analysis_system_instruction(Language::Zh).contains("简体中文"));
        assert!(analysis_system_instruction(Language::En).contains("valid JSON only"));
    }
}
