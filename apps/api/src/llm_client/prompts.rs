// Shared prompt constants and prompt-building utilities.
// Each service that needs LLM calls defines its own prompts.rs alongside it.
// This file contains cross-cutting prompt fragments.

use cvlens_contract::Language;

/// Instruction fragment that enforces JSON-only output.
pub const JSON_ONLY_INSTRUCTION: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Escape line breaks inside string values as \\n.";

/// Common instruction appended to every prompt that rewrites or summarizes a CV.
pub const NO_FABRICATION_INSTRUCTION: &str = "\
    CRITICAL: Use only facts present in the candidate's CV. \
    Do NOT invent employers, dates, degrees, certifications or metrics. \
    Where a metric would strengthen a statement but is missing, write a bracketed \
    placeholder such as [X%] for the candidate to fill in.";

/// The language every human-readable output field must be written in.
pub fn output_language_instruction(language: Language) -> &'static str {
    match language {
        Language::En => "Write every human-readable value in English.",
        Language::Tr => "Write every human-readable value in Turkish (Türkçe).",
        Language::Zh => "Write every human-readable value in Simplified Chinese (简体中文).",
    }
}

/// Substitutes `{name}` placeholders in a single pass. Inserted values are
/// never rescanned, so user text containing `{cv_text}` stays literal.
pub fn fill_placeholders(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let hit = after.find('}').and_then(|end| {
            let name = &after[..end];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });
        match hit {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Cuts `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
