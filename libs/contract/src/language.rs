use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Output language of every AI-generated artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Tr,
    Zh,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported language code '{0}'")]
pub struct UnknownLanguage(pub String);

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Tr => "tr",
            Language::Zh => "zh",
        }
    }
}

impl FromStr for Language {
    type Err = UnknownLanguage;

    /// Accepts bare codes and region-qualified tags (`zh-CN`, `tr_TR`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let primary = s
            .trim()
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "en" => Ok(Language::En),
            "tr" => Ok(Language::Tr),
            "zh" => Ok(Language::Zh),
            _ => Err(UnknownLanguage(s.to_string())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_region_tags() {
        assert_eq!("zh-CN".parse::<Language>(), Ok(Language::Zh));
        assert_eq!("TR_tr".parse::<Language>(), Ok(Language::Tr));
        assert_eq!(" en ".parse::<Language>(), Ok(Language::En));
    }

    #[test]
    fn test_rejects_unknown_code() {
        assert_eq!(
            "de".parse::<Language>(),
            Err(UnknownLanguage("de".to_string()))
        );
    }

    #[test]
    fn test_serde_uses_lowercase_codes() {
        assert_eq!(serde_json::to_string(&Language::Zh).unwrap(), r#""zh""#);
        let lang: Language = serde_json::from_str(r#""tr""#).unwrap();
        assert_eq!(lang, Language::Tr);
    }
}
