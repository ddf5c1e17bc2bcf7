//! Paid-feature entitlements and the paywall predicate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A purchasable feature, identified on the wire by its snake_case id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    CvDownload,
    CoverLetter,
    InterviewPrep,
    Premium,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown feature id '{0}'")]
pub struct UnknownFeature(pub String);

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::CvDownload,
        Feature::CoverLetter,
        Feature::InterviewPrep,
        Feature::Premium,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Feature::CvDownload => "cv_download",
            Feature::CoverLetter => "cover_letter",
            Feature::InterviewPrep => "interview_prep",
            Feature::Premium => "premium",
        }
    }
}

impl FromStr for Feature {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|f| f.id() == s.trim())
            .ok_or_else(|| UnknownFeature(s.to_string()))
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Feature-access flags. Monotonic: flags only go from false to true,
/// except through an explicit logout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntitlementState {
    pub is_paid_cv_download: bool,
    pub has_cover_letter_access: bool,
    pub has_interview_prep_access: bool,
    pub has_premium_access: bool,
}

impl EntitlementState {
    /// Premium implies every other flag.
    pub fn normalized(self) -> Self {
        if !self.has_premium_access {
            return self;
        }
        Self {
            is_paid_cv_download: true,
            has_cover_letter_access: true,
            has_interview_prep_access: true,
            has_premium_access: true,
        }
    }

    pub fn grant(&mut self, feature: Feature) {
        match feature {
            Feature::CvDownload => self.is_paid_cv_download = true,
            Feature::CoverLetter => self.has_cover_letter_access = true,
            Feature::InterviewPrep => self.has_interview_prep_access = true,
            Feature::Premium => self.has_premium_access = true,
        }
        *self = self.normalized();
    }

    /// Flag-wise OR. Never clears a flag that either side has set.
    pub fn merge(self, other: Self) -> Self {
        Self {
            is_paid_cv_download: self.is_paid_cv_download || other.is_paid_cv_download,
            has_cover_letter_access: self.has_cover_letter_access || other.has_cover_letter_access,
            has_interview_prep_access: self.has_interview_prep_access
                || other.has_interview_prep_access,
            has_premium_access: self.has_premium_access || other.has_premium_access,
        }
        .normalized()
    }
}

/// Paywall gate. Premium unlocks everything.
pub fn can_access(feature: Feature, state: &EntitlementState) -> bool {
    if state.has_premium_access {
        return true;
    }
    match feature {
        Feature::CvDownload => state.is_paid_cv_download,
        Feature::CoverLetter => state.has_cover_letter_access,
        Feature::InterviewPrep => state.has_interview_prep_access,
        Feature::Premium => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_ids_round_trip() {
        for feature in Feature::ALL {
            assert_eq!(feature.id().parse::<Feature>(), Ok(feature));
        }
        assert_eq!(
            "gold_tier".parse::<Feature>(),
            Err(UnknownFeature("gold_tier".to_string()))
        );
    }

    #[test]
    fn test_premium_grants_everything() {
        let mut state = EntitlementState::default();
        state.grant(Feature::Premium);
        assert!(state.is_paid_cv_download);
        assert!(state.has_cover_letter_access);
        assert!(state.has_interview_prep_access);
        for feature in Feature::ALL {
            assert!(can_access(feature, &state));
        }
    }

    #[test]
    fn test_single_grant_unlocks_only_that_feature() {
        let mut state = EntitlementState::default();
        state.grant(Feature::CoverLetter);
        assert!(can_access(Feature::CoverLetter, &state));
        assert!(!can_access(Feature::InterviewPrep, &state));
        assert!(!can_access(Feature::CvDownload, &state));
        assert!(!can_access(Feature::Premium, &state));
    }

    #[test]
    fn test_merge_never_clears_flags() {
        let fresh = EntitlementState {
            has_cover_letter_access: true,
            ..Default::default()
        };
        let stale = EntitlementState {
            is_paid_cv_download: true,
            ..Default::default()
        };
        let merged = fresh.merge(stale);
        assert!(merged.has_cover_letter_access);
        assert!(merged.is_paid_cv_download);
        assert!(!merged.has_interview_prep_access);
    }

    #[test]
    fn test_stored_record_uses_camel_case_and_tolerates_missing_flags() {
        let state: EntitlementState =
            serde_json::from_str(r#"{"hasCoverLetterAccess":true}"#).unwrap();
        assert!(state.has_cover_letter_access);
        assert!(!state.is_paid_cv_download);

        let json = serde_json::to_value(EntitlementState::default()).unwrap();
        assert_eq!(json["isPaidCvDownload"], false);
        assert_eq!(json["hasPremiumAccess"], false);
    }
}
