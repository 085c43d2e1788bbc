//! Retention rule.

use std::fmt;

use a3s_reaper_core::RunConfig;
use chrono::{DateTime, Utc};

use crate::registry::ImageRecord;

/// Why an image survives the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepReason {
    /// At least one tag matches the protected predicate
    Protected { tag: String },
    /// Pushed more recently than the cutoff
    TooYoung { age: chrono::Duration },
}

/// Decision for a single image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionDecision {
    Keep {
        image: ImageRecord,
        reason: KeepReason,
    },
    Untagged(ImageRecord),
    Delete(ImageRecord),
}

impl RetentionDecision {
    pub fn image(&self) -> &ImageRecord {
        match self {
            RetentionDecision::Keep { image, .. } => image,
            RetentionDecision::Untagged(image) => image,
            RetentionDecision::Delete(image) => image,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, RetentionDecision::Delete(_))
    }
}

impl fmt::Display for RetentionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionDecision::Keep {
                reason: KeepReason::Protected { tag },
                ..
            } => write!(f, "keep (protected: {})", tag),
            RetentionDecision::Keep {
                reason: KeepReason::TooYoung { age },
                ..
            } => write!(f, "keep ({}d old)", age.num_days()),
            RetentionDecision::Untagged(_) => write!(f, "untagged"),
            RetentionDecision::Delete(_) => write!(f, "delete"),
        }
    }
}

/// Classify one image. Rules apply in order:
///
/// 1. no tags → `Untagged`
/// 2. any protected tag → `Keep`, even if other tags are unprotected
/// 3. younger than the cutoff → `Keep`
/// 4. otherwise → `Delete`
pub fn classify(image: ImageRecord, config: &RunConfig, now: DateTime<Utc>) -> RetentionDecision {
    if image.is_untagged() {
        return RetentionDecision::Untagged(image);
    }

    if let Some(tag) = config.protected.first_match(&image.tags) {
        let reason = KeepReason::Protected {
            tag: tag.to_string(),
        };
        return RetentionDecision::Keep { image, reason };
    }

    let age = now.signed_duration_since(image.pushed_at);
    if age < config.cutoff {
        return RetentionDecision::Keep {
            image,
            reason: KeepReason::TooYoung { age },
        };
    }

    RetentionDecision::Delete(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::fake::{fixed_now, image};
    use a3s_reaper_core::ProtectedTags;

    fn config() -> RunConfig {
        RunConfig::new(["api"], "ghcr.io").unwrap()
    }

    #[test]
    fn test_untagged_regardless_of_age() {
        for age in [0, 29, 30, 31, 3650] {
            let decision = classify(image("1", &[], age), &config(), fixed_now());
            assert!(matches!(decision, RetentionDecision::Untagged(_)), "age {age}");
        }
    }

    #[test]
    fn test_protected_regardless_of_age() {
        for age in [0, 31, 3650] {
            let decision = classify(image("1", &["1.0.0-master"], age), &config(), fixed_now());
            assert!(
                matches!(
                    decision,
                    RetentionDecision::Keep {
                        reason: KeepReason::Protected { .. },
                        ..
                    }
                ),
                "age {age}"
            );
        }
    }

    #[test]
    fn test_one_protected_tag_protects_whole_image() {
        let decision = classify(
            image("1", &["feature-x", "release-main-2", "tmp"], 90),
            &config(),
            fixed_now(),
        );
        assert_eq!(
            decision,
            RetentionDecision::Keep {
                image: image("1", &["feature-x", "release-main-2", "tmp"], 90),
                reason: KeepReason::Protected {
                    tag: "release-main-2".to_string()
                },
            }
        );
    }

    #[test]
    fn test_protected_match_is_case_sensitive() {
        let decision = classify(image("1", &["MASTER"], 90), &config(), fixed_now());
        assert!(decision.is_delete());
    }

    #[test]
    fn test_young_image_is_kept() {
        let decision = classify(image("1", &["1.0.0-other"], 0), &config(), fixed_now());
        assert!(matches!(
            decision,
            RetentionDecision::Keep {
                reason: KeepReason::TooYoung { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_old_unprotected_image_is_deleted() {
        let decision = classify(
            image("4", &["1.0.0-other", "dont-ignore-this"], 31),
            &config(),
            fixed_now(),
        );
        assert!(decision.is_delete());
        assert_eq!(decision.image().digest, "4");
    }

    #[test]
    fn test_cutoff_boundary_is_eligible() {
        // Exactly cutoff old is no longer "younger than the cutoff".
        let decision = classify(image("1", &["v1"], 30), &config(), fixed_now());
        assert!(decision.is_delete());
        let decision = classify(image("1", &["v1"], 29), &config(), fixed_now());
        assert!(!decision.is_delete());
    }

    #[test]
    fn test_future_push_time_is_kept() {
        let decision = classify(image("1", &["v1"], -2), &config(), fixed_now());
        assert!(!decision.is_delete());
    }

    #[test]
    fn test_custom_rules() {
        let config = config()
            .with_cutoff_days(7)
            .unwrap()
            .with_protected(ProtectedTags::new(["prod"]).unwrap());

        assert!(classify(image("1", &["master"], 8), &config, fixed_now()).is_delete());
        assert!(!classify(image("2", &["prod-1"], 8), &config, fixed_now()).is_delete());
        assert!(!classify(image("3", &["v1"], 6), &config, fixed_now()).is_delete());
    }

    #[test]
    fn test_display() {
        let keep = classify(image("1", &["main"], 1), &config(), fixed_now());
        assert_eq!(keep.to_string(), "keep (protected: main)");
        let young = classify(image("1", &["v1"], 3), &config(), fixed_now());
        assert_eq!(young.to_string(), "keep (3d old)");
        assert_eq!(classify(image("1", &[], 3), &config(), fixed_now()).to_string(), "untagged");
        assert_eq!(classify(image("1", &["v1"], 45), &config(), fixed_now()).to_string(), "delete");
    }
}
