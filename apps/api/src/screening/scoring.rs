//! Scoring Engine: deterministic weighted combination of the four criterion
//! scores into one overall score and a template explanation.
//!
//! Algorithm:
//! 1. Normalize weights so they sum to 1 (all-zero weights are rejected).
//! 2. overall = Σ criterion × normalized_weight
//! 3. Round to one decimal, half-up; clamp to [0, 100].
//!
//! Nothing here calls a stage. The explanation is derived purely from the
//! numbers passed in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SKILLS_MATCH: &str = "skills_match";
pub const RELEVANT_EXPERIENCE: &str = "relevant_experience";
pub const ROLE_ALIGNMENT: &str = "role_alignment";
pub const EDUCATION_CERTIFICATIONS: &str = "education_certifications";

pub const WEIGHT_KEYS: [&str; 4] = [
    SKILLS_MATCH,
    RELEVANT_EXPERIENCE,
    ROLE_ALIGNMENT,
    EDUCATION_CERTIFICATIONS,
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightsError {
    #[error("unrecognized scoring weight '{0}' (expected one of: {keys})", keys = WEIGHT_KEYS.join(", "))]
    UnknownKey(String),

    #[error("scoring weight '{key}' must be a finite, non-negative number (got {value})")]
    InvalidValue { key: String, value: f64 },

    #[error("scoring weights must not all be zero")]
    ZeroSum,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub skills_match: f64,
    pub relevant_experience: f64,
    pub role_alignment: f64,
    pub education_certifications: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            skills_match: 0.40,
            relevant_experience: 0.35,
            role_alignment: 0.15,
            education_certifications: 0.10,
        }
    }
}

impl ScoringWeights {
    /// Applies caller overrides on top of the defaults. Keys left out keep
    /// their default weight.
    pub fn from_overrides(overrides: &BTreeMap<String, f64>) -> Result<Self, WeightsError> {
        let mut weights = Self::default();
        for (key, &value) in overrides {
            if !value.is_finite() || value < 0.0 {
                return Err(WeightsError::InvalidValue {
                    key: key.clone(),
                    value,
                });
            }
            match key.as_str() {
                SKILLS_MATCH => weights.skills_match = value,
                RELEVANT_EXPERIENCE => weights.relevant_experience = value,
                ROLE_ALIGNMENT => weights.role_alignment = value,
                EDUCATION_CERTIFICATIONS => weights.education_certifications = value,
                other => return Err(WeightsError::UnknownKey(other.to_string())),
            }
        }
        Ok(weights)
    }

    pub fn sum(&self) -> f64 {
        self.skills_match + self.relevant_experience + self.role_alignment + self.education_certifications
    }

    /// Returns the weights scaled to sum to 1.
    pub fn normalized(&self) -> Result<Self, WeightsError> {
        let values = [
            (SKILLS_MATCH, self.skills_match),
            (RELEVANT_EXPERIENCE, self.relevant_experience),
            (ROLE_ALIGNMENT, self.role_alignment),
            (EDUCATION_CERTIFICATIONS, self.education_certifications),
        ];
        if let Some((key, value)) = values
            .iter()
            .find(|(_, v)| !v.is_finite() || *v < 0.0)
        {
            return Err(WeightsError::InvalidValue {
                key: key.to_string(),
                value: *value,
            });
        }

        let total = self.sum();
        if total <= 0.0 {
            return Err(WeightsError::ZeroSum);
        }
        Ok(Self {
            skills_match: self.skills_match / total,
            relevant_experience: self.relevant_experience / total,
            role_alignment: self.role_alignment / total,
            education_certifications: self.education_certifications / total,
        })
    }
}

/// The four per-criterion scores, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriterionScores {
    pub skills_score: f64,
    pub experience_score: f64,
    pub role_alignment_score: f64,
    pub education_score: f64,
}

impl CriterionScores {
    pub fn clamped(self) -> Self {
        Self {
            skills_score: clamp_score(self.skills_score),
            experience_score: clamp_score(self.experience_score),
            role_alignment_score: clamp_score(self.role_alignment_score),
            education_score: clamp_score(self.education_score),
        }
    }
}

/// Clamps to [0, 100]; NaN becomes 0.
pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Round-half-up to `decimals` places.
///
/// The value is first settled at six extra places so that sums such as
/// 87.749999999999986 (binary error on 87.75) round as the decimal they
/// represent.
pub fn round_half_up(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    let settled = (value * factor * 1e6).round() / 1e6;
    (settled + 0.5).floor() / factor
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOutcome {
    pub overall_score: f64,
    pub explanation: String,
}

/// Combines criterion scores with the given weights.
pub fn score(
    criteria: &CriterionScores,
    weights: &ScoringWeights,
) -> Result<ScoreOutcome, WeightsError> {
    Ok(combine(criteria, &weights.normalized()?))
}

/// `score` for weights that are already normalized.
pub fn combine(criteria: &CriterionScores, w: &ScoringWeights) -> ScoreOutcome {
    let parts = [
        ("Skills", criteria.skills_score, w.skills_match),
        ("Experience", criteria.experience_score, w.relevant_experience),
        ("Role alignment", criteria.role_alignment_score, w.role_alignment),
        ("Education", criteria.education_score, w.education_certifications),
    ];

    let raw: f64 = parts.iter().map(|(_, value, weight)| value * weight).sum();
    let overall_score = clamp_score(round_half_up(raw, 1));

    let mut explanation = parts
        .iter()
        .map(|(label, value, weight)| {
            format!(
                "{label}: {value:.1}/100 x {:.1}% = {:.2}",
                weight * 100.0,
                value * weight
            )
        })
        .collect::<Vec<_>>()
        .join("; ");
    explanation.push_str(&format!("; Overall: {overall_score:.1}/100"));

    ScoreOutcome {
        overall_score,
        explanation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria(skills: f64, experience: f64, role: f64, education: f64) -> CriterionScores {
        CriterionScores {
            skills_score: skills,
            experience_score: experience,
            role_alignment_score: role,
            education_score: education,
        }
    }

    #[test]
    fn test_default_weights_score_example() {
        // 90*0.4 + 85*0.35 + 80*0.15 + 100*0.1 = 87.75 → 87.8
        let outcome = score(&criteria(90.0, 85.0, 80.0, 100.0), &ScoringWeights::default()).unwrap();
        assert_eq!(outcome.overall_score, 87.8);
    }

    #[test]
    fn test_unnormalized_weights_give_same_result() {
        let weights = ScoringWeights {
            skills_match: 40.0,
            relevant_experience: 35.0,
            role_alignment: 15.0,
            education_certifications: 10.0,
        };
        let outcome = score(&criteria(90.0, 85.0, 80.0, 100.0), &weights).unwrap();
        assert_eq!(outcome.overall_score, 87.8);
    }

    #[test]
    fn test_normalized_weights_sum_to_one() {
        let samples = [
            ScoringWeights::default(),
            ScoringWeights {
                skills_match: 3.0,
                relevant_experience: 1.0,
                role_alignment: 0.0,
                education_certifications: 7.5,
            },
            ScoringWeights {
                skills_match: 1e-9,
                relevant_experience: 0.0,
                role_alignment: 0.0,
                education_certifications: 0.0,
            },
            ScoringWeights {
                skills_match: 1.0 / 3.0,
                relevant_experience: 1.0 / 3.0,
                role_alignment: 1.0 / 3.0,
                education_certifications: 0.2,
            },
        ];
        for weights in samples {
            let sum = weights.normalized().unwrap().sum();
            assert!((sum - 1.0).abs() < 1e-12, "sum was {sum} for {weights:?}");
        }
    }

    #[test]
    fn test_all_zero_weights_rejected() {
        let weights = ScoringWeights {
            skills_match: 0.0,
            relevant_experience: 0.0,
            role_alignment: 0.0,
            education_certifications: 0.0,
        };
        assert_eq!(weights.normalized(), Err(WeightsError::ZeroSum));
        assert!(score(&criteria(50.0, 50.0, 50.0, 50.0), &weights).is_err());
    }

    #[test]
    fn test_score_is_monotonic_in_each_criterion() {
        let weights = ScoringWeights::default();
        let base = criteria(40.0, 55.0, 70.0, 20.0);
        let base_score = score(&base, &weights).unwrap().overall_score;
        for step in [0.01, 0.05, 0.5, 1.0, 10.0] {
            let bumped = [
                CriterionScores {
                    skills_score: base.skills_score + step,
                    ..base
                },
                CriterionScores {
                    experience_score: base.experience_score + step,
                    ..base
                },
                CriterionScores {
                    role_alignment_score: base.role_alignment_score + step,
                    ..base
                },
                CriterionScores {
                    education_score: base.education_score + step,
                    ..base
                },
            ];
            for c in bumped {
                let s = score(&c, &weights).unwrap().overall_score;
                assert!(s >= base_score, "{c:?} scored {s} < {base_score}");
            }
        }
    }

    #[test]
    fn test_overall_is_clamped_to_100() {
        let outcome = score(&criteria(150.0, 120.0, 100.0, 100.0), &ScoringWeights::default()).unwrap();
        assert_eq!(outcome.overall_score, 100.0);
    }

    #[test]
    fn test_zero_scores_give_zero_overall() {
        let outcome = score(&criteria(0.0, 0.0, 0.0, 0.0), &ScoringWeights::default()).unwrap();
        assert_eq!(outcome.overall_score, 0.0);
    }

    #[test]
    fn test_round_half_up_not_bankers() {
        assert_eq!(round_half_up(0.25, 1), 0.3);
        assert_eq!(round_half_up(0.35, 1), 0.4);
        assert_eq!(round_half_up(2.5, 0), 3.0);
        assert_eq!(round_half_up(87.749999999999986, 1), 87.8);
        assert_eq!(round_half_up(87.74, 1), 87.7);
        assert_eq!(round_half_up(66.666, 2), 66.67);
    }

    #[test]
    fn test_explanation_lists_each_criterion_and_weight() {
        let outcome = score(&criteria(90.0, 85.0, 80.0, 100.0), &ScoringWeights::default()).unwrap();
        assert!(outcome.explanation.contains("Skills: 90.0/100 x 40.0% = 36.00"));
        assert!(outcome.explanation.contains("Experience: 85.0/100 x 35.0% = 29.75"));
        assert!(outcome.explanation.contains("Role alignment: 80.0/100 x 15.0% = 12.00"));
        assert!(outcome.explanation.contains("Education: 100.0/100 x 10.0% = 10.00"));
        assert!(outcome.explanation.ends_with("Overall: 87.8/100"));
    }

    #[test]
    fn test_explanation_is_deterministic() {
        let c = criteria(61.3, 47.9, 88.0, 0.0);
        let first = score(&c, &ScoringWeights::default()).unwrap();
        let second = score(&c, &ScoringWeights::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_overrides_fill_missing_keys_with_defaults() {
        let overrides = BTreeMap::from([(SKILLS_MATCH.to_string(), 0.7)]);
        let weights = ScoringWeights::from_overrides(&overrides).unwrap();
        assert_eq!(weights.skills_match, 0.7);
        assert_eq!(weights.relevant_experience, 0.35);
        assert_eq!(weights.role_alignment, 0.15);
        assert_eq!(weights.education_certifications, 0.10);
    }

    #[test]
    fn test_overrides_reject_unknown_key() {
        let overrides = BTreeMap::from([("culture_fit".to_string(), 0.2)]);
        assert_eq!(
            ScoringWeights::from_overrides(&overrides),
            Err(WeightsError::UnknownKey("culture_fit".to_string()))
        );
    }

    #[test]
    fn test_overrides_reject_negative_weight() {
        let overrides = BTreeMap::from([(ROLE_ALIGNMENT.to_string(), -0.1)]);
        assert!(matches!(
            ScoringWeights::from_overrides(&overrides),
            Err(WeightsError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_clamp_score_handles_nan() {
        assert_eq!(clamp_score(f64::NAN), 0.0);
        assert_eq!(clamp_score(-5.0), 0.0);
        assert_eq!(clamp_score(42.5), 42.5);
    }
}
