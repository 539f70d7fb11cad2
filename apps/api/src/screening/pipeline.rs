//! Candidate pipeline: one resume through extract → parse → skill match →
//! experience evaluation → scoring.
//!
//! Every step appends a `StageTrace`. The first stage failure ends the
//! candidate with an `ExcludedCandidate`; nothing here ever fails the request.
//!
//! Missing data is resolved before scoring:
//! - no skills → skills score 0, skill stage skipped
//! - no experience → experience and role alignment 0, experience stage skipped
//! - education: 100 when the JD asks for nothing, 0 when it asks and the
//!   candidate lists nothing, else 50 per degree or certification (max 100)

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::extraction::DocumentExtractor;
use crate::llm_client::ModelConfig;
use crate::models::history::{CandidateTrace, ScoringTrace, StageTrace};
use crate::models::report::{ExcludedCandidate, Explanation, ScoreRecord};
use crate::models::screening::{
    normalize_terms, CandidateProfile, ExperienceEvaluation, JobRequirements, SkillMatch,
};
use crate::screening::request::{ResumeContent, ResumeSource};
use crate::screening::scoring::{self, CriterionScores, ScoringWeights};
use crate::stages::invoker::{StageFailure, StageInvoker};
use crate::stages::{AnalysisStages, ExperienceInput, SkillMatchInput, StageKind};

/// Criterion scores at or above this are listed as strengths.
const STRONG_SCORE: f64 = 80.0;

#[derive(Debug, Clone)]
pub enum CandidateOutcome {
    Scored(ScoreRecord),
    Excluded(ExcludedCandidate),
}

#[derive(Debug, Clone)]
pub struct CandidateRun {
    pub outcome: CandidateOutcome,
    pub trace: CandidateTrace,
}

/// Everything a pipeline needs for one request. Shared by all candidate tasks
/// through an `Arc`.
pub struct CandidatePipeline {
    stages: Arc<dyn AnalysisStages>,
    extractor: Arc<dyn DocumentExtractor>,
    invoker: StageInvoker,
    model: ModelConfig,
    requirements: Arc<JobRequirements>,
    /// Already normalized.
    weights: ScoringWeights,
}

impl CandidatePipeline {
    pub fn new(
        stages: Arc<dyn AnalysisStages>,
        extractor: Arc<dyn DocumentExtractor>,
        invoker: StageInvoker,
        model: ModelConfig,
        requirements: Arc<JobRequirements>,
        weights: ScoringWeights,
    ) -> Self {
        Self {
            stages,
            extractor,
            invoker,
            model,
            requirements,
            weights,
        }
    }

    pub async fn run(&self, source: ResumeSource) -> CandidateRun {
        let mut steps = Vec::new();
        let stages = self.stages.as_ref();
        let model = &self.model;
        let requirements = self.requirements.as_ref();

        // 1. Text
        let text = match &source.content {
            ResumeContent::Text(text) => text.clone(),
            ResumeContent::File(document) => match self.extractor.extract(document).await {
                Ok(text) => {
                    steps.push(StageTrace::succeeded(
                        StageKind::TextExtraction,
                        1,
                        &json!({ "document": document.label(), "characters": text.chars().count() }),
                    ));
                    text
                }
                Err(e) => {
                    let failure = StageFailure {
                        stage: StageKind::TextExtraction,
                        reason: e.to_string(),
                        attempts: 1,
                    };
                    return excluded(&source, source.fallback_name(), steps, failure);
                }
            },
        };

        // 2. Parse
        let text = text.as_str();
        let profile = match self
            .invoker
            .invoke(StageKind::ResumeParse, move || stages.parse_resume(model, text))
            .await
        {
            Ok(invoked) => {
                steps.push(StageTrace::succeeded(
                    StageKind::ResumeParse,
                    invoked.attempts,
                    &invoked.output,
                ));
                invoked.output
            }
            Err(failure) => return excluded(&source, source.fallback_name(), steps, failure),
        };
        let candidate_name = profile
            .candidate_name
            .clone()
            .unwrap_or_else(|| source.fallback_name());

        // 3. Skills
        let skills = if profile.skills.is_empty() {
            steps.push(StageTrace::skipped(
                StageKind::SkillMatch,
                "no skills listed in resume",
            ));
            unscored_skills(requirements)
        } else {
            let input = SkillMatchInput {
                mandatory_skills: &requirements.mandatory_skills,
                preferred_skills: &requirements.preferred_skills,
                candidate_skills: &profile.skills,
            };
            match self
                .invoker
                .invoke(StageKind::SkillMatch, move || stages.match_skills(model, input))
                .await
            {
                Ok(invoked) => {
                    steps.push(StageTrace::succeeded(
                        StageKind::SkillMatch,
                        invoked.attempts,
                        &invoked.output,
                    ));
                    invoked.output
                }
                Err(failure) => return excluded(&source, candidate_name, steps, failure),
            }
        };

        // 4. Experience
        let experience = if profile.experience.is_empty() {
            steps.push(StageTrace::skipped(
                StageKind::ExperienceEvaluation,
                "no work experience listed in resume",
            ));
            None
        } else {
            let input = ExperienceInput {
                requirements,
                experience: &profile.experience,
                total_years_experience: profile.total_years_experience,
            };
            match self
                .invoker
                .invoke(StageKind::ExperienceEvaluation, move || {
                    stages.evaluate_experience(model, input)
                })
                .await
            {
                Ok(invoked) => {
                    steps.push(StageTrace::succeeded(
                        StageKind::ExperienceEvaluation,
                        invoked.attempts,
                        &invoked.output,
                    ));
                    Some(invoked.output)
                }
                Err(failure) => return excluded(&source, candidate_name, steps, failure),
            }
        };

        // 5. Score
        let criteria = CriterionScores {
            skills_score: skills.skills_score,
            experience_score: experience.as_ref().map_or(0.0, |e| e.experience_score),
            role_alignment_score: experience.as_ref().map_or(0.0, |e| e.role_alignment_score),
            education_score: education_score(requirements, &profile),
        }
        .clamped();
        let outcome = scoring::combine(&criteria, &self.weights);

        let explanation = build_explanation(
            requirements,
            &profile,
            &skills,
            experience.as_ref(),
            &criteria,
            &outcome.explanation,
        );

        info!(
            candidate = %candidate_name,
            index = source.index,
            "Candidate scored {:.1}",
            outcome.overall_score
        );

        let trace = CandidateTrace {
            input_index: source.index,
            candidate_name: candidate_name.clone(),
            steps,
            scoring: Some(ScoringTrace {
                criteria,
                weights: self.weights,
                overall_score: outcome.overall_score,
                explanation: outcome.explanation.clone(),
            }),
        };

        CandidateRun {
            outcome: CandidateOutcome::Scored(ScoreRecord {
                candidate_name,
                input_index: source.index,
                scores: criteria,
                overall_score: outcome.overall_score,
                explanation,
                scoring_explanation: outcome.explanation,
                profile,
            }),
            trace,
        }
    }
}

fn excluded(
    source: &ResumeSource,
    candidate_name: String,
    mut steps: Vec<StageTrace>,
    failure: StageFailure,
) -> CandidateRun {
    warn!(
        candidate = %candidate_name,
        index = source.index,
        "Candidate excluded: {failure}"
    );
    steps.push(StageTrace::failed(
        failure.stage,
        failure.attempts,
        failure.reason.clone(),
    ));
    CandidateRun {
        outcome: CandidateOutcome::Excluded(ExcludedCandidate {
            input_index: source.index,
            candidate_name: candidate_name.clone(),
            stage: failure.stage,
            reason: failure.reason,
            attempts: failure.attempts,
        }),
        trace: CandidateTrace {
            input_index: source.index,
            candidate_name,
            steps,
            scoring: None,
        },
    }
}

/// Skill result used when the resume lists no skills.
fn unscored_skills(requirements: &JobRequirements) -> SkillMatch {
    SkillMatch {
        matched_mandatory_skills: Vec::new(),
        matched_preferred_skills: Vec::new(),
        missing_mandatory_skills: requirements.mandatory_skills.clone(),
        missing_preferred_skills: requirements.preferred_skills.clone(),
        skills_score: 0.0,
        explanation: "No skills listed in resume; skills score set to 0.".to_string(),
    }
}

pub fn education_score(requirements: &JobRequirements, profile: &CandidateProfile) -> f64 {
    if requirements.education_requirements.is_empty() {
        return 100.0;
    }
    let credentials = profile.education.len() + profile.certifications.len();
    (50.0 * credentials as f64).min(100.0)
}

fn build_explanation(
    requirements: &JobRequirements,
    profile: &CandidateProfile,
    skills: &SkillMatch,
    experience: Option<&ExperienceEvaluation>,
    criteria: &CriterionScores,
    scoring_explanation: &str,
) -> Explanation {
    let mut strengths = Vec::new();
    for skill in &skills.matched_mandatory_skills {
        strengths.push(format!("Has required skill: {skill}"));
    }
    for skill in &skills.matched_preferred_skills {
        strengths.push(format!("Has preferred skill: {skill}"));
    }
    let strong = [
        ("Strong skills match", criteria.skills_score),
        ("Strong relevant experience", criteria.experience_score),
        ("Strong role alignment", criteria.role_alignment_score),
    ];
    for (label, value) in strong {
        if value >= STRONG_SCORE {
            strengths.push(format!("{label} ({value:.1}/100)"));
        }
    }
    if !requirements.education_requirements.is_empty() && criteria.education_score >= STRONG_SCORE
    {
        strengths.push(format!(
            "Meets education requirements ({:.1}/100)",
            criteria.education_score
        ));
    }

    let mut gaps = Vec::new();
    for skill in &skills.missing_mandatory_skills {
        gaps.push(format!("Missing required skill: {skill}"));
    }
    for skill in &skills.missing_preferred_skills {
        gaps.push(format!("Missing preferred skill: {skill}"));
    }

    let mut missing_requirements = skills.missing_mandatory_skills.clone();
    let education_unmet =
        !requirements.education_requirements.is_empty() && criteria.education_score == 0.0;
    if education_unmet {
        missing_requirements.extend(requirements.education_requirements.iter().cloned());
    }

    let mut risk_flags = experience
        .map(|e| e.risk_flags.clone())
        .unwrap_or_default();
    if experience.is_some_and(|e| e.overqualified) {
        risk_flags.push("May be overqualified for the role".to_string());
    }
    if profile.skills.is_empty() {
        risk_flags.push("No skills listed in resume".to_string());
    }
    if profile.experience.is_empty() {
        risk_flags.push("No work experience listed in resume".to_string());
    }
    if education_unmet {
        risk_flags.push("No education or certifications listed".to_string());
    }
    if let Some(min_years) = requirements.min_years_experience {
        if profile.total_years_experience < min_years {
            risk_flags.push(format!(
                "Below minimum experience: {} of {} years",
                profile.total_years_experience, min_years
            ));
        }
    }
    normalize_terms(&mut risk_flags);

    let mut reasoning = Vec::new();
    if !skills.explanation.trim().is_empty() {
        reasoning.push(format!("Skills: {}", skills.explanation.trim()));
    }
    match experience {
        Some(e) if !e.explanation.trim().is_empty() => {
            reasoning.push(format!("Experience: {}", e.explanation.trim()));
        }
        Some(_) => {}
        None => reasoning.push(
            "Experience: No work experience listed; experience and role alignment set to 0."
                .to_string(),
        ),
    }
    reasoning.push(format!("Scoring: {scoring_explanation}"));

    Explanation {
        strengths,
        gaps,
        missing_requirements,
        risk_flags,
        reasoning: reasoning.join("\n"),
    }
}
