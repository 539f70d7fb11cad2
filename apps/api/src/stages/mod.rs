//! Analysis stages: the externally hosted capabilities the screener consumes.
//!
//! Each stage sits behind a fixed input/output contract on `AnalysisStages`.
//! The core never assumes how a stage decides; it only validates the shape of
//! what comes back (`ValidateOutput`) and applies the retry policy in
//! `invoker::StageInvoker`.
//!
//! `AppState` holds an `Arc<dyn AnalysisStages>`: `LlmStages` in production, a
//! scripted stub in tests.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm_client::{LlmError, ModelConfig};
use crate::models::screening::{
    CandidateProfile, ExperienceEntry, ExperienceEvaluation, JobRequirements, SkillMatch,
};

pub mod invoker;
pub mod llm;
pub mod prompts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    TextExtraction,
    JdAnalysis,
    ResumeParse,
    SkillMatch,
    ExperienceEvaluation,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::TextExtraction => "text_extraction",
            StageKind::JdAnalysis => "jd_analysis",
            StageKind::ResumeParse => "resume_parse",
            StageKind::SkillMatch => "skill_match",
            StageKind::ExperienceEvaluation => "experience_evaluation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("output failed validation: {0}")]
    InvalidOutput(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Permanent(String),
}

impl StageError {
    pub fn is_transient(&self) -> bool {
        match self {
            StageError::Llm(e) => e.is_transient(),
            StageError::InvalidOutput(_) | StageError::Timeout(_) => true,
            StageError::Permanent(_) => false,
        }
    }
}

/// Shape check applied to every stage output before it is accepted.
pub trait ValidateOutput {
    fn validate(&self) -> Result<(), String>;
}

/// Skill-match input: the JD's skill sets against the candidate's skills.
#[derive(Debug, Clone, Copy)]
pub struct SkillMatchInput<'a> {
    pub mandatory_skills: &'a [String],
    pub preferred_skills: &'a [String],
    pub candidate_skills: &'a [String],
}

/// Experience-evaluation input: the JD against the candidate's work history.
#[derive(Debug, Clone, Copy)]
pub struct ExperienceInput<'a> {
    pub requirements: &'a JobRequirements,
    pub experience: &'a [ExperienceEntry],
    pub total_years_experience: f64,
}

/// One method per stage kind. Implement this to swap backends without
/// touching the pipeline or orchestrator.
#[async_trait]
pub trait AnalysisStages: Send + Sync {
    async fn analyze_jd(
        &self,
        model: &ModelConfig,
        jd_text: &str,
    ) -> Result<JobRequirements, StageError>;

    async fn parse_resume(
        &self,
        model: &ModelConfig,
        resume_text: &str,
    ) -> Result<CandidateProfile, StageError>;

    async fn match_skills(
        &self,
        model: &ModelConfig,
        input: SkillMatchInput<'_>,
    ) -> Result<SkillMatch, StageError>;

    async fn evaluate_experience(
        &self,
        model: &ModelConfig,
        input: ExperienceInput<'_>,
    ) -> Result<ExperienceEvaluation, StageError>;
}
