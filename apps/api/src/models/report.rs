use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::screening::CandidateProfile;
use crate::screening::scoring::{CriterionScores, ScoringWeights};
use crate::stages::StageKind;

/// Deterministically assembled evidence for one candidate's score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub strengths: Vec<String>,
    pub gaps: Vec<String>,
    pub missing_requirements: Vec<String>,
    pub risk_flags: Vec<String>,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub candidate_name: String,
    /// Zero-based position of the resume in the request.
    pub input_index: usize,
    pub scores: CriterionScores,
    pub overall_score: f64,
    pub explanation: Explanation,
    pub scoring_explanation: String,
    pub profile: CandidateProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub rank: usize,
    #[serde(flatten)]
    pub record: ScoreRecord,
}

/// A candidate that ended its pipeline before producing a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedCandidate {
    pub input_index: usize,
    pub candidate_name: String,
    pub stage: StageKind,
    pub reason: String,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCandidate {
    pub candidate_name: String,
    pub overall_score: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreStatistics {
    pub total_candidates: usize,
    pub average_score: f64,
    pub max_score: f64,
    pub min_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreeningSummary {
    pub top_candidates: Vec<TopCandidate>,
    pub common_gaps: Vec<String>,
    pub hiring_risks: Vec<String>,
    pub statistics: ScoreStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningSteps {
    pub input_index: usize,
    pub candidate_name: String,
    pub steps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub request_id: Uuid,
    pub model_provider: String,
    pub model_name: String,
    pub total_resumes_received: usize,
    pub total_candidates_ranked: usize,
    pub total_candidates_excluded: usize,
    pub reasoning_steps: Vec<ReasoningSteps>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningReport {
    pub ranked_candidates: Vec<RankedResult>,
    pub excluded_candidates: Vec<ExcludedCandidate>,
    pub summary: ScreeningSummary,
    pub scoring_weights_used: ScoringWeights,
    pub processing_metadata: ProcessingMetadata,
}
