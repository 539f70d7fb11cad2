use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::report::ScreeningReport;
use crate::screening::scoring::{CriterionScores, ScoringWeights};
use crate::stages::StageKind;

/// Characters of JD text kept on the history record.
pub const JD_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::InProgress => "in_progress",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    /// pending → in_progress → completed | failed. A pending record may fail
    /// directly; terminal states never move.
    pub fn can_transition_to(self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (Pending, Failed) | (InProgress, Completed) | (InProgress, Failed)
        )
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProcessingStatus::Pending),
            "in_progress" => Ok(ProcessingStatus::InProgress),
            "completed" => Ok(ProcessingStatus::Completed),
            "failed" => Ok(ProcessingStatus::Failed),
            other => Err(format!("unknown processing status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// One stage step as it actually ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTrace {
    pub stage: StageKind,
    pub status: TraceStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StageTrace {
    pub fn succeeded<T: Serialize>(stage: StageKind, attempts: u32, output: &T) -> Self {
        Self {
            stage,
            status: TraceStatus::Succeeded,
            attempts,
            output: serde_json::to_value(output).ok(),
            reason: None,
        }
    }

    pub fn failed(stage: StageKind, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            stage,
            status: TraceStatus::Failed,
            attempts,
            output: None,
            reason: Some(reason.into()),
        }
    }

    pub fn skipped(stage: StageKind, reason: impl Into<String>) -> Self {
        Self {
            stage,
            status: TraceStatus::Skipped,
            attempts: 0,
            output: None,
            reason: Some(reason.into()),
        }
    }
}

/// Inputs and result of the scoring step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringTrace {
    pub criteria: CriterionScores,
    pub weights: ScoringWeights,
    pub overall_score: f64,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTrace {
    pub input_index: usize,
    pub candidate_name: String,
    pub steps: Vec<StageTrace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringTrace>,
}

impl CandidateTrace {
    /// Stage steps plus the scoring step when one ran.
    pub fn reasoning_steps(&self) -> usize {
        self.steps.len() + usize::from(self.scoring.is_some())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntermediateOutputs {
    #[serde(default)]
    pub jd: Vec<StageTrace>,
    #[serde(default)]
    pub candidates: Vec<CandidateTrace>,
}

/// Audit record for one screening request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub model_provider: String,
    pub model_name: String,
    pub jd_file_ref: Option<String>,
    pub resume_file_refs: Vec<String>,
    pub jd_text_preview: Option<String>,
    pub resume_count: i32,
    pub processing_status: ProcessingStatus,
    pub report: Option<ScreeningReport>,
    pub intermediate_outputs: IntermediateOutputs,
    pub error_message: Option<String>,
    pub total_resumes_processed: i32,
    pub total_candidates_ranked: i32,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: ProcessingStatus,
    pub to: ProcessingStatus,
}

impl HistoryRecord {
    pub fn new(
        request_id: Uuid,
        model_provider: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            request_id,
            created_at: Utc::now(),
            model_provider: model_provider.into(),
            model_name: model_name.into(),
            jd_file_ref: None,
            resume_file_refs: Vec::new(),
            jd_text_preview: None,
            resume_count: 0,
            processing_status: ProcessingStatus::Pending,
            report: None,
            intermediate_outputs: IntermediateOutputs::default(),
            error_message: None,
            total_resumes_processed: 0,
            total_candidates_ranked: 0,
        }
    }

    /// Keeps the first `JD_PREVIEW_CHARS` characters (not bytes).
    pub fn set_jd_preview(&mut self, jd_text: &str) {
        self.jd_text_preview = Some(jd_text.chars().take(JD_PREVIEW_CHARS).collect());
    }

    fn transition(&mut self, next: ProcessingStatus) -> Result<(), InvalidTransition> {
        if !self.processing_status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.processing_status,
                to: next,
            });
        }
        self.processing_status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.transition(ProcessingStatus::InProgress)
    }

    pub fn complete(&mut self, report: ScreeningReport) -> Result<(), InvalidTransition> {
        self.transition(ProcessingStatus::Completed)?;
        let meta = &report.processing_metadata;
        self.total_resumes_processed = meta.total_resumes_received as i32;
        self.total_candidates_ranked = meta.total_candidates_ranked as i32;
        self.report = Some(report);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(ProcessingStatus::Failed)?;
        self.total_resumes_processed = self.intermediate_outputs.candidates.len() as i32;
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            request_id: self.request_id,
            created_at: self.created_at,
            model_provider: self.model_provider.clone(),
            model_name: self.model_name.clone(),
            jd_text_preview: self.jd_text_preview.clone(),
            resume_count: self.resume_count,
            processing_status: self.processing_status,
            error_message: self.error_message.clone(),
            total_resumes_processed: self.total_resumes_processed,
            total_candidates_ranked: self.total_candidates_ranked,
        }
    }
}

/// Listing view of a history record, without report or traces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub model_provider: String,
    pub model_name: String,
    pub jd_text_preview: Option<String>,
    pub resume_count: i32,
    pub processing_status: ProcessingStatus,
    pub error_message: Option<String>,
    pub total_resumes_processed: i32,
    pub total_candidates_ranked: i32,
}
