//! Screening orchestrator: one request from validation to persisted report.
//!
//! 1. Validate (no stage call before this passes)
//! 2. Create the history record (pending → in_progress)
//! 3. JD analysis once; failure is request-fatal
//! 4. Fan out one `CandidatePipeline` per resume on a `JoinSet`, bounded by
//!    the shared semaphore
//! 5. Rank, summarize, finalize the history record
//!
//! Cancellation (explicit or deadline) aborts in-flight pipelines. Each task
//! owns its semaphore permit, so aborting it frees the slot.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::extraction::{DocumentExtractor, ExtractionError};
use crate::history::{HistoryError, HistoryStore};
use crate::llm_client::ModelConfig;
use crate::models::history::{CandidateTrace, HistoryRecord, IntermediateOutputs, StageTrace};
use crate::models::report::{
    ExcludedCandidate, ProcessingMetadata, ReasoningSteps, ScreeningReport,
};
use crate::models::screening::JobRequirements;
use crate::screening::cancel::CancelSignal;
use crate::screening::pipeline::{CandidateOutcome, CandidatePipeline, CandidateRun};
use crate::screening::ranking;
use crate::screening::request::{
    JdSource, ValidateRequest, ValidatedRequest, ValidationError,
};
use crate::screening::scoring::ScoringWeights;
use crate::stages::invoker::{StageFailure, StageInvoker};
use crate::stages::{AnalysisStages, StageKind};

#[derive(Debug, Error)]
pub enum ScreeningError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("job description analysis failed: {0}")]
    JdAnalysis(StageFailure),

    #[error("job description extraction failed: {0}")]
    JdExtraction(#[from] ExtractionError),

    #[error("all {} candidate(s) failed processing", excluded.len())]
    AllCandidatesFailed { excluded: Vec<ExcludedCandidate> },

    #[error("screening request was cancelled")]
    Cancelled,

    #[error("history store error: {0}")]
    History(#[from] HistoryError),
}

pub struct ScreeningOrchestrator {
    stages: Arc<dyn AnalysisStages>,
    extractor: Arc<dyn DocumentExtractor>,
    history: Arc<dyn HistoryStore>,
    invoker: StageInvoker,
    concurrency: usize,
    pool: Arc<Semaphore>,
}

impl ScreeningOrchestrator {
    pub fn new(
        stages: Arc<dyn AnalysisStages>,
        extractor: Arc<dyn DocumentExtractor>,
        history: Arc<dyn HistoryStore>,
        invoker: StageInvoker,
        concurrency: usize,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            stages,
            extractor,
            history,
            invoker,
            concurrency,
            pool: Arc::new(Semaphore::new(concurrency)),
        }
    }

    /// Free worker slots. Equals the configured concurrency when idle.
    #[cfg(test)]
    pub fn available_slots(&self) -> usize {
        self.pool.available_permits()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn screen<R: ValidateRequest + ?Sized>(
        &self,
        request: &R,
        model: ModelConfig,
        cancel: CancelSignal,
    ) -> Result<ScreeningReport, ScreeningError> {
        let validated = request.validate()?;

        let request_id = Uuid::new_v4();
        let mut record = new_record(request_id, &model, &validated);
        self.history.create(&record).await?;
        if let Err(e) = record.start() {
            error!(%request_id, "History transition failed: {e}");
        }
        self.save(&record).await;

        info!(
            %request_id,
            resumes = validated.resumes.len(),
            provider = %model.provider,
            model = %model.model,
            "Screening started"
        );

        let result = self
            .run(
                request_id,
                validated,
                model,
                &cancel,
                &mut record.intermediate_outputs,
            )
            .await;

        let transition = match &result {
            Ok(report) => {
                info!(
                    %request_id,
                    ranked = report.processing_metadata.total_candidates_ranked,
                    excluded = report.processing_metadata.total_candidates_excluded,
                    "Screening completed"
                );
                record.complete(report.clone())
            }
            Err(e) => {
                warn!(%request_id, "Screening failed: {e}");
                record.fail(e.to_string())
            }
        };
        if let Err(e) = transition {
            error!(%request_id, "History transition failed: {e}");
        }
        self.save(&record).await;

        result
    }

    /// Finalization writes never fail the request.
    async fn save(&self, record: &HistoryRecord) {
        if let Err(e) = self.history.update(record).await {
            error!(
                request_id = %record.request_id,
                "Failed to persist history record: {e}"
            );
        }
    }

    async fn acquire(&self, cancel: &CancelSignal) -> Result<OwnedSemaphorePermit, ScreeningError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ScreeningError::Cancelled),
            permit = self.pool.clone().acquire_owned() => permit.map_err(|_| ScreeningError::Cancelled),
        }
    }

    async fn run(
        &self,
        request_id: Uuid,
        validated: ValidatedRequest,
        model: ModelConfig,
        cancel: &CancelSignal,
        intermediate: &mut IntermediateOutputs,
    ) -> Result<ScreeningReport, ScreeningError> {
        if cancel.is_cancelled() {
            return Err(ScreeningError::Cancelled);
        }

        let requirements = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ScreeningError::Cancelled),
            result = self.analyze_jd(&validated.jd, &model, cancel, intermediate) => result?,
        };
        info!(%request_id, role = %requirements.role_title, "JD analyzed");

        let pipeline = Arc::new(CandidatePipeline::new(
            self.stages.clone(),
            self.extractor.clone(),
            self.invoker.clone(),
            model.clone(),
            Arc::new(requirements),
            validated.weights,
        ));

        let total = validated.resumes.len();
        let mut pending: BTreeSet<usize> = BTreeSet::new();
        let mut fallback_names = Vec::with_capacity(total);
        let mut tasks = JoinSet::new();

        for source in validated.resumes {
            let permit = match self.acquire(cancel).await {
                Ok(permit) => permit,
                Err(e) => {
                    shutdown(&mut tasks).await;
                    return Err(e);
                }
            };
            pending.insert(source.index);
            fallback_names.push(source.fallback_name());
            let pipeline = pipeline.clone();
            tasks.spawn(async move {
                let _permit = permit;
                pipeline.run(source).await
            });
        }

        let mut runs: Vec<CandidateRun> = Vec::with_capacity(total);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(%request_id, "Screening cancelled with {} pipeline(s) in flight", tasks.len());
                    shutdown(&mut tasks).await;
                    runs.sort_by_key(|run| run.trace.input_index);
                    intermediate
                        .candidates
                        .extend(runs.into_iter().map(|run| run.trace));
                    return Err(ScreeningError::Cancelled);
                }
                next = tasks.join_next() => match next {
                    Some(Ok(run)) => {
                        pending.remove(&run.trace.input_index);
                        runs.push(run);
                    }
                    Some(Err(e)) => error!(%request_id, "Candidate pipeline task failed: {e}"),
                    None => break,
                },
            }
        }

        // a panicked task leaves its index behind
        for index in pending {
            runs.push(CandidateRun {
                outcome: CandidateOutcome::Excluded(ExcludedCandidate {
                    input_index: index,
                    candidate_name: fallback_names[index].clone(),
                    stage: StageKind::ResumeParse,
                    reason: "candidate pipeline aborted unexpectedly".to_string(),
                    attempts: 0,
                }),
                trace: CandidateTrace {
                    input_index: index,
                    candidate_name: fallback_names[index].clone(),
                    steps: Vec::new(),
                    scoring: None,
                },
            });
        }

        runs.sort_by_key(|run| run.trace.input_index);
        self.assemble(request_id, &model, total, validated.weights, runs, intermediate)
    }

    async fn analyze_jd(
        &self,
        jd: &JdSource,
        model: &ModelConfig,
        cancel: &CancelSignal,
        intermediate: &mut IntermediateOutputs,
    ) -> Result<JobRequirements, ScreeningError> {
        let text = match jd {
            JdSource::Text(text) => text.clone(),
            JdSource::File(document) => match self.extractor.extract(document).await {
                Ok(text) => {
                    intermediate.jd.push(StageTrace::succeeded(
                        StageKind::TextExtraction,
                        1,
                        &serde_json::json!({ "document": document.label(), "characters": text.chars().count() }),
                    ));
                    text
                }
                Err(e) => {
                    intermediate
                        .jd
                        .push(StageTrace::failed(StageKind::TextExtraction, 1, e.to_string()));
                    return Err(ScreeningError::JdExtraction(e));
                }
            },
        };

        let _permit = self.acquire(cancel).await?;
        let stages = self.stages.as_ref();
        let text = text.as_str();
        match self
            .invoker
            .invoke(StageKind::JdAnalysis, move || stages.analyze_jd(model, text))
            .await
        {
            Ok(invoked) => {
                intermediate.jd.push(StageTrace::succeeded(
                    StageKind::JdAnalysis,
                    invoked.attempts,
                    &invoked.output,
                ));
                Ok(invoked.output)
            }
            Err(failure) => {
                intermediate.jd.push(StageTrace::failed(
                    failure.stage,
                    failure.attempts,
                    failure.reason.clone(),
                ));
                Err(ScreeningError::JdAnalysis(failure))
            }
        }
    }

    fn assemble(
        &self,
        request_id: Uuid,
        model: &ModelConfig,
        total: usize,
        weights: ScoringWeights,
        runs: Vec<CandidateRun>,
        intermediate: &mut IntermediateOutputs,
    ) -> Result<ScreeningReport, ScreeningError> {
        let mut records = Vec::new();
        let mut excluded = Vec::new();
        let mut reasoning_steps = Vec::with_capacity(runs.len());

        for run in runs {
            reasoning_steps.push(ReasoningSteps {
                input_index: run.trace.input_index,
                candidate_name: run.trace.candidate_name.clone(),
                steps: run.trace.reasoning_steps(),
            });
            intermediate.candidates.push(run.trace);
            match run.outcome {
                CandidateOutcome::Scored(record) => records.push(record),
                CandidateOutcome::Excluded(candidate) => excluded.push(candidate),
            }
        }

        if records.is_empty() {
            return Err(ScreeningError::AllCandidatesFailed { excluded });
        }

        let ranked = ranking::rank(records);
        let summary = ranking::summarize(&ranked);

        Ok(ScreeningReport {
            processing_metadata: ProcessingMetadata {
                request_id,
                model_provider: model.provider.to_string(),
                model_name: model.model.clone(),
                total_resumes_received: total,
                total_candidates_ranked: ranked.len(),
                total_candidates_excluded: excluded.len(),
                reasoning_steps,
            },
            ranked_candidates: ranked,
            excluded_candidates: excluded,
            summary,
            scoring_weights_used: weights,
        })
    }
}

/// Aborts every task and waits until each has dropped, releasing its permit.
async fn shutdown(tasks: &mut JoinSet<CandidateRun>) {
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
}

fn new_record(request_id: Uuid, model: &ModelConfig, validated: &ValidatedRequest) -> HistoryRecord {
    let mut record = HistoryRecord::new(request_id, model.provider.to_string(), model.model.clone());
    match &validated.jd {
        JdSource::Text(text) => record.set_jd_preview(text),
        JdSource::File(document) => record.jd_file_ref = document.file_ref().map(str::to_string),
    }
    record.resume_file_refs = validated
        .resumes
        .iter()
        .filter_map(|r| r.file_ref().map(str::to_string))
        .collect();
    record.resume_count = validated.resumes.len() as i32;
    record
}
