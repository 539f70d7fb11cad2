//! Shared test fixtures: a scripted `AnalysisStages` stub and sample payloads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, LlmSettings, ScreeningSettings};
use crate::extraction::LocalFileExtractor;
use crate::history::MemoryHistoryStore;
use crate::llm_client::{LlmError, ModelConfig, Provider, DEFAULT_TEMPERATURE};
use crate::models::screening::{
    CandidateProfile, EducationEntry, ExperienceEntry, ExperienceEvaluation, JobRequirements,
    SkillMatch,
};
use crate::screening::orchestrator::ScreeningOrchestrator;
use crate::state::AppState;
use crate::stages::invoker::{RetryPolicy, StageInvoker};
use crate::stages::{AnalysisStages, ExperienceInput, SkillMatchInput, StageError};

#[derive(Default)]
pub struct StageCalls {
    pub jd: AtomicU32,
    pub parse: AtomicU32,
    pub skills: AtomicU32,
    pub experience: AtomicU32,
}

impl StageCalls {
    pub fn total(&self) -> u32 {
        self.jd.load(Ordering::SeqCst)
            + self.parse.load(Ordering::SeqCst)
            + self.skills.load(Ordering::SeqCst)
            + self.experience.load(Ordering::SeqCst)
    }
}

/// Scripted stages.
///
/// - JD analysis returns `requirements`, or fails permanently when `None`.
/// - Resume parse looks the resume text up in `profiles`; unknown text fails
///   with a 503 every attempt.
/// - Skill match is computed from set overlap (70% mandatory, 30% preferred).
/// - Experience evaluation looks up the first entry's company in
///   `experience`, defaulting to 70 / 60.
pub struct StubStages {
    requirements: Option<JobRequirements>,
    profiles: HashMap<String, CandidateProfile>,
    experience: HashMap<String, ExperienceEvaluation>,
    delay: Duration,
    slow_resumes: HashMap<String, Duration>,
    pub calls: StageCalls,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl StubStages {
    pub fn new(requirements: JobRequirements) -> Self {
        Self {
            requirements: Some(requirements),
            profiles: HashMap::new(),
            experience: HashMap::new(),
            delay: Duration::ZERO,
            slow_resumes: HashMap::new(),
            calls: StageCalls::default(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing_jd() -> Self {
        Self {
            requirements: None,
            ..Self::new(requirements())
        }
    }

    pub fn with_profile(mut self, resume_text: &str, profile: CandidateProfile) -> Self {
        self.profiles.insert(resume_text.to_string(), profile);
        self
    }

    pub fn with_experience(mut self, company: &str, evaluation: ExperienceEvaluation) -> Self {
        self.experience.insert(company.to_string(), evaluation);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Extra delay when parsing this resume text, on top of `with_delay`.
    pub fn with_slow_resume(mut self, resume_text: &str, delay: Duration) -> Self {
        self.slow_resumes.insert(resume_text.to_string(), delay);
        self
    }

    async fn busy(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn split(required: &[String], candidate: &[String]) -> (Vec<String>, Vec<String>) {
    required
        .iter()
        .cloned()
        .partition(|skill| candidate.iter().any(|c| c.eq_ignore_ascii_case(skill)))
}

fn coverage(matched: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        matched as f64 / total as f64
    }
}

#[async_trait]
impl AnalysisStages for StubStages {
    async fn analyze_jd(
        &self,
        _model: &ModelConfig,
        _jd_text: &str,
    ) -> Result<JobRequirements, StageError> {
        self.calls.jd.fetch_add(1, Ordering::SeqCst);
        self.busy().await;
        self.requirements
            .clone()
            .ok_or_else(|| StageError::Permanent("stub JD analysis failure".to_string()))
    }

    async fn parse_resume(
        &self,
        _model: &ModelConfig,
        resume_text: &str,
    ) -> Result<CandidateProfile, StageError> {
        self.calls.parse.fetch_add(1, Ordering::SeqCst);
        self.busy().await;
        if let Some(delay) = self.slow_resumes.get(resume_text) {
            tokio::time::sleep(*delay).await;
        }
        self.profiles.get(resume_text).cloned().ok_or_else(|| {
            StageError::Llm(LlmError::Api {
                status: 503,
                message: "stub parser unavailable".to_string(),
            })
        })
    }

    async fn match_skills(
        &self,
        _model: &ModelConfig,
        input: SkillMatchInput<'_>,
    ) -> Result<SkillMatch, StageError> {
        self.calls.skills.fetch_add(1, Ordering::SeqCst);
        self.busy().await;
        let (matched_mandatory, missing_mandatory) =
            split(input.mandatory_skills, input.candidate_skills);
        let (matched_preferred, missing_preferred) =
            split(input.preferred_skills, input.candidate_skills);
        let skills_score = 100.0
            * (0.7 * coverage(matched_mandatory.len(), input.mandatory_skills.len())
                + 0.3 * coverage(matched_preferred.len(), input.preferred_skills.len()));
        Ok(SkillMatch {
            explanation: format!(
                "Matched {}/{} mandatory skills",
                matched_mandatory.len(),
                input.mandatory_skills.len()
            ),
            matched_mandatory_skills: matched_mandatory,
            matched_preferred_skills: matched_preferred,
            missing_mandatory_skills: missing_mandatory,
            missing_preferred_skills: missing_preferred,
            skills_score,
        })
    }

    async fn evaluate_experience(
        &self,
        _model: &ModelConfig,
        input: ExperienceInput<'_>,
    ) -> Result<ExperienceEvaluation, StageError> {
        self.calls.experience.fetch_add(1, Ordering::SeqCst);
        self.busy().await;
        let company = input
            .experience
            .first()
            .map(|e| e.company.as_str())
            .unwrap_or_default();
        Ok(self
            .experience
            .get(company)
            .cloned()
            .unwrap_or_else(|| evaluation(70.0, 60.0)))
    }
}

pub fn requirements() -> JobRequirements {
    JobRequirements {
        role_title: "Backend Engineer".to_string(),
        role_summary: "Build and run the payments API".to_string(),
        mandatory_skills: vec!["Rust".to_string(), "PostgreSQL".to_string()],
        preferred_skills: vec!["Kubernetes".to_string()],
        min_years_experience: Some(3.0),
        experience_domain: Some("fintech".to_string()),
        seniority: "Mid-level".to_string(),
        education_requirements: vec![],
    }
}

/// A profile with one position at `company` (when given) lasting `years`.
pub fn profile(name: &str, skills: &[&str], company: Option<&str>, years: f64) -> CandidateProfile {
    CandidateProfile {
        candidate_name: Some(name.to_string()),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        experience: company
            .map(|company| {
                vec![ExperienceEntry {
                    role: "Software Engineer".to_string(),
                    company: company.to_string(),
                    years,
                    description: "Backend services".to_string(),
                }]
            })
            .unwrap_or_default(),
        total_years_experience: if company.is_some() { years } else { 0.0 },
        education: vec![EducationEntry {
            degree: "BSc Computer Science".to_string(),
            institution: "State University".to_string(),
            year: Some(2016),
        }],
        certifications: vec![],
        projects: vec![],
    }
}

pub fn evaluation(experience_score: f64, role_alignment_score: f64) -> ExperienceEvaluation {
    ExperienceEvaluation {
        relevant_years: 4.0,
        experience_score,
        role_alignment_score,
        overqualified: false,
        risk_flags: vec![],
        explanation: "Relevant backend work".to_string(),
    }
}

pub fn model() -> ModelConfig {
    ModelConfig {
        provider: Provider::Anthropic,
        model: "stub-model".to_string(),
        api_key: None,
        base_url: None,
        temperature: DEFAULT_TEMPERATURE,
    }
}

/// Three attempts with millisecond backoff.
pub fn fast_invoker() -> StageInvoker {
    StageInvoker::new(
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        Duration::from_secs(5),
    )
}

/// Anthropic configured with a dummy key, concurrency 2.
pub fn config() -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        port: 0,
        rust_log: "info".to_string(),
        uploads_dir: std::env::temp_dir().display().to_string(),
        max_body_bytes: 1024 * 1024,
        llm: LlmSettings {
            default_provider: Provider::Anthropic,
            default_model: None,
            anthropic_api_key: Some("test-key".to_string()),
            openai_api_key: None,
            openai_base_url: None,
            gemini_api_key: None,
            timeout: Duration::from_secs(5),
        },
        screening: ScreeningSettings {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
            concurrency: 2,
            request_timeout: Duration::from_secs(30),
        },
    }
}

/// App state over `stubs` with an in-memory history store.
pub fn app_state(stubs: StubStages) -> (AppState, Arc<MemoryHistoryStore>) {
    let config = config();
    let history = Arc::new(MemoryHistoryStore::new());
    let orchestrator = Arc::new(ScreeningOrchestrator::new(
        Arc::new(stubs),
        Arc::new(LocalFileExtractor::new(config.uploads_dir.clone())),
        history.clone(),
        fast_invoker(),
        config.screening.concurrency,
    ));
    let state = AppState {
        config,
        orchestrator,
        history: history.clone(),
    };
    (state, history)
}
