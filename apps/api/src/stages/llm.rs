//! `LlmStages`: the production `AnalysisStages` backend. Every stage is a
//! JSON-returning prompt through `LlmClient::call_json`.

use async_trait::async_trait;

use super::prompts::{
    EXPERIENCE_EVAL_PROMPT_TEMPLATE, EXPERIENCE_EVAL_SYSTEM, JD_ANALYSIS_PROMPT_TEMPLATE,
    JD_ANALYSIS_SYSTEM, RESUME_PARSE_PROMPT_TEMPLATE, RESUME_PARSE_SYSTEM,
    SKILL_MATCH_PROMPT_TEMPLATE, SKILL_MATCH_SYSTEM,
};
use super::{AnalysisStages, ExperienceInput, SkillMatchInput, StageError};
use crate::llm_client::prompts::{join_or_none, EVIDENCE_INSTRUCTION, JSON_ONLY_SYSTEM};
use crate::llm_client::{LlmClient, ModelConfig};
use crate::models::screening::{
    normalize_terms, CandidateProfile, ExperienceEntry, ExperienceEvaluation, JobRequirements,
    SkillMatch,
};

pub struct LlmStages {
    llm: LlmClient,
}

impl LlmStages {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

fn system(stage_system: &str) -> String {
    format!("{stage_system} {JSON_ONLY_SYSTEM}")
}

fn render_experience(entries: &[ExperienceEntry]) -> String {
    if entries.is_empty() {
        return "No experience listed".to_string();
    }
    entries
        .iter()
        .map(|e| {
            format!(
                "- {} at {} ({} years): {}",
                e.role,
                if e.company.is_empty() {
                    "Unknown"
                } else {
                    e.company.as_str()
                },
                e.years,
                if e.description.is_empty() {
                    "No description"
                } else {
                    e.description.as_str()
                }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_skill_prompt(input: &SkillMatchInput<'_>) -> String {
    SKILL_MATCH_PROMPT_TEMPLATE
        .replace("{mandatory_skills}", &join_or_none(input.mandatory_skills))
        .replace("{preferred_skills}", &join_or_none(input.preferred_skills))
        .replace("{candidate_skills}", &join_or_none(input.candidate_skills))
}

fn build_experience_prompt(input: &ExperienceInput<'_>) -> String {
    let requirements = input.requirements;
    EXPERIENCE_EVAL_PROMPT_TEMPLATE
        .replace("{role_title}", &requirements.role_title)
        .replace("{role_summary}", &requirements.role_summary)
        .replace(
            "{min_years}",
            &requirements
                .min_years_experience
                .map(|y| y.to_string())
                .unwrap_or_else(|| "Not specified".to_string()),
        )
        .replace(
            "{domain}",
            requirements
                .experience_domain
                .as_deref()
                .unwrap_or("Not specified"),
        )
        .replace("{seniority}", &requirements.seniority)
        .replace("{total_years}", &input.total_years_experience.to_string())
        .replace("{experience_details}", &render_experience(input.experience))
}

#[async_trait]
impl AnalysisStages for LlmStages {
    async fn analyze_jd(
        &self,
        model: &ModelConfig,
        jd_text: &str,
    ) -> Result<JobRequirements, StageError> {
        let prompt = JD_ANALYSIS_PROMPT_TEMPLATE
            .replace("{evidence_instruction}", EVIDENCE_INSTRUCTION)
            .replace("{jd_text}", jd_text);
        let mut requirements: JobRequirements = self
            .llm
            .call_json(model, &prompt, &system(JD_ANALYSIS_SYSTEM))
            .await?;
        requirements.normalize();
        Ok(requirements)
    }

    async fn parse_resume(
        &self,
        model: &ModelConfig,
        resume_text: &str,
    ) -> Result<CandidateProfile, StageError> {
        let prompt = RESUME_PARSE_PROMPT_TEMPLATE
            .replace("{evidence_instruction}", EVIDENCE_INSTRUCTION)
            .replace("{resume_text}", resume_text);
        let mut profile: CandidateProfile = self
            .llm
            .call_json(model, &prompt, &system(RESUME_PARSE_SYSTEM))
            .await?;
        profile.normalize();
        Ok(profile)
    }

    async fn match_skills(
        &self,
        model: &ModelConfig,
        input: SkillMatchInput<'_>,
    ) -> Result<SkillMatch, StageError> {
        let prompt = build_skill_prompt(&input);
        let mut result: SkillMatch = self
            .llm
            .call_json(model, &prompt, &system(SKILL_MATCH_SYSTEM))
            .await?;
        normalize_terms(&mut result.matched_mandatory_skills);
        normalize_terms(&mut result.matched_preferred_skills);
        normalize_terms(&mut result.missing_mandatory_skills);
        normalize_terms(&mut result.missing_preferred_skills);
        Ok(result)
    }

    async fn evaluate_experience(
        &self,
        model: &ModelConfig,
        input: ExperienceInput<'_>,
    ) -> Result<ExperienceEvaluation, StageError> {
        let prompt = build_experience_prompt(&input);
        let mut result: ExperienceEvaluation = self
            .llm
            .call_json(model, &prompt, &system(EXPERIENCE_EVAL_SYSTEM))
            .await?;
        normalize_terms(&mut result.risk_flags);
        Ok(result)
    }
}
