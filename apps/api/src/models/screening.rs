//! Stage payload contracts: JD structure, candidate profile and the outputs of
//! the skill-match and experience-evaluation stages.

use serde::{Deserialize, Serialize};

use crate::stages::ValidateOutput;

/// Structured job description produced once per request by JD analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequirements {
    pub role_title: String,
    #[serde(default)]
    pub role_summary: String,
    #[serde(default)]
    pub mandatory_skills: Vec<String>,
    #[serde(default)]
    pub preferred_skills: Vec<String>,
    #[serde(default)]
    pub min_years_experience: Option<f64>,
    #[serde(default)]
    pub experience_domain: Option<String>,
    #[serde(default)]
    pub seniority: String,
    /// Degrees and certifications the JD asks for, in JD order.
    #[serde(default)]
    pub education_requirements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub role: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub years: f64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EducationEntry {
    pub degree: String,
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Structured resume produced once per candidate by the parse stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    #[serde(default)]
    pub candidate_name: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default)]
    pub total_years_experience: f64,
    #[serde(default)]
    pub education: Vec<EducationEntry>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
}

/// Skill-match stage output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMatch {
    #[serde(default)]
    pub matched_mandatory_skills: Vec<String>,
    #[serde(default)]
    pub matched_preferred_skills: Vec<String>,
    #[serde(default)]
    pub missing_mandatory_skills: Vec<String>,
    #[serde(default)]
    pub missing_preferred_skills: Vec<String>,
    pub skills_score: f64,
    #[serde(default)]
    pub explanation: String,
}

/// Experience-evaluation stage output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEvaluation {
    #[serde(default)]
    pub relevant_years: f64,
    pub experience_score: f64,
    pub role_alignment_score: f64,
    #[serde(default)]
    pub overqualified: bool,
    #[serde(default)]
    pub risk_flags: Vec<String>,
    #[serde(default)]
    pub explanation: String,
}

fn check_score(field: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(format!("{field} must be within [0, 100], got {value}"));
    }
    Ok(())
}

fn check_non_negative(field: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{field} must be a non-negative number, got {value}"));
    }
    Ok(())
}

impl ValidateOutput for JobRequirements {
    fn validate(&self) -> Result<(), String> {
        if self.role_title.trim().is_empty() {
            return Err("role_title is empty".to_string());
        }
        if let Some(years) = self.min_years_experience {
            check_non_negative("min_years_experience", years)?;
        }
        Ok(())
    }
}

impl ValidateOutput for CandidateProfile {
    fn validate(&self) -> Result<(), String> {
        check_non_negative("total_years_experience", self.total_years_experience)?;
        for (i, entry) in self.experience.iter().enumerate() {
            if entry.role.trim().is_empty() {
                return Err(format!("experience[{i}].role is empty"));
            }
            check_non_negative(&format!("experience[{i}].years"), entry.years)?;
        }
        if self.education.iter().any(|e| e.degree.trim().is_empty()) {
            return Err("education entry without degree".to_string());
        }
        Ok(())
    }
}

impl ValidateOutput for SkillMatch {
    fn validate(&self) -> Result<(), String> {
        check_score("skills_score", self.skills_score)
    }
}

impl ValidateOutput for ExperienceEvaluation {
    fn validate(&self) -> Result<(), String> {
        check_score("experience_score", self.experience_score)?;
        check_score("role_alignment_score", self.role_alignment_score)?;
        check_non_negative("relevant_years", self.relevant_years)
    }
}

/// Trims, drops blanks and removes case-insensitive duplicates, keeping the
/// first spelling seen.
pub fn normalize_terms(items: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    items.retain_mut(|item| {
        let trimmed = item.trim();
        if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
            return false;
        }
        if trimmed.len() != item.len() {
            *item = trimmed.to_string();
        }
        true
    });
}

impl JobRequirements {
    pub fn normalize(&mut self) {
        normalize_terms(&mut self.mandatory_skills);
        normalize_terms(&mut self.preferred_skills);
        normalize_terms(&mut self.education_requirements);
    }
}

impl CandidateProfile {
    pub fn normalize(&mut self) {
        normalize_terms(&mut self.skills);
        normalize_terms(&mut self.certifications);
        if let Some(name) = &self.candidate_name {
            if name.trim().is_empty() {
                self.candidate_name = None;
            }
        }
    }
}
