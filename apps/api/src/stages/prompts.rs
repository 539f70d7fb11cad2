// All LLM prompt constants for the analysis stages.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for JD analysis.
pub const JD_ANALYSIS_SYSTEM: &str = "You are an expert technical recruiter. \
    Extract structured hiring requirements from a job description.";

/// JD analysis prompt template. Replace `{jd_text}` before sending.
pub const JD_ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analyze the following job description and extract its requirements.

Return a JSON object with this EXACT schema (no extra fields):
{
  "role_title": "Senior Backend Engineer",
  "role_summary": "One or two sentences describing the role",
  "mandatory_skills": ["Rust", "PostgreSQL"],
  "preferred_skills": ["Kubernetes"],
  "min_years_experience": 5,
  "experience_domain": "Payments / fintech",
  "seniority": "Senior",
  "education_requirements": ["BSc Computer Science or equivalent"]
}

Rules:
- mandatory_skills: skills stated as required / must have.
- preferred_skills: skills stated as nice to have / a plus / preferred.
- min_years_experience: null if the JD states no minimum.
- education_requirements: degrees AND certifications the JD asks for; [] if none.
- seniority: one of "Junior", "Mid-level", "Senior", "Lead", "Principal".

{evidence_instruction}

Job description:
---
{jd_text}
---"#;

/// System prompt for resume parsing.
pub const RESUME_PARSE_SYSTEM: &str = "You are an expert resume parser. \
    Extract a structured candidate profile from resume text.";

/// Resume parsing prompt template. Replace `{resume_text}` before sending.
pub const RESUME_PARSE_PROMPT_TEMPLATE: &str = r#"Parse the following resume into a structured profile.

Return a JSON object with this EXACT schema (no extra fields):
{
  "candidate_name": "Jane Doe",
  "skills": ["Rust", "Go"],
  "experience": [
    {"role": "Software Engineer", "company": "Acme", "years": 3, "description": "Built the billing service"}
  ],
  "total_years_experience": 3,
  "education": [{"degree": "BSc Computer Science", "institution": "MIT", "year": 2018}],
  "certifications": ["AWS Solutions Architect"],
  "projects": [{"name": "ripgrep plugin", "description": "Open source search tooling"}]
}

Rules:
- candidate_name: null if the resume does not state a name.
- experience: one entry per position, most recent first; years may be fractional.
- Use [] for any section the resume does not contain.

{evidence_instruction}

Resume:
---
{resume_text}
---"#;

/// System prompt for skill matching.
pub const SKILL_MATCH_SYSTEM: &str = "You are an expert technical recruiter. \
    Match a candidate's skills against a job's skill requirements.";

/// Skill matching prompt template.
/// Replace `{mandatory_skills}`, `{preferred_skills}`, `{candidate_skills}`.
pub const SKILL_MATCH_PROMPT_TEMPLATE: &str = r#"Match the candidate's skills against the job requirements.

Job requirements:
- Mandatory skills: {mandatory_skills}
- Preferred skills: {preferred_skills}

Candidate skills: {candidate_skills}

Return a JSON object with this EXACT schema (no extra fields):
{
  "matched_mandatory_skills": ["Rust"],
  "matched_preferred_skills": [],
  "missing_mandatory_skills": ["PostgreSQL"],
  "missing_preferred_skills": ["Kubernetes"],
  "skills_score": 55.0,
  "explanation": "Short explanation of matches and mismatches"
}

Rules:
- Treat synonyms and abbreviations as matches ("JS" = "JavaScript", "ML" = "Machine Learning").
- Treat specific forms as matches of the general skill ("Python scripting" matches "Python").
- skills_score is 0-100: mandatory coverage weighs 70%, preferred coverage 30%.
- Every mandatory skill appears in exactly one of matched_mandatory_skills / missing_mandatory_skills."#;

/// System prompt for experience evaluation.
pub const EXPERIENCE_EVAL_SYSTEM: &str = "You are an expert hiring manager. \
    Evaluate how relevant a candidate's work history is to a role.";

/// Experience evaluation prompt template.
/// Replace `{role_title}`, `{role_summary}`, `{min_years}`, `{domain}`,
/// `{seniority}`, `{total_years}`, `{experience_details}`.
pub const EXPERIENCE_EVAL_PROMPT_TEMPLATE: &str = r#"Evaluate the candidate's work experience against the role.

Role:
- Title: {role_title}
- Summary: {role_summary}
- Minimum years: {min_years}
- Domain: {domain}
- Seniority: {seniority}

Candidate:
- Total years: {total_years}
- Positions:
{experience_details}

Return a JSON object with this EXACT schema (no extra fields):
{
  "relevant_years": 4.5,
  "experience_score": 80.0,
  "role_alignment_score": 70.0,
  "overqualified": false,
  "risk_flags": ["Frequent job changes"],
  "explanation": "Short explanation of the evaluation"
}

Rules:
- relevant_years counts only experience relevant to the role.
- experience_score (0-100): domain relevance and depth; penalize unrelated experience.
- role_alignment_score (0-100): how closely past roles match the target role and seniority.
- overqualified: true when the candidate is significantly more senior than the role."#;
