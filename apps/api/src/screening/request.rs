use std::collections::BTreeMap;
use std::path::Path;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::Deserialize;
use thiserror::Error;

use crate::extraction::{DocumentFormat, DocumentSource};
use crate::llm_client::Provider;
use crate::screening::scoring::{ScoringWeights, WeightsError};

/// `jd_file` is a path under the uploads directory, or base64 document
/// content when `file_format` is set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JdInput {
    #[serde(default)]
    pub jd_text: Option<String>,
    #[serde(default)]
    pub jd_file: Option<String>,
    #[serde(default)]
    pub file_format: Option<DocumentFormat>,
}

/// Same `resume_file` / `file_format` convention as `JdInput`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResumeInput {
    #[serde(default)]
    pub resume_text: Option<String>,
    #[serde(default)]
    pub resume_file: Option<String>,
    #[serde(default)]
    pub file_format: Option<DocumentFormat>,
    #[serde(default)]
    pub candidate_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelOverride {
    pub provider: Provider,
    #[serde(default)]
    pub model_name: Option<String>,
}

/// POST /api/v1/screenings body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScreeningRequest {
    #[serde(default)]
    pub jd: JdInput,
    #[serde(default)]
    pub resumes: Vec<ResumeInput>,
    #[serde(default)]
    pub scoring_weights: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub model: Option<ModelOverride>,
}

/// One uploaded file from a multipart request.
#[derive(Debug, Clone, Default)]
pub struct DocumentUpload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// POST /api/v1/screenings/files, collected from the multipart fields.
#[derive(Debug, Clone, Default)]
pub struct ScreeningUpload {
    pub jd: Option<DocumentUpload>,
    pub resumes: Vec<DocumentUpload>,
    pub scoring_weights: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl From<WeightsError> for ValidationError {
    fn from(e: WeightsError) -> Self {
        ValidationError(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JdSource {
    Text(String),
    File(DocumentSource),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResumeContent {
    Text(String),
    File(DocumentSource),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResumeSource {
    pub index: usize,
    pub content: ResumeContent,
    pub name_hint: Option<String>,
}

impl ResumeSource {
    /// Path reference under the uploads directory, if the resume has one.
    pub fn file_ref(&self) -> Option<&str> {
        match &self.content {
            ResumeContent::File(document) => document.file_ref(),
            ResumeContent::Text(_) => None,
        }
    }

    /// Hint, else `Candidate <n>` with n the 1-based request position.
    pub fn fallback_name(&self) -> String {
        self.name_hint
            .clone()
            .unwrap_or_else(|| format!("Candidate {}", self.index + 1))
    }
}

/// A request that passed validation. Weights are already normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub jd: JdSource,
    pub resumes: Vec<ResumeSource>,
    pub weights: ScoringWeights,
}

/// Checks everything that can be checked without calling a stage.
pub trait ValidateRequest {
    fn validate(&self) -> Result<ValidatedRequest, ValidationError>;
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn weights(overrides: Option<&BTreeMap<String, f64>>) -> Result<ScoringWeights, ValidationError> {
    let weights = match overrides {
        Some(overrides) => ScoringWeights::from_overrides(overrides)?,
        None => ScoringWeights::default(),
    };
    Ok(weights.normalized()?)
}

/// Accepts plain base64 as well as a `data:<mime>;base64,` URL. Line breaks
/// from MIME wrapping are ignored.
fn decode_base64(field: &str, raw: &str) -> Result<Vec<u8>, ValidationError> {
    let payload = raw
        .split_once(";base64,")
        .filter(|(prefix, _)| prefix.starts_with("data:"))
        .map_or(raw, |(_, data)| data);
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64_STANDARD
        .decode(compact)
        .map_err(|e| ValidationError(format!("{field} is not valid base64: {e}")))
}

fn document(
    field: &str,
    file: String,
    format: Option<DocumentFormat>,
) -> Result<DocumentSource, ValidationError> {
    match format {
        Some(format) => Ok(DocumentSource::Inline {
            name: None,
            format,
            bytes: decode_base64(field, &file)?,
        }),
        None => Ok(DocumentSource::Path(file.trim().to_string())),
    }
}

/// Format from the file extension. A name without an extension is plain text.
fn upload_document(field: &str, upload: &DocumentUpload) -> Result<DocumentSource, ValidationError> {
    let name = upload
        .file_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let format = match name.and_then(|n| Path::new(n).extension()) {
        Some(extension) => {
            let extension = extension.to_string_lossy();
            DocumentFormat::from_extension(&extension).ok_or_else(|| {
                ValidationError(format!(
                    "{field} has unsupported format '{extension}' (expected txt, md, pdf or docx)"
                ))
            })?
        }
        None => DocumentFormat::Txt,
    };
    if upload.bytes.is_empty() {
        return Err(ValidationError(format!("{field} is empty")));
    }
    Ok(DocumentSource::Inline {
        name: name.map(str::to_string),
        format,
        bytes: upload.bytes.clone(),
    })
}

impl ValidateRequest for ScreeningRequest {
    /// Inline text wins over a file when both are given.
    fn validate(&self) -> Result<ValidatedRequest, ValidationError> {
        let jd = match (
            non_blank(self.jd.jd_text.clone()),
            non_blank(self.jd.jd_file.clone()),
        ) {
            (Some(text), _) => JdSource::Text(text),
            (None, Some(file)) => JdSource::File(document("jd_file", file, self.jd.file_format)?),
            (None, None) => {
                return Err(ValidationError(
                    "a job description is required (jd_text or jd_file)".to_string(),
                ))
            }
        };

        if self.resumes.is_empty() {
            return Err(ValidationError(
                "at least one resume is required".to_string(),
            ));
        }

        let resumes = self
            .resumes
            .iter()
            .enumerate()
            .map(|(index, input)| {
                let content = match (
                    non_blank(input.resume_text.clone()),
                    non_blank(input.resume_file.clone()),
                ) {
                    (Some(text), _) => ResumeContent::Text(text),
                    (None, Some(file)) => ResumeContent::File(document(
                        &format!("resume {} resume_file", index + 1),
                        file,
                        input.file_format,
                    )?),
                    (None, None) => {
                        return Err(ValidationError(format!(
                            "resume {} has neither resume_text nor resume_file",
                            index + 1
                        )))
                    }
                };
                Ok(ResumeSource {
                    index,
                    content,
                    name_hint: non_blank(input.candidate_name.clone())
                        .map(|n| n.trim().to_string()),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ValidatedRequest {
            jd,
            resumes,
            weights: weights(self.scoring_weights.as_ref())?,
        })
    }
}

impl ValidateRequest for ScreeningUpload {
    /// Each resume's file stem becomes its candidate name hint.
    fn validate(&self) -> Result<ValidatedRequest, ValidationError> {
        let jd = self
            .jd
            .as_ref()
            .ok_or_else(|| ValidationError("a jd_file upload is required".to_string()))?;
        let jd = JdSource::File(upload_document("jd_file", jd)?);

        if self.resumes.is_empty() {
            return Err(ValidationError(
                "at least one resume is required".to_string(),
            ));
        }

        let resumes = self
            .resumes
            .iter()
            .enumerate()
            .map(|(index, upload)| {
                let document = upload_document(&format!("resume file {}", index + 1), upload)?;
                let name_hint = upload
                    .file_name
                    .as_deref()
                    .and_then(|n| Path::new(n).file_stem())
                    .map(|stem| stem.to_string_lossy().trim().to_string())
                    .filter(|stem| !stem.is_empty());
                Ok(ResumeSource {
                    index,
                    content: ResumeContent::File(document),
                    name_hint,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(ValidatedRequest {
            jd,
            resumes,
            weights: weights(self.scoring_weights.as_ref())?,
        })
    }
}
