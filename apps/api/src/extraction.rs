//! Document text extraction for JD and resume documents.
//!
//! A document is either a path under the uploads directory or bytes sent with
//! the request (base64 in JSON, or a multipart upload). Both end up in
//! `decode_document`.

use std::fmt;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const DOCX_BODY: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("file reference '{0}' resolves outside the uploads directory")]
    OutsideRoot(String),

    #[error("unsupported document format '{0}' (expected txt, md, pdf or docx)")]
    UnsupportedFormat(String),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{0}' is not valid UTF-8 text")]
    InvalidUtf8(String),

    #[error("failed to extract PDF text from '{document}': {message}")]
    Pdf { document: String, message: String },

    #[error("failed to extract DOCX text from '{document}': {message}")]
    Docx { document: String, message: String },

    #[error("no text could be extracted from '{0}'")]
    Empty(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Txt,
    Md,
    Pdf,
    Docx,
}

impl DocumentFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim().to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(DocumentFormat::Txt),
            "md" | "markdown" => Some(DocumentFormat::Md),
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::Docx),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Txt => "txt",
            DocumentFormat::Md => "md",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, PartialEq)]
pub enum DocumentSource {
    /// Relative path under the uploads directory.
    Path(String),
    /// Raw document bytes supplied with the request.
    Inline {
        name: Option<String>,
        format: DocumentFormat,
        bytes: Vec<u8>,
    },
}

impl DocumentSource {
    pub fn file_ref(&self) -> Option<&str> {
        match self {
            DocumentSource::Path(path) => Some(path),
            DocumentSource::Inline { .. } => None,
        }
    }

    /// Name used in traces and error messages.
    pub fn label(&self) -> String {
        match self {
            DocumentSource::Path(path) => path.clone(),
            DocumentSource::Inline {
                name: Some(name), ..
            } => name.clone(),
            DocumentSource::Inline { format, .. } => format!("inline {format} document"),
        }
    }
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            DocumentSource::Inline {
                name,
                format,
                bytes,
            } => f
                .debug_struct("Inline")
                .field("name", name)
                .field("format", format)
                .field("bytes", &bytes.len())
                .finish(),
        }
    }
}

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, source: &DocumentSource) -> Result<String, ExtractionError>;
}

/// Reads path references from a local uploads directory. Inline documents
/// never touch the filesystem.
pub struct LocalFileExtractor {
    root: PathBuf,
}

impl LocalFileExtractor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Only plain relative paths are accepted: no root, no prefix, no `..`.
    fn resolve(&self, file_ref: &str) -> Result<PathBuf, ExtractionError> {
        let relative = Path::new(file_ref);
        let safe = !file_ref.trim().is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(ExtractionError::OutsideRoot(file_ref.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl DocumentExtractor for LocalFileExtractor {
    async fn extract(&self, source: &DocumentSource) -> Result<String, ExtractionError> {
        match source {
            DocumentSource::Path(file_ref) => {
                let path = self.resolve(file_ref)?;
                let extension = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                let format = DocumentFormat::from_extension(&extension)
                    .ok_or(ExtractionError::UnsupportedFormat(extension))?;
                let bytes = read(&path, file_ref).await?;
                decode_document(bytes, format, file_ref).await
            }
            DocumentSource::Inline { format, bytes, .. } => {
                decode_document(bytes.clone(), *format, &source.label()).await
            }
        }
    }
}

/// Turns document bytes into text. PDF and DOCX decoding is synchronous and
/// CPU-bound, so it runs on the blocking pool.
pub async fn decode_document(
    bytes: Vec<u8>,
    format: DocumentFormat,
    document: &str,
) -> Result<String, ExtractionError> {
    let text = match format {
        DocumentFormat::Txt | DocumentFormat::Md => String::from_utf8(bytes)
            .map_err(|_| ExtractionError::InvalidUtf8(document.to_string()))?,
        DocumentFormat::Pdf => {
            let pdf_error = |message: String| ExtractionError::Pdf {
                document: document.to_string(),
                message,
            };
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                .await
                .map_err(|e| pdf_error(e.to_string()))?
                .map_err(|e| pdf_error(e.to_string()))?
        }
        DocumentFormat::Docx => {
            let docx_error = |message: String| ExtractionError::Docx {
                document: document.to_string(),
                message,
            };
            tokio::task::spawn_blocking(move || docx_text(&bytes))
                .await
                .map_err(|e| docx_error(e.to_string()))?
                .map_err(docx_error)?
        }
    };

    if text.trim().is_empty() {
        return Err(ExtractionError::Empty(document.to_string()));
    }
    debug!("Extracted {} chars from {document} ({format})", text.len());
    Ok(text)
}

async fn read(path: &Path, file_ref: &str) -> Result<Vec<u8>, ExtractionError> {
    tokio::fs::read(path).await.map_err(|source| ExtractionError::Io {
        path: file_ref.to_string(),
        source,
    })
}

/// A DOCX file is a zip archive; the body text lives in `word/document.xml`.
fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .map_err(|e| format!("{DOCX_BODY}: {e}"))?
        .read_to_string(&mut xml)
        .map_err(|e| format!("{DOCX_BODY}: {e}"))?;
    docx_body_text(&xml).map_err(|e| format!("{DOCX_BODY}: {e}"))
}

/// Collects `<w:t>` runs. Paragraph ends and `<w:br/>` become newlines,
/// `<w:tab/>` a tab.
fn docx_body_text(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run_text = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == b"w:t" => in_run_text = true,
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" | b"w:cr" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_run_text => text.push_str(&t.unescape()?),
            Ok(Event::Eof) => break,
            Err(e) => return Err(e),
            _ => {}
        }
    }
    Ok(text)
}
