//! History persistence. `HistoryStore` is the seam; `PgHistoryStore` is the
//! production engine and `MemoryHistoryStore` backs tests.

pub mod handlers;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::models::history::{HistoryRecord, HistorySummary, ProcessingStatus};

pub const DEFAULT_PAGE_LIMIT: i64 = 100;
pub const MAX_PAGE_LIMIT: i64 = 1000;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history record {0} not found")]
    NotFound(Uuid),

    #[error("history record {0} already exists")]
    AlreadyExists(Uuid),

    #[error("invalid page: {0}")]
    InvalidPage(String),

    #[error("corrupt history row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Listing window. Defaults to the newest 100 records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl Page {
    pub fn validate(&self) -> Result<(), HistoryError> {
        if !(1..=MAX_PAGE_LIMIT).contains(&self.limit) {
            return Err(HistoryError::InvalidPage(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}, got {}",
                self.limit
            )));
        }
        if self.offset < 0 {
            return Err(HistoryError::InvalidPage(format!(
                "offset must be non-negative, got {}",
                self.offset
            )));
        }
        Ok(())
    }
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn create(&self, record: &HistoryRecord) -> Result<(), HistoryError>;

    /// Overwrites the mutable fields of an existing record.
    async fn update(&self, record: &HistoryRecord) -> Result<(), HistoryError>;

    async fn get(&self, request_id: Uuid) -> Result<Option<HistoryRecord>, HistoryError>;

    /// Newest first.
    async fn list(&self, page: Page) -> Result<Vec<HistorySummary>, HistoryError>;
}

// ── Postgres ─────────────────────────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct HistoryRow {
    request_id: Uuid,
    created_at: DateTime<Utc>,
    model_provider: String,
    model_name: String,
    jd_file_ref: Option<String>,
    resume_file_refs: Vec<String>,
    jd_text_preview: Option<String>,
    resume_count: i32,
    processing_status: String,
    report: Option<Value>,
    intermediate_outputs: Value,
    error_message: Option<String>,
    total_resumes_processed: i32,
    total_candidates_ranked: i32,
}

impl TryFrom<HistoryRow> for HistoryRecord {
    type Error = HistoryError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let processing_status = row
            .processing_status
            .parse::<ProcessingStatus>()
            .map_err(HistoryError::Corrupt)?;
        let report = row.report.map(serde_json::from_value).transpose()?;
        Ok(HistoryRecord {
            request_id: row.request_id,
            created_at: row.created_at,
            model_provider: row.model_provider,
            model_name: row.model_name,
            jd_file_ref: row.jd_file_ref,
            resume_file_refs: row.resume_file_refs,
            jd_text_preview: row.jd_text_preview,
            resume_count: row.resume_count,
            processing_status,
            report,
            intermediate_outputs: serde_json::from_value(row.intermediate_outputs)?,
            error_message: row.error_message,
            total_resumes_processed: row.total_resumes_processed,
            total_candidates_ranked: row.total_candidates_ranked,
        })
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    request_id: Uuid,
    created_at: DateTime<Utc>,
    model_provider: String,
    model_name: String,
    jd_text_preview: Option<String>,
    resume_count: i32,
    processing_status: String,
    error_message: Option<String>,
    total_resumes_processed: i32,
    total_candidates_ranked: i32,
}

impl TryFrom<SummaryRow> for HistorySummary {
    type Error = HistoryError;

    fn try_from(row: SummaryRow) -> Result<Self, Self::Error> {
        Ok(HistorySummary {
            request_id: row.request_id,
            created_at: row.created_at,
            model_provider: row.model_provider,
            model_name: row.model_name,
            jd_text_preview: row.jd_text_preview,
            resume_count: row.resume_count,
            processing_status: row
                .processing_status
                .parse()
                .map_err(HistoryError::Corrupt)?,
            error_message: row.error_message,
            total_resumes_processed: row.total_resumes_processed,
            total_candidates_ranked: row.total_candidates_ranked,
        })
    }
}

pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn create(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let report = record.report.as_ref().map(serde_json::to_value).transpose()?;
        let intermediate = serde_json::to_value(&record.intermediate_outputs)?;

        let result = sqlx::query(
            r#"
            INSERT INTO screening_requests
                (request_id, created_at, model_provider, model_name, jd_file_ref,
                 resume_file_refs, jd_text_preview, resume_count, processing_status,
                 report, intermediate_outputs, error_message,
                 total_resumes_processed, total_candidates_ranked)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (request_id) DO NOTHING
            "#,
        )
        .bind(record.request_id)
        .bind(record.created_at)
        .bind(&record.model_provider)
        .bind(&record.model_name)
        .bind(&record.jd_file_ref)
        .bind(&record.resume_file_refs)
        .bind(&record.jd_text_preview)
        .bind(record.resume_count)
        .bind(record.processing_status.as_str())
        .bind(report)
        .bind(intermediate)
        .bind(&record.error_message)
        .bind(record.total_resumes_processed)
        .bind(record.total_candidates_ranked)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HistoryError::AlreadyExists(record.request_id));
        }
        info!("Created history record {}", record.request_id);
        Ok(())
    }

    async fn update(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let report = record.report.as_ref().map(serde_json::to_value).transpose()?;
        let intermediate = serde_json::to_value(&record.intermediate_outputs)?;

        let result = sqlx::query(
            r#"
            UPDATE screening_requests
            SET processing_status = $2,
                report = $3,
                intermediate_outputs = $4,
                error_message = $5,
                total_resumes_processed = $6,
                total_candidates_ranked = $7,
                updated_at = now()
            WHERE request_id = $1
            "#,
        )
        .bind(record.request_id)
        .bind(record.processing_status.as_str())
        .bind(report)
        .bind(intermediate)
        .bind(&record.error_message)
        .bind(record.total_resumes_processed)
        .bind(record.total_candidates_ranked)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(HistoryError::NotFound(record.request_id));
        }
        Ok(())
    }

    async fn get(&self, request_id: Uuid) -> Result<Option<HistoryRecord>, HistoryError> {
        let row = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT request_id, created_at, model_provider, model_name, jd_file_ref,
                   resume_file_refs, jd_text_preview, resume_count, processing_status,
                   report, intermediate_outputs, error_message,
                   total_resumes_processed, total_candidates_ranked
            FROM screening_requests
            WHERE request_id = $1
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(HistoryRecord::try_from).transpose()
    }

    async fn list(&self, page: Page) -> Result<Vec<HistorySummary>, HistoryError> {
        page.validate()?;
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT request_id, created_at, model_provider, model_name, jd_text_preview,
                   resume_count, processing_status, error_message,
                   total_resumes_processed, total_candidates_ranked
            FROM screening_requests
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(HistorySummary::try_from).collect()
    }
}

// ── In-memory ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryHistoryStore {
    records: RwLock<HashMap<Uuid, HistoryRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn create(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.request_id) {
            return Err(HistoryError::AlreadyExists(record.request_id));
        }
        records.insert(record.request_id, record.clone());
        Ok(())
    }

    async fn update(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.request_id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(HistoryError::NotFound(record.request_id)),
        }
    }

    async fn get(&self, request_id: Uuid) -> Result<Option<HistoryRecord>, HistoryError> {
        Ok(self.records.read().await.get(&request_id).cloned())
    }

    async fn list(&self, page: Page) -> Result<Vec<HistorySummary>, HistoryError> {
        page.validate()?;
        let records = self.records.read().await;
        let mut all: Vec<&HistoryRecord> = records.values().collect();
        all.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.request_id.cmp(&b.request_id))
        });
        Ok(all
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .map(HistoryRecord::summary)
            .collect())
    }
}
