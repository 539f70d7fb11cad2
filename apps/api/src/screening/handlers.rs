use axum::extract::{multipart::Field, Multipart, State};
use axum::Json;

use crate::errors::AppError;
use crate::llm_client::{ModelConfig, Provider};
use crate::models::report::ScreeningReport;
use crate::screening::cancel::{CancelHandle, CancelSignal};
use crate::screening::request::{
    DocumentUpload, ModelOverride, ScreeningRequest, ScreeningUpload, ValidateRequest,
};
use crate::state::AppState;

/// Cancels the screening it guards when dropped. axum drops the handler
/// future when the client disconnects.
struct CancelOnDrop(CancelHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Runs the screening on its own task so that it always reaches
/// finalization, even after the handler future is gone.
async fn run_screening<R>(
    state: &AppState,
    request: R,
    model: ModelConfig,
) -> Result<Json<ScreeningReport>, AppError>
where
    R: ValidateRequest + Send + Sync + 'static,
{
    let (handle, cancel) = CancelSignal::pair();
    let cancel = cancel.with_timeout(state.config.screening.request_timeout);
    let _guard = CancelOnDrop(handle);

    let orchestrator = state.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.screen(&request, model, cancel).await });
    let report = task
        .await
        .map_err(|e| anyhow::anyhow!("screening task failed: {e}"))??;
    Ok(Json(report))
}

/// POST /api/v1/screenings
pub async fn handle_screen(
    State(state): State<AppState>,
    Json(req): Json<ScreeningRequest>,
) -> Result<Json<ScreeningReport>, AppError> {
    let model = state
        .config
        .llm
        .resolve(req.model.as_ref())
        .map_err(AppError::Validation)?;
    run_screening(&state, req, model).await
}

/// POST /api/v1/screenings/files
///
/// Multipart fields: `jd_file` (one file), `resume_files` (one or more
/// files), and optional text fields `scoring_weights` (JSON object),
/// `provider` and `model_name`.
pub async fn handle_screen_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ScreeningReport>, AppError> {
    let mut upload = ScreeningUpload::default();
    let mut provider: Option<Provider> = None;
    let mut model_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "jd_file" => {
                if upload.jd.is_some() {
                    return Err(AppError::Validation(
                        "only one jd_file may be uploaded".to_string(),
                    ));
                }
                upload.jd = Some(read_upload(field).await?);
            }
            "resume_files" => upload.resumes.push(read_upload(field).await?),
            "scoring_weights" => {
                let raw = field.text().await.map_err(invalid_multipart)?;
                let weights = serde_json::from_str(&raw).map_err(|e| {
                    AppError::Validation(format!(
                        "scoring_weights must be a JSON object of numbers: {e}"
                    ))
                })?;
                upload.scoring_weights = Some(weights);
            }
            "provider" => {
                let raw = field.text().await.map_err(invalid_multipart)?;
                provider = Some(raw.parse().map_err(AppError::Validation)?);
            }
            "model_name" => model_name = Some(field.text().await.map_err(invalid_multipart)?),
            other => {
                return Err(AppError::Validation(format!(
                    "unexpected multipart field '{other}'"
                )))
            }
        }
    }

    let requested = match (provider, model_name) {
        (None, None) => None,
        (provider, model_name) => Some(ModelOverride {
            provider: provider.unwrap_or(state.config.llm.default_provider),
            model_name,
        }),
    };
    let model = state
        .config
        .llm
        .resolve(requested.as_ref())
        .map_err(AppError::Validation)?;
    run_screening(&state, upload, model).await
}

async fn read_upload(field: Field<'_>) -> Result<DocumentUpload, AppError> {
    let file_name = field.file_name().map(str::to_string);
    let bytes = field.bytes().await.map_err(invalid_multipart)?;
    Ok(DocumentUpload {
        file_name,
        bytes: bytes.to_vec(),
    })
}

fn invalid_multipart(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("invalid multipart body: {e}"))
}
