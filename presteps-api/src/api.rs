use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use presteps::curation::{AnnotationEntry, Curator, Label, TrainingRecord};
use presteps::{
    ConfigError, CurationConfig, DecodeError, ExtractionSettings, Extractor, FormatError,
    StructuredDocument,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Standard error response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message describing what went wrong
    pub error: String,
}

/// Body of `POST /api/curate`
#[derive(Debug, Serialize, Deserialize)]
pub struct CurateRequest {
    pub document: StructuredDocument,
    pub annotations: Vec<AnnotationEntry>,
    /// Defaults apply when omitted
    #[serde(default)]
    pub config: Option<CurationConfig>,
}

/// Labeled records for one document, with per-label counts
#[derive(Debug, Serialize, Deserialize)]
pub struct CurateResponse {
    pub records: Vec<TrainingRecord>,
    pub positive: usize,
    pub negative: usize,
    pub ambiguous: usize,
}

impl From<Vec<TrainingRecord>> for CurateResponse {
    fn from(records: Vec<TrainingRecord>) -> Self {
        let count = |label: Label| records.iter().filter(|r| r.label == label).count();
        Self {
            positive: count(Label::Positive),
            negative: count(Label::Negative),
            ambiguous: count(Label::Ambiguous),
            records,
        }
    }
}

/// Errors returned by the handlers
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The request itself is unusable (missing field, unreadable upload)
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Decode(_) | AppError::Format(_) | AppError::Config(_) | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_response = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(error_response)).into_response()
    }
}

/// Router with default extraction settings
pub fn app() -> Router {
    app_with_settings(ExtractionSettings::default())
}

/// Router whose extraction endpoint starts from `settings`
pub fn app_with_settings(settings: ExtractionSettings) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/extract", post(extract_document))
        .route("/api/curate", post(curate_document))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(settings))
}

/// Health check endpoint for monitoring and load balancing
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "presteps API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Extract paragraphs from an uploaded PDF.
///
/// Multipart fields: `file` (required), `force` and `min_paragraph_length`
/// (optional) override the server settings for this request.
pub async fn extract_document(
    State(settings): State<Arc<ExtractionSettings>>,
    mut multipart: Multipart,
) -> Result<Json<StructuredDocument>, AppError> {
    let mut settings = (*settings).clone();
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {e}")))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file data: {e}")))?;
                upload = Some((file_name, bytes));
            }
            Some("force") => {
                let value = field_text(field).await?;
                settings.decode.force = parse_flag(&value)?;
            }
            Some("min_paragraph_length") => {
                let value = field_text(field).await?;
                settings.min_paragraph_length = value.trim().parse().map_err(|_| {
                    AppError::BadRequest(format!("min_paragraph_length must be a number, got {value:?}"))
                })?;
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| AppError::BadRequest("No file provided in upload".to_string()))?;

    let extractor = Extractor::new(settings);
    let document = tokio::task::spawn_blocking(move || extractor.extract(&bytes, &file_name))
        .await
        .map_err(|e| AppError::Internal(format!("Extraction task failed: {e}")))??;

    info!(
        source = document.source(),
        paragraphs = document.paragraphs().len(),
        "extracted upload"
    );
    Ok(Json(document))
}

/// Label the paragraphs of an extracted document against annotations
pub async fn curate_document(Json(request): Json<CurateRequest>) -> Result<Json<CurateResponse>, AppError> {
    request.document.validate()?;
    let curator = Curator::new(request.config.unwrap_or_default())?;

    let records = tokio::task::spawn_blocking(move || curator.curate(&request.document, &request.annotations))
        .await
        .map_err(|e| AppError::Internal(format!("Curation task failed: {e}")))?;

    Ok(Json(CurateResponse::from(records)))
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read form field: {e}")))
}

fn parse_flag(value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(AppError::BadRequest(format!("Expected a boolean, got {other:?}"))),
    }
}
