use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::batch::mapping::{
    guess_mapping, template_csv, template_xlsx, validate_mapping, FieldMapping, NormalizeOptions,
    TEMPLATE_CSV_NAME, TEMPLATE_XLSX_NAME,
};
use crate::batch::registry::{BatchJob, BatchStatus};
use crate::batch::runner::run_batch;
use crate::batch::table::parse_table;
use crate::errors::AppError;
use crate::routes::file_response;
use crate::state::AppState;

/// Rows returned with an upload so the client can check the mapping.
const PREVIEW_ROWS: usize = 5;

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";
const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const ZIP_CONTENT_TYPE: &str = "application/zip";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub id: Uuid,
    pub file_name: String,
    pub headers: Vec<String>,
    pub total_rows: usize,
    /// Best guess from the header names; the client may override it in the run request.
    pub mapping: FieldMapping,
    /// Field labels the guess left unmapped.
    pub missing: Vec<&'static str>,
    pub preview: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    /// Falls back to the guessed mapping when absent.
    #[serde(default)]
    pub mapping: Option<FieldMapping>,
    #[serde(default)]
    pub options: NormalizeOptions,
}

/// POST /api/v1/batch
///
/// Multipart upload with a single `file` part (CSV, TSV or XLSX).
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut upload: Option<(String, bytes::Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.csv").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("could not read upload: {e}")))?;
        upload = Some((file_name, bytes));
        break;
    }
    let (file_name, bytes) =
        upload.ok_or_else(|| AppError::Validation("missing multipart field 'file'".to_string()))?;

    let parse_name = file_name.clone();
    let table = tokio::task::spawn_blocking(move || parse_table(&parse_name, &bytes))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("spawn_blocking failed in upload: {e}")))??;

    let max_rows = state.config.batch_max_rows;
    if max_rows > 0 && table.rows.len() > max_rows {
        return Err(AppError::UnprocessableEntity(format!(
            "{} rows exceed the batch limit of {max_rows}",
            table.rows.len()
        )));
    }

    let mapping = guess_mapping(&table.headers);
    let missing = validate_mapping(&mapping);
    let headers = table.headers.clone();
    let total_rows = table.rows.len();
    let preview = table.rows.iter().take(PREVIEW_ROWS).cloned().collect();

    let id = state
        .batches
        .insert(BatchJob::new(file_name.clone(), table, mapping.clone()))
        .await;
    info!(batch = %id, file = %file_name, rows = total_rows, "batch uploaded");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            id,
            file_name,
            headers,
            total_rows,
            mapping,
            missing,
            preview,
        }),
    ))
}

/// POST /api/v1/batch/:id/run
///
/// Starts rendering in the background and returns immediately; poll the status endpoint.
pub async fn handle_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RunRequest>,
) -> Result<(StatusCode, Json<BatchStatus>), AppError> {
    let mapping = match request.mapping {
        Some(mapping) => mapping,
        None => state.batches.mapping(id).await?,
    };
    let missing = validate_mapping(&mapping);
    if !missing.is_empty() {
        return Err(AppError::Validation(format!(
            "map every field before running: {}",
            missing.join(", ")
        )));
    }

    let ticket = state.batches.start(id, mapping, request.options).await?;
    let ctx = state.render_context_with(ticket.cancel.clone());
    let registry = state.batches.clone();
    let exporter = state.exporter.clone();
    tokio::spawn(async move {
        let summary = run_batch(registry, exporter, ctx, ticket).await;
        if summary.succeeded == 0 && !summary.aborted {
            error!(batch = %id, failed = summary.failed, "batch produced no labels");
        }
    });

    let status = state.batches.status(id).await?;
    Ok((StatusCode::ACCEPTED, Json(status)))
}

/// GET /api/v1/batch/:id/status
pub async fn handle_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchStatus>, AppError> {
    Ok(Json(state.batches.status(id).await?))
}

/// POST /api/v1/batch/:id/abort
pub async fn handle_abort(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchStatus>, AppError> {
    let status = state.batches.abort(id).await?;
    info!(batch = %id, phase = ?status.phase, "batch abort requested");
    Ok(Json(status))
}

/// GET /api/v1/batch/:id/download
pub async fn handle_download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let archive = state.batches.archive(id).await?;
    Ok(file_response(&archive.file_name, ZIP_CONTENT_TYPE, archive.bytes))
}

/// GET /api/v1/batch/template.csv
pub async fn handle_template_csv() -> Response {
    file_response(TEMPLATE_CSV_NAME, CSV_CONTENT_TYPE, template_csv())
}

/// GET /api/v1/batch/template.xlsx
pub async fn handle_template_xlsx() -> Result<Response, AppError> {
    let bytes = template_xlsx().map_err(|e| AppError::Internal(e.into()))?;
    Ok(file_response(TEMPLATE_XLSX_NAME, XLSX_CONTENT_TYPE, bytes))
}
