//! Axum route handlers for the Labels API.

use axum::{
    extract::{Path, State},
    response::{Html, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::labels::geometry::{calc_label_sizes, footer_for, largest_two, FooterKind, LabelSize, Viewport};
use crate::labels::models::LabelValues;
use crate::layout::buckets::{BucketAnchor, BucketTypography};
use crate::render::html::render_html;
use crate::render::{LabelSheet, RenderTarget};
use crate::routes::file_response;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LabelRequest {
    pub values: LabelValues,
    /// Preview area; defaults to 900 × 800.
    #[serde(default)]
    pub viewport: Option<Viewport>,
}

#[derive(Debug, Serialize)]
pub struct SizedLabel {
    #[serde(flatten)]
    pub size: LabelSize,
    pub footer: FooterKind,
    pub bucket_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SizesResponse {
    pub labels: Vec<SizedLabel>,
    /// Faces carrying the origin footer by area; `null` on a tie.
    pub largest_two: Option<[u8; 2]>,
}

#[derive(Debug, Serialize)]
pub struct BucketLookupResponse {
    pub width_cm: f32,
    pub height_cm: f32,
    pub key: Option<String>,
    pub anchor: Option<BucketAnchor>,
    pub typography: Option<BucketTypography>,
}

fn validate(values: &LabelValues) -> Result<(), AppError> {
    let invalid = values.invalid_dimensions();
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "box dimensions must be positive numbers (cm): {}",
            invalid.join(", ")
        )))
    }
}

async fn render_sheet(
    state: &AppState,
    values: LabelValues,
    target: RenderTarget,
) -> Result<LabelSheet, AppError> {
    let ctx = state.render_context();
    tokio::task::spawn_blocking(move || ctx.render_sheet(&values, target))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("spawn_blocking failed in render: {e}")))
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/labels/sizes
///
/// Returns the four faces, their footer and bucket key. No fitting.
pub async fn handle_sizes(
    State(state): State<AppState>,
    Json(request): Json<LabelRequest>,
) -> Result<Json<SizesResponse>, AppError> {
    validate(&request.values)?;

    let sizes = calc_label_sizes(request.values.dimensions(), state.config.shrink_factor);
    let largest = largest_two(&sizes);
    let labels = sizes
        .into_iter()
        .map(|size| SizedLabel {
            footer: footer_for(&size, largest),
            bucket_key: state.buckets.select_key(size.width_cm, size.height_cm),
            size,
        })
        .collect();

    Ok(Json(SizesResponse {
        labels,
        largest_two: largest,
    }))
}

/// POST /api/v1/labels/preview
///
/// Fitted sheet at preview scale: sizes, fit states and positioned text runs.
pub async fn handle_preview(
    State(state): State<AppState>,
    Json(request): Json<LabelRequest>,
) -> Result<Json<LabelSheet>, AppError> {
    validate(&request.values)?;
    let viewport = request.viewport.unwrap_or_default();
    let sheet = render_sheet(&state, request.values, RenderTarget::Preview(viewport)).await?;
    Ok(Json(sheet))
}

/// POST /api/v1/labels/preview.html
pub async fn handle_preview_html(
    State(state): State<AppState>,
    Json(request): Json<LabelRequest>,
) -> Result<Html<String>, AppError> {
    validate(&request.values)?;
    let viewport = request.viewport.unwrap_or_default();
    let sheet = render_sheet(&state, request.values, RenderTarget::Preview(viewport)).await?;
    Ok(Html(render_html(&sheet)))
}

/// POST /api/v1/labels/pdf
///
/// Single PDF download named `{code} - {timestamp}.pdf`.
pub async fn handle_pdf(
    State(state): State<AppState>,
    Json(request): Json<LabelRequest>,
) -> Result<Response, AppError> {
    validate(&request.values)?;
    let file = state
        .exporter
        .export(state.render_context(), request.values)
        .await?;
    Ok(file_response(&file.file_name, file.content_type, file.bytes))
}

/// GET /api/v1/buckets/:w/:h
///
/// Bucket key and anchor for a face of `w` × `h` cm.
pub async fn handle_bucket_lookup(
    State(state): State<AppState>,
    Path((width_cm, height_cm)): Path<(f32, f32)>,
) -> Result<Json<BucketLookupResponse>, AppError> {
    if !(width_cm > 0.0 && height_cm > 0.0) {
        return Err(AppError::Validation(
            "width and height must be positive".to_string(),
        ));
    }

    let anchor = state.buckets.anchor_for(width_cm, height_cm);
    Ok(Json(BucketLookupResponse {
        width_cm,
        height_cm,
        key: state.buckets.select_key(width_cm, height_cm),
        typography: anchor.map(|a| BucketTypography::from_anchor(a, width_cm, height_cm)),
        anchor: anchor.cloned(),
    }))
}
