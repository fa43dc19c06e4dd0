//! Pluggable export backends.
//!
//! `AppState` holds an `Arc<dyn LabelExporter>`; handlers and the batch runner only see the
//! trait. Rendering and PDF writing are CPU-bound and run inside `spawn_blocking`.

use async_trait::async_trait;
use chrono::Local;

use crate::errors::AppError;
use crate::labels::geometry::{format_timestamp, pdf_file_name};
use crate::labels::models::LabelValues;
use crate::render::pdf::render_pdf;
use crate::render::{RenderContext, RenderTarget};

/// A finished export, ready to be sent or archived.
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait LabelExporter: Send + Sync {
    /// Renders one carton at print size and encodes it.
    ///
    /// Returns `AppError::Cancelled` when the context's cancellation flag was set mid-render.
    async fn export(&self, ctx: RenderContext, values: LabelValues) -> Result<ExportedFile, AppError>;
}

/// One-page PDF per carton.
pub struct PdfExporter;

#[async_trait]
impl LabelExporter for PdfExporter {
    async fn export(&self, ctx: RenderContext, values: LabelValues) -> Result<ExportedFile, AppError> {
        tokio::task::spawn_blocking(move || {
            let sheet = ctx.render_sheet(&values, RenderTarget::Print);
            if sheet.cancelled {
                return Err(AppError::Cancelled);
            }
            let stem = values.export_stem();
            let bytes = render_pdf(&sheet, stem);
            Ok(ExportedFile {
                file_name: pdf_file_name(stem, &format_timestamp(&Local::now())),
                content_type: "application/pdf",
                bytes,
            })
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("spawn_blocking failed in PDF export: {e}")))?
    }
}
