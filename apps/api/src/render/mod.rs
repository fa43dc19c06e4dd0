//! Render pipeline: label values → four fitted faces → HTML preview or PDF.
//!
//! `RenderContext` carries everything one render or batch run needs (bucket table, fit
//! parameters, footer text, cancellation flag). It is built at the start of a run and dropped at
//! its end; nothing here keeps state between runs.

pub mod exporter;
pub mod html;
pub mod pdf;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::labels::geometry::{
    calc_label_sizes, compute_preview_scale, footer_for, largest_two, FooterKind, LabelSize,
    Viewport,
};
use crate::labels::models::LabelValues;
use crate::layout::autofit::{fit_at_size, fit_each_with, fit_surface, CancelToken, FitParams, FitState};
use crate::layout::buckets::{BucketTable, BucketTypography};
use crate::layout::label_surface::{LabelContent, LabelSurface, TextRun, Typography};

pub use exporter::{ExportedFile, LabelExporter, PdfExporter};

/// Scale the faces are laid out at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderTarget {
    /// Screen preview: the largest face fits one preview cell.
    Preview(Viewport),
    /// Print size (scale 1), used for PDF export.
    Print,
}

#[derive(Debug, Clone)]
pub struct RenderContext {
    pub buckets: Arc<BucketTable>,
    pub params: FitParams,
    pub shrink_factor: f32,
    pub origin_text: String,
    pub cancel: CancelToken,
}

/// One fitted face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedLabel {
    pub size: LabelSize,
    pub width_px: f32,
    pub height_px: f32,
    pub padding_px: f32,
    pub footer: FooterKind,
    /// Bucket typography, when the face had an anchor.
    pub bucket: Option<BucketTypography>,
    pub fit: FitState,
    /// Lines relative to the content box (inside the padding).
    pub runs: Vec<TextRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelSheet {
    pub values: LabelValues,
    pub scale: f32,
    pub labels: Vec<RenderedLabel>,
    /// Set when the run was cancelled; `labels` then holds only the faces fitted before that.
    pub cancelled: bool,
}

struct Face {
    size: LabelSize,
    footer: FooterKind,
    bucket: Option<BucketTypography>,
    /// Fixed scalar from the bucket anchor; `None` runs the global search.
    base_px: Option<f32>,
    surface: LabelSurface,
}

impl RenderContext {
    pub fn render_sheet(&self, values: &LabelValues, target: RenderTarget) -> LabelSheet {
        let sizes = calc_label_sizes(values.dimensions(), self.shrink_factor);
        let scale = match target {
            RenderTarget::Preview(viewport) => compute_preview_scale(&sizes, viewport),
            RenderTarget::Print => 1.0,
        };
        let largest = largest_two(&sizes);

        let mut faces: Vec<Face> = sizes
            .into_iter()
            .map(|size| self.prepare_face(values, size, largest, scale))
            .collect();

        let params = &self.params;
        let run = fit_each_with(&mut faces, &self.cancel, |face| match face.base_px {
            Some(px) => fit_at_size(&mut face.surface, px, params),
            None => fit_surface(&mut face.surface, params),
        });

        let labels = faces
            .into_iter()
            .zip(run.states)
            .map(|(face, fit)| {
                debug!(
                    label = face.size.index,
                    bucket = face.bucket.as_ref().map(|b| b.key.as_str()).unwrap_or("-"),
                    font = fit.font_size_px,
                    scale = fit.scale,
                    "label fitted"
                );
                RenderedLabel {
                    width_px: face.size.width_px(scale),
                    height_px: face.size.height_px(scale),
                    padding_px: face.size.padding_px(scale),
                    runs: face.surface.layout(),
                    size: face.size,
                    footer: face.footer,
                    bucket: face.bucket,
                    fit,
                }
            })
            .collect();

        LabelSheet {
            values: values.clone(),
            scale,
            labels,
            cancelled: run.cancelled,
        }
    }

    fn prepare_face(
        &self,
        values: &LabelValues,
        size: LabelSize,
        largest: Option<[u8; 2]>,
        scale: f32,
    ) -> Face {
        let footer = footer_for(&size, largest);
        let content = LabelContent::from_values(values, footer, &self.origin_text);

        let bucket = self
            .buckets
            .anchor_for(size.width_cm, size.height_cm)
            .map(|anchor| BucketTypography::from_anchor(anchor, size.width_cm, size.height_cm));
        let (typography, base_px) = match bucket.as_ref().and_then(|b| b.to_typography()) {
            Some((typography, text_px)) => (typography, Some(text_px * scale)),
            None => (Typography::default(), None),
        };

        let surface = LabelSurface::new(content, size.inner_size(scale), typography);
        Face {
            size,
            footer,
            bucket,
            base_px,
            surface,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
