use std::sync::Arc;

use crate::batch::registry::BatchRegistry;
use crate::config::Config;
use crate::layout::autofit::CancelToken;
use crate::layout::buckets::BucketTable;
use crate::render::{LabelExporter, RenderContext};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Bucket typography, loaded once at startup. Empty when the config could not be loaded.
    pub buckets: Arc<BucketTable>,
    /// Pluggable export backend. Default: PdfExporter.
    pub exporter: Arc<dyn LabelExporter>,
    pub batches: BatchRegistry,
}

impl AppState {
    /// Fresh context for one render, with its own cancellation flag.
    pub fn render_context(&self) -> RenderContext {
        self.render_context_with(CancelToken::new())
    }

    pub fn render_context_with(&self, cancel: CancelToken) -> RenderContext {
        RenderContext {
            buckets: self.buckets.clone(),
            params: self.config.fit_params(),
            shrink_factor: self.config.shrink_factor,
            origin_text: self.config.origin_text.clone(),
            cancel,
        }
    }
}
