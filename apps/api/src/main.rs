mod batch;
mod config;
mod errors;
mod labels;
mod layout;
mod render;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::batch::registry::BatchRegistry;
use crate::config::Config;
use crate::layout::buckets::BucketTable;
use crate::render::PdfExporter;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting label API v{}", env!("CARGO_PKG_VERSION"));

    // Bucket typography is optional: without it every face uses the global fit search
    let buckets = match BucketTable::load(&config.bucket_config_path) {
        Ok(table) => {
            info!(
                "Bucket config loaded: {} anchors from {}",
                table.len(),
                config.bucket_config_path.display()
            );
            table
        }
        Err(e) => {
            warn!("Bucket config unavailable, using global fit only: {e}");
            BucketTable::empty()
        }
    };

    let params = config.fit_params();
    info!(
        "Fit params: wrap threshold {}px, max font {:?}, shrink factor {}",
        params.wrap_threshold_px, params.max_font_px, config.shrink_factor
    );

    // Build app state
    let state = AppState {
        config: config.clone(),
        buckets: Arc::new(buckets),
        exporter: Arc::new(PdfExporter),
        batches: BatchRegistry::with_retention(config.batch_retention),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the form is served from a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
