use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::batch::registry::DEFAULT_RETENTION;
use crate::labels::geometry::{DEFAULT_ORIGIN_TEXT, DEFAULT_SHRINK_FACTOR};
use crate::layout::autofit::FitParams;

/// Application configuration loaded from environment variables.
/// Every variable has a default; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Bucket typography JSON. A missing or invalid file degrades to the global fit search.
    pub bucket_config_path: PathBuf,
    pub shrink_factor: f32,
    pub wrap_threshold_px: f32,
    /// `None` when `MAX_FONT_PX=none`.
    pub max_font_px: Option<f32>,
    pub origin_text: String,
    pub batch_max_rows: usize,
    /// How long finished or never-started batch jobs are kept. Zero keeps them forever.
    pub batch_retention: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key → value source.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = FitParams::default();

        let max_font_px = match get("MAX_FONT_PX") {
            Some(v) if v.trim().eq_ignore_ascii_case("none") => None,
            Some(v) => Some(
                parse_positive(&v).context("MAX_FONT_PX must be a positive number or 'none'")?,
            ),
            None => defaults.max_font_px,
        };

        Ok(Config {
            port: get("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            bucket_config_path: get("BUCKET_CONFIG_PATH")
                .unwrap_or_else(|| "./labelBuckets.json".to_string())
                .into(),
            shrink_factor: match get("LABEL_SHRINK_FACTOR") {
                Some(v) => parse_fraction(&v).context("LABEL_SHRINK_FACTOR must be in (0, 1]")?,
                None => DEFAULT_SHRINK_FACTOR,
            },
            wrap_threshold_px: match get("WRAP_THRESHOLD_PX") {
                Some(v) => parse_positive(&v).context("WRAP_THRESHOLD_PX must be a positive number")?,
                None => defaults.wrap_threshold_px,
            },
            max_font_px,
            origin_text: get("ORIGIN_TEXT").unwrap_or_else(|| DEFAULT_ORIGIN_TEXT.to_string()),
            batch_max_rows: get("BATCH_MAX_ROWS")
                .unwrap_or_else(|| "5000".to_string())
                .parse::<usize>()
                .context("BATCH_MAX_ROWS must be a non-negative integer")?,
            batch_retention: match get("BATCH_RETENTION_SECS") {
                Some(v) => Duration::from_secs(
                    v.trim()
                        .parse::<u64>()
                        .context("BATCH_RETENTION_SECS must be a non-negative integer")?,
                ),
                None => DEFAULT_RETENTION,
            },
        })
    }

    /// Engine parameters with the configured overrides applied.
    pub fn fit_params(&self) -> FitParams {
        FitParams {
            wrap_threshold_px: self.wrap_threshold_px,
            max_font_px: self.max_font_px,
            ..FitParams::default()
        }
    }
}

fn parse_positive(raw: &str) -> Result<f32> {
    let value: f32 = raw.trim().parse()?;
    anyhow::ensure!(value.is_finite() && value > 0.0, "{value} is not positive");
    Ok(value)
}

fn parse_fraction(raw: &str) -> Result<f32> {
    let value = parse_positive(raw)?;
    anyhow::ensure!(value <= 1.0, "{value} is larger than 1");
    Ok(value)
}
