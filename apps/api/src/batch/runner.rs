//! Sequential batch rendering.
//!
//! Rows are rendered one at a time. The cancellation flag is checked before every row and the
//! task yields after every row, so status polling and abort requests are served while a large
//! batch runs. Row failures are logged and counted; they never stop the batch.

use std::io::{Cursor, Write};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Local;
use tracing::{info, warn};
use uuid::Uuid;
use zip::write::FileOptions;

use crate::batch::mapping::read_row;
use crate::batch::registry::{BatchArchive, BatchPhase, BatchRegistry, LogLevel, RunTicket};
use crate::errors::AppError;
use crate::labels::geometry::{batch_pdf_file_name, batch_zip_file_name, format_timestamp};
use crate::labels::models::LabelValues;
use crate::render::{LabelExporter, RenderContext};

/// Outcome counters of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub aborted: bool,
}

fn check_dimensions(values: &LabelValues) -> Result<(), String> {
    let invalid = values.invalid_dimensions();
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(format!("invalid dimensions: {}", invalid.join(", ")))
    }
}

/// Writes the PDFs into a deflated ZIP archive.
pub fn build_zip(files: &[(String, Vec<u8>)]) -> Result<Vec<u8>, zip::result::ZipError> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, bytes) in files {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(bytes)?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Runs a started job to completion, abort or failure. Progress goes to the registry.
///
/// `ctx.cancel` must be the job's cancellation token.
pub async fn run_batch(
    registry: BatchRegistry,
    exporter: Arc<dyn LabelExporter>,
    ctx: RenderContext,
    ticket: RunTicket,
) -> BatchSummary {
    let id = ticket.id;
    let batch_time = format_timestamp(&Local::now());
    let total = ticket.table.rows.len();
    info!(batch = %id, rows = total, "batch started");

    let mut files: Vec<(String, Vec<u8>)> = Vec::new();
    let mut failed = 0usize;
    let mut aborted = false;

    for row in 0..total {
        if ticket.cancel.is_cancelled() {
            aborted = true;
            break;
        }

        match render_row(&exporter, &ctx, &ticket, row).await {
            Ok((stem, bytes)) => {
                files.push((batch_pdf_file_name(&stem, &batch_time, row), bytes));
                registry.record_row(id, row, None).await;
            }
            Err(AppError::Cancelled) => {
                aborted = true;
                break;
            }
            Err(e) => {
                warn!(batch = %id, row = row + 1, error = %e, "batch row failed");
                failed += 1;
                registry.record_row(id, row, Some(e.to_string())).await;
            }
        }

        tokio::task::yield_now().await;
    }

    let summary = BatchSummary {
        succeeded: files.len(),
        failed,
        aborted,
    };
    finish(&registry, id, files, &batch_time, summary).await;
    info!(
        batch = %id,
        succeeded = summary.succeeded,
        failed = summary.failed,
        aborted = summary.aborted,
        "batch finished"
    );
    summary
}

async fn render_row(
    exporter: &Arc<dyn LabelExporter>,
    ctx: &RenderContext,
    ticket: &RunTicket,
    row: usize,
) -> Result<(String, Vec<u8>), AppError> {
    let values = read_row(&ticket.table, row, &ticket.mapping, ticket.options)
        .ok_or_else(|| AppError::NotFound(format!("row {} missing", row + 1)))?;
    check_dimensions(&values).map_err(AppError::Validation)?;

    let stem = values.export_stem().to_string();
    let file = exporter.export(ctx.clone(), values).await?;
    Ok((stem, file.bytes))
}

async fn finish(
    registry: &BatchRegistry,
    id: Uuid,
    files: Vec<(String, Vec<u8>)>,
    batch_time: &str,
    summary: BatchSummary,
) {
    registry
        .set_phase(
            id,
            BatchPhase::Bundling,
            summary
                .aborted
                .then(|| (LogLevel::Error, "Batch aborted.".to_string())),
        )
        .await;

    let final_phase = if summary.aborted {
        BatchPhase::Aborted
    } else {
        BatchPhase::Completed
    };

    if files.is_empty() {
        let message = format!("No PDFs generated. ({} errors)", summary.failed);
        registry
            .set_phase(id, final_phase, Some((LogLevel::Error, message)))
            .await;
        return;
    }

    let zipped = tokio::task::spawn_blocking(move || build_zip(&files)).await;
    match zipped {
        Ok(Ok(bytes)) => {
            registry
                .attach_archive(
                    id,
                    BatchArchive {
                        file_name: batch_zip_file_name(batch_time),
                        bytes: Bytes::from(bytes),
                    },
                )
                .await;
            let message = format!(
                "Done: {} PDFs succeeded, {} errors.",
                summary.succeeded, summary.failed
            );
            registry
                .set_phase(id, final_phase, Some((LogLevel::Ok, message)))
                .await;
        }
        Ok(Err(e)) => {
            warn!(batch = %id, error = %e, "failed to write batch archive");
            registry
                .set_phase(
                    id,
                    BatchPhase::Failed,
                    Some((LogLevel::Error, format!("Could not write ZIP: {e}"))),
                )
                .await;
        }
        Err(e) => {
            warn!(batch = %id, error = %e, "spawn_blocking failed while zipping");
            registry
                .set_phase(
                    id,
                    BatchPhase::Failed,
                    Some((LogLevel::Error, "Could not write ZIP.".to_string())),
                )
                .await;
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::batch::mapping::{guess_mapping, template_csv, NormalizeOptions};
    use crate::batch::registry::BatchJob;
    use crate::batch::table::parse_csv;
    use crate::layout::buckets::BucketTable;
    use crate::render::tests::context;
    use crate::render::{ExportedFile, PdfExporter};

    const SECOND_ROW: &str = "\nLG2;Second;123;1;1,0;0.01;;10;10;B2";
    const THIRD_ROW: &str = "\nLG3;Third;456;2;2,0;0.02;20;20;20;B3";

    async fn started_job(csv: &str) -> (BatchRegistry, RunTicket) {
        let table = parse_csv(csv.as_bytes()).unwrap();
        let mapping = guess_mapping(&table.headers);
        let registry = BatchRegistry::new();
        let id = registry
            .insert(BatchJob::new("upload.csv".into(), table, mapping.clone()))
            .await;
        let ticket = registry
            .start(id, mapping, NormalizeOptions::default())
            .await
            .unwrap();
        (registry, ticket)
    }

    fn ctx_for(ticket: &RunTicket) -> RenderContext {
        RenderContext {
            cancel: ticket.cancel.clone(),
            ..context(BucketTable::empty())
        }
    }

    #[tokio::test]
    async fn test_bad_row_is_logged_and_skipped() {
        let csv = format!("{}{SECOND_ROW}{THIRD_ROW}", template_csv());
        let (registry, ticket) = started_job(&csv).await;
        let id = ticket.id;
        let ctx = ctx_for(&ticket);

        let summary = run_batch(registry.clone(), Arc::new(PdfExporter), ctx, ticket).await;
        assert_eq!(summary, BatchSummary { succeeded: 2, failed: 1, aborted: false });

        let status = registry.status(id).await.unwrap();
        assert_eq!(status.phase, BatchPhase::Completed);
        assert!(status.log.iter().any(|l| l.message.contains("Row 2: render error")));

        let archive = registry.archive(id).await.unwrap();
        assert!(archive.file_name.starts_with("labels-batch - "));
        let mut zip = zip::ZipArchive::new(Cursor::new(archive.bytes.to_vec())).unwrap();
        assert_eq!(zip.len(), 2);
        let names: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names[0].starts_with("LG1000843 - ") && names[0].ends_with(" - R001.pdf"));
        assert!(names[1].ends_with(" - R003.pdf"));

        let mut first = Vec::new();
        zip.by_index(0).unwrap().read_to_end(&mut first).unwrap();
        assert!(first.starts_with(b"%PDF-"));
    }

    /// Exporter that aborts the batch after the first row.
    struct AbortAfterFirst {
        cancel: crate::layout::autofit::CancelToken,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LabelExporter for AbortAfterFirst {
        async fn export(&self, ctx: RenderContext, values: LabelValues) -> Result<ExportedFile, AppError> {
            let file = PdfExporter.export(ctx, values).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.cancel.cancel();
            file
        }
    }

    #[tokio::test]
    async fn test_abort_stops_before_next_row_and_keeps_finished_pdfs() {
        let csv = format!("{}{THIRD_ROW}{THIRD_ROW}", template_csv());
        let (registry, ticket) = started_job(&csv).await;
        let id = ticket.id;
        let exporter = Arc::new(AbortAfterFirst {
            cancel: ticket.cancel.clone(),
            calls: AtomicUsize::new(0),
        });
        let ctx = ctx_for(&ticket);

        let summary = run_batch(registry.clone(), exporter.clone(), ctx, ticket).await;
        assert!(summary.aborted);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(exporter.calls.load(Ordering::SeqCst), 1);

        let status = registry.status(id).await.unwrap();
        assert_eq!(status.phase, BatchPhase::Aborted);
        assert_eq!(status.processed, 1);
        assert!(status.archive_name.is_some());
    }

    #[test]
    fn test_check_dimensions() {
        let mut values = LabelValues {
            len: Some(10.0),
            wid: Some(0.0),
            hei: None,
            ..LabelValues::default()
        };
        assert_eq!(
            check_dimensions(&values).unwrap_err(),
            "invalid dimensions: width, height"
        );
        values.wid = Some(5.0);
        values.hei = Some(5.0);
        assert!(check_dimensions(&values).is_ok());
    }
}
