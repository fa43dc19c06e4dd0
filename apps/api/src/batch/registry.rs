//! In-memory batch job registry.
//!
//! Finished jobs, and jobs never started, are dropped once they are older than the retention
//! period; eviction runs whenever a new job is inserted. Every state change goes through the
//! registry so status polling always sees a consistent snapshot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::batch::mapping::{FieldMapping, NormalizeOptions};
use crate::batch::table::Table;
use crate::errors::AppError;
use crate::layout::autofit::CancelToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchPhase {
    /// Uploaded, waiting for a mapping and a run request.
    Ready,
    Running,
    /// Rendering done, writing the ZIP.
    Bundling,
    Completed,
    Aborted,
    Failed,
}

impl BatchPhase {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            BatchPhase::Completed | BatchPhase::Aborted | BatchPhase::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

/// Finished ZIP of a batch run.
#[derive(Debug, Clone)]
pub struct BatchArchive {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct BatchJob {
    pub id: Uuid,
    pub file_name: String,
    pub table: Arc<Table>,
    pub created_at: DateTime<Utc>,
    /// Set when the job reaches a finished phase.
    pub finished_at: Option<DateTime<Utc>>,
    pub phase: BatchPhase,
    pub mapping: FieldMapping,
    pub options: NormalizeOptions,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub log: Vec<LogLine>,
    pub archive: Option<BatchArchive>,
    pub cancel: CancelToken,
}

impl BatchJob {
    pub fn new(file_name: String, table: Table, mapping: FieldMapping) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name,
            table: Arc::new(table),
            created_at: Utc::now(),
            finished_at: None,
            phase: BatchPhase::Ready,
            mapping,
            options: NormalizeOptions::default(),
            processed: 0,
            succeeded: 0,
            failed: 0,
            log: Vec::new(),
            archive: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.table.rows.len()
    }

    pub fn status(&self) -> BatchStatus {
        let total = self.total();
        let percent = if total == 0 {
            0
        } else {
            ((self.processed as f64 / total as f64) * 100.0).round() as u8
        };
        BatchStatus {
            id: self.id,
            file_name: self.file_name.clone(),
            phase: self.phase,
            total,
            processed: self.processed,
            succeeded: self.succeeded,
            failed: self.failed,
            percent,
            log: self.log.clone(),
            archive_name: self.archive.as_ref().map(|a| a.file_name.clone()),
        }
    }

    fn set_phase(&mut self, phase: BatchPhase) {
        self.phase = phase;
        if phase.is_finished() && self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    /// Running and bundling jobs never expire.
    fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        let since = match self.phase {
            BatchPhase::Ready => self.created_at,
            phase if phase.is_finished() => self.finished_at.unwrap_or(self.created_at),
            _ => return false,
        };
        now.signed_duration_since(since)
            .to_std()
            .is_ok_and(|age| age >= retention)
    }

    fn push_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.log.push(LogLine {
            level,
            message: message.into(),
        });
    }
}

/// Polling view of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatus {
    pub id: Uuid,
    pub file_name: String,
    pub phase: BatchPhase,
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub percent: u8,
    pub log: Vec<LogLine>,
    /// Set once a ZIP can be downloaded.
    pub archive_name: Option<String>,
}

/// Everything a run needs, handed out when a job starts.
#[derive(Debug, Clone)]
pub struct RunTicket {
    pub id: Uuid,
    pub table: Arc<Table>,
    pub mapping: FieldMapping,
    pub options: NormalizeOptions,
    pub cancel: CancelToken,
}

/// Retention used by [`BatchRegistry::new`].
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct BatchRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, BatchJob>>>,
    /// Zero keeps jobs for the lifetime of the process.
    retention: Duration,
}

impl Default for BatchRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl BatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    pub async fn insert(&self, job: BatchJob) -> Uuid {
        let id = job.id;
        let mut jobs = self.jobs.write().await;
        self.evict_locked(&mut jobs, Utc::now());
        jobs.insert(id, job);
        id
    }

    /// Drops every job past the retention period as of `now`; returns how many were removed.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut jobs = self.jobs.write().await;
        self.evict_locked(&mut jobs, now)
    }

    fn evict_locked(&self, jobs: &mut HashMap<Uuid, BatchJob>, now: DateTime<Utc>) -> usize {
        if self.retention.is_zero() {
            return 0;
        }
        let before = jobs.len();
        jobs.retain(|_, job| !job.is_expired(now, self.retention));
        let evicted = before - jobs.len();
        if evicted > 0 {
            info!("Evicted {evicted} expired batch job(s)");
        }
        evicted
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn status(&self, id: Uuid) -> Result<BatchStatus, AppError> {
        let jobs = self.jobs.read().await;
        jobs.get(&id).map(BatchJob::status).ok_or_else(|| not_found(id))
    }

    /// Mapping currently stored on the job (the upload's guess until a run starts).
    pub async fn mapping(&self, id: Uuid) -> Result<FieldMapping, AppError> {
        let jobs = self.jobs.read().await;
        jobs.get(&id)
            .map(|job| job.mapping.clone())
            .ok_or_else(|| not_found(id))
    }

    /// Moves a job from `Ready` to `Running` with the given mapping.
    pub async fn start(
        &self,
        id: Uuid,
        mapping: FieldMapping,
        options: NormalizeOptions,
    ) -> Result<RunTicket, AppError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| not_found(id))?;
        if job.phase != BatchPhase::Ready {
            return Err(AppError::Conflict(format!(
                "batch {id} cannot start from phase {:?}",
                job.phase
            )));
        }

        job.set_phase(BatchPhase::Running);
        job.mapping = mapping;
        job.options = options;
        let total = job.total();
        job.push_log(LogLevel::Info, format!("Rows loaded: {total}"));

        Ok(RunTicket {
            id,
            table: job.table.clone(),
            mapping: job.mapping.clone(),
            options,
            cancel: job.cancel.clone(),
        })
    }

    /// Counts one processed row; `error` is logged against the 1-based row number.
    pub async fn record_row(&self, id: Uuid, row: usize, error: Option<String>) {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            return;
        };
        job.processed += 1;
        match error {
            None => job.succeeded += 1,
            Some(message) => {
                job.failed += 1;
                job.push_log(LogLevel::Error, format!("Row {}: render error: {message}", row + 1));
            }
        }
    }

    pub async fn set_phase(&self, id: Uuid, phase: BatchPhase, message: Option<(LogLevel, String)>) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            job.set_phase(phase);
            if let Some((level, text)) = message {
                job.push_log(level, text);
            }
        }
    }

    pub async fn attach_archive(&self, id: Uuid, archive: BatchArchive) {
        let mut jobs = self.jobs.write().await;
        if let Some(job) = jobs.get_mut(&id) {
            job.archive = Some(archive);
        }
    }

    /// Sets the cancellation flag; the runner stops before its next row.
    pub async fn abort(&self, id: Uuid) -> Result<BatchStatus, AppError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| not_found(id))?;
        match job.phase {
            BatchPhase::Running | BatchPhase::Bundling => {
                job.cancel.cancel();
                job.push_log(LogLevel::Info, "Aborting…");
            }
            BatchPhase::Ready => {
                job.cancel.cancel();
                job.set_phase(BatchPhase::Aborted);
                job.push_log(LogLevel::Error, "Batch aborted.");
            }
            _ => {}
        }
        Ok(job.status())
    }

    pub async fn archive(&self, id: Uuid) -> Result<BatchArchive, AppError> {
        let jobs = self.jobs.read().await;
        let job = jobs.get(&id).ok_or_else(|| not_found(id))?;
        job.archive
            .clone()
            .ok_or_else(|| AppError::Conflict(format!("batch {id} has no archive yet")))
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Batch {id} not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> BatchJob {
        let table = Table {
            headers: vec!["ERP".into()],
            rows: vec![vec!["A".into()], vec!["B".into()]],
        };
        BatchJob::new("upload.csv".into(), table, FieldMapping::new())
    }

    #[tokio::test]
    async fn test_start_only_from_ready() {
        let registry = BatchRegistry::new();
        let id = registry.insert(job()).await;

        let ticket = registry
            .start(id, FieldMapping::new(), NormalizeOptions::default())
            .await
            .unwrap();
        assert_eq!(ticket.table.rows.len(), 2);
        assert_eq!(registry.status(id).await.unwrap().phase, BatchPhase::Running);

        let err = registry
            .start(id, FieldMapping::new(), NormalizeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_record_row_counts_and_logs() {
        let registry = BatchRegistry::new();
        let id = registry.insert(job()).await;
        registry.record_row(id, 0, None).await;
        registry.record_row(id, 1, Some("invalid dimensions".into())).await;

        let status = registry.status(id).await.unwrap();
        assert_eq!((status.processed, status.succeeded, status.failed), (2, 1, 1));
        assert_eq!(status.percent, 100);
        assert!(status.log.last().unwrap().message.starts_with("Row 2:"));
    }

    #[tokio::test]
    async fn test_abort_sets_flag() {
        let registry = BatchRegistry::new();
        let id = registry.insert(job()).await;
        let ticket = registry
            .start(id, FieldMapping::new(), NormalizeOptions::default())
            .await
            .unwrap();
        registry.abort(id).await.unwrap();
        assert!(ticket.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_finished_jobs_evicted_after_retention() {
        let registry = BatchRegistry::with_retention(Duration::from_secs(60));
        let finished = registry.insert(job()).await;
        let running = registry.insert(job()).await;
        registry
            .start(running, FieldMapping::new(), NormalizeOptions::default())
            .await
            .unwrap();
        registry.abort(finished).await.unwrap();
        assert_eq!(registry.job_count().await, 2);

        assert_eq!(registry.evict_expired(Utc::now()).await, 0);
        let later = Utc::now() + chrono::Duration::seconds(61);
        assert_eq!(registry.evict_expired(later).await, 1);

        assert!(matches!(
            registry.status(finished).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert_eq!(registry.status(running).await.unwrap().phase, BatchPhase::Running);
    }

    #[tokio::test]
    async fn test_stale_ready_jobs_evicted_on_insert() {
        let registry = BatchRegistry::with_retention(Duration::from_secs(60));
        let mut stale = job();
        stale.created_at = Utc::now() - chrono::Duration::seconds(120);
        let stale_id = registry.insert(stale).await;
        assert_eq!(registry.job_count().await, 1);

        let fresh = registry.insert(job()).await;
        assert_eq!(registry.job_count().await, 1);
        assert!(registry.status(fresh).await.is_ok());
        assert!(registry.status(stale_id).await.is_err());
    }

    #[tokio::test]
    async fn test_zero_retention_keeps_jobs() {
        let registry = BatchRegistry::with_retention(Duration::ZERO);
        let id = registry.insert(job()).await;
        registry.abort(id).await.unwrap();
        let later = Utc::now() + chrono::Duration::days(365);
        assert_eq!(registry.evict_expired(later).await, 0);
        assert!(registry.status(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let registry = BatchRegistry::new();
        let err = registry.status(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(matches!(
            registry.archive(Uuid::new_v4()).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }
}
