//! Progress aggregation and the events published to subscribers.

use serde::Serialize;
use std::path::{Path, PathBuf};

use super::pipeline::AlbumReport;
use super::{JobId, JobStatus};
use crate::error::AlbumError;

/// Most recent messages carried by an in-progress batch snapshot.
pub const SNAPSHOT_MESSAGES: usize = 20;

/// An error or warning attached to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMessage {
    pub album: PathBuf,
    /// Error kind (`MoveError`, ...) or `warning`
    pub kind: String,
    pub message: String,
}

impl JobMessage {
    pub fn warning(album: &Path, message: impl Into<String>) -> Self {
        Self {
            album: album.to_path_buf(),
            kind: "warning".to_string(),
            message: message.into(),
        }
    }

    pub fn error(album: &Path, error: &AlbumError) -> Self {
        Self {
            album: album.to_path_buf(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Snapshot of a job, published on every state transition.
///
/// While a batch runs, `errors` and `warnings` hold only the latest
/// [`SNAPSHOT_MESSAGES`] of each; the counts cover all of them. Terminal
/// events carry every message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub processed_items: usize,
    pub total_items: usize,
    pub current_album: Option<PathBuf>,
    pub error_count: usize,
    pub warning_count: usize,
    pub errors: Vec<JobMessage>,
    pub warnings: Vec<JobMessage>,
}

impl ProgressEvent {
    /// Event for a job that has not started.
    pub fn queued(job_id: JobId) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            processed_items: 0,
            total_items: 0,
            current_album: None,
            error_count: 0,
            warning_count: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Event for a single album job.
    pub fn for_album(job_id: JobId, album: &Path, status: JobStatus) -> Self {
        Self {
            processed_items: usize::from(status.is_terminal()),
            total_items: 1,
            current_album: Some(album.to_path_buf()),
            status,
            ..Self::queued(job_id)
        }
    }

    pub fn with_messages(mut self, errors: Vec<JobMessage>, warnings: Vec<JobMessage>) -> Self {
        self.error_count = errors.len();
        self.warning_count = warnings.len();
        self.errors = errors;
        self.warnings = warnings;
        self
    }
}

/// Final counts of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped + self.cancelled
    }
}

/// Batch-level aggregate of its album jobs.
#[derive(Debug)]
pub struct BatchProgress {
    job_id: JobId,
    status: JobStatus,
    total: usize,
    summary: BatchSummary,
    current_album: Option<PathBuf>,
    errors: Vec<JobMessage>,
    warnings: Vec<JobMessage>,
    progress_interval: usize,
    since_snapshot: usize,
    fatal: Option<String>,
}

impl BatchProgress {
    pub fn new(job_id: JobId, total: usize, progress_interval: usize) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            total,
            summary: BatchSummary::default(),
            current_album: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            progress_interval: progress_interval.max(1),
            since_snapshot: 0,
            fatal: None,
        }
    }

    pub fn start(&mut self) -> ProgressEvent {
        self.status = JobStatus::Running;
        self.snapshot()
    }

    pub fn album_started(&mut self, album: &Path) {
        self.current_album = Some(album.to_path_buf());
    }

    /// Fold a finished album into the aggregate. Returns true when a periodic
    /// snapshot is due.
    pub fn record(&mut self, report: &AlbumReport) -> bool {
        for warning in &report.warnings {
            self.warnings.push(JobMessage::warning(&report.album, warning.clone()));
        }
        match report.status() {
            JobStatus::Completed => self.summary.succeeded += 1,
            JobStatus::Skipped => self.summary.skipped += 1,
            JobStatus::Cancelled => self.summary.cancelled += 1,
            _ => self.summary.failed += 1,
        }
        if let Err(e) = &report.result {
            self.errors.push(JobMessage::error(&report.album, e));
            if e.is_fatal() && self.fatal.is_none() {
                self.fatal = Some(e.to_string());
            }
        }

        self.since_snapshot += 1;
        if self.since_snapshot >= self.progress_interval {
            self.since_snapshot = 0;
            return true;
        }
        false
    }

    /// Fail the whole batch before any album ran.
    pub fn abort(&mut self, source: &Path, message: impl Into<String>) {
        let message = message.into();
        self.errors.push(JobMessage {
            album: source.to_path_buf(),
            kind: "BatchError".to_string(),
            message: message.clone(),
        });
        self.fatal = Some(message);
    }

    /// Message of the first fatal error, if the batch hit one.
    pub fn fatal(&self) -> Option<&str> {
        self.fatal.as_deref()
    }

    pub fn processed(&self) -> usize {
        self.summary.total()
    }

    /// Mark the batch finished and return the final event.
    pub fn finish(&mut self, cancel_requested: bool) -> ProgressEvent {
        self.status = if self.fatal.is_some() {
            JobStatus::Failed
        } else if cancel_requested {
            JobStatus::Cancelled
        } else {
            JobStatus::Completed
        };
        self.current_album = None;
        self.event(usize::MAX)
    }

    /// Periodic event: counts plus the latest messages.
    pub fn snapshot(&self) -> ProgressEvent {
        self.event(SNAPSHOT_MESSAGES)
    }

    fn event(&self, keep: usize) -> ProgressEvent {
        let latest = |messages: &[JobMessage]| messages[messages.len().saturating_sub(keep)..].to_vec();
        ProgressEvent {
            job_id: self.job_id,
            status: self.status,
            processed_items: self.processed(),
            total_items: self.total,
            current_album: self.current_album.clone(),
            error_count: self.errors.len(),
            warning_count: self.warnings.len(),
            errors: latest(&self.errors),
            warnings: latest(&self.warnings),
        }
    }

    pub fn summary(&self) -> BatchSummary {
        self.summary
    }
}
