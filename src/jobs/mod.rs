//! Batch job scheduling.
//!
//! A submitted [`JobRequest`] becomes a batch job with one child job per album
//! directory. Children sit in a shared [`JobQueue`] and are claimed by a fixed
//! number of workers, each running the album pipeline independently.
//!
//! # Architecture
//!
//! ```text
//! JobRegistry::submit ──► BatchRunner ──► JobQueue ◄── WorkerPool (N tasks)
//!        ▲                     │                          │
//!        │                     ▼                          ▼
//!   status/cancel       BatchProgress ◄── WorkerEvent ── pipeline::process_album
//!                              │
//!                              ▼
//!                    broadcast<ProgressEvent>
//! ```

pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod registry;
pub mod service;
pub mod worker;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::model::OrganizationMode;

pub use pipeline::{AlbumOutcome, AlbumReport, PipelineContext, Stage};
pub use progress::{BatchProgress, BatchSummary, JobMessage, ProgressEvent};
pub use queue::{Job, JobQueue};
pub use registry::JobRegistry;
pub use service::BatchRunner;
pub use worker::{WorkerEvent, WorkerPool};

/// Job identifier.
pub type JobId = uuid::Uuid;

/// Lifecycle of a batch or album job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Already processed, a duplicate of a better copy, or not an album
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled | Self::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }
}

/// Options of a job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobOptions {
    pub dry_run: bool,
    pub enrichment_enabled: bool,
    /// Force every album into this mode instead of running the rule chain
    pub mode: Option<OrganizationMode>,
    /// Overrides the configured worker count
    pub worker_count: Option<usize>,
    /// Skip directories already processed with identical content
    pub incremental: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            enrichment_enabled: true,
            mode: None,
            worker_count: None,
            incremental: true,
        }
    }
}

/// A request to organize every album under `source_directory`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub source_directory: PathBuf,
    pub destination: PathBuf,
    #[serde(default)]
    pub options: JobOptions,
}

/// Cooperative cancellation flag.
///
/// A child token also reports cancelled once its parent is, so cancelling a
/// batch reaches every album job without touching each one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    own: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            own: Arc::new(AtomicBool::new(false)),
            parent: Some(self.own.clone()),
        }
    }

    pub fn cancel(&self) {
        self.own.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.own.load(Ordering::SeqCst)
            || self.parent.as_ref().is_some_and(|p| p.load(Ordering::SeqCst))
    }
}
