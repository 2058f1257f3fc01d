//! Job control: submission, cancellation and status queries.
//!
//! The registry is the single owner of job state. Active batches and their
//! album jobs live in a map; finished batches move into a bounded history.
//! Every state change is also broadcast to subscribers.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::progress::ProgressEvent;
use super::service::{BatchObserver, BatchReport, BatchRunner};
use super::{CancelToken, Job, JobId, JobRequest, JobStatus};
use crate::error::Error;

/// Capacity of the progress broadcast channel. Slow subscribers lag and
/// skip events rather than blocking workers.
const EVENT_CAPACITY: usize = 256;

struct TrackedJob {
    snapshot: ProgressEvent,
    cancel: CancelToken,
    /// Owning batch, for album jobs
    batch: Option<JobId>,
}

struct JobBook {
    active: HashMap<JobId, TrackedJob>,
    recent: VecDeque<ProgressEvent>,
    history_size: usize,
    handles: HashMap<JobId, JoinHandle<Result<BatchReport, Error>>>,
}

impl JobBook {
    fn apply(&mut self, event: &ProgressEvent) {
        let Some(tracked) = self.active.get_mut(&event.job_id) else {
            return;
        };
        tracked.snapshot = event.clone();
        let is_batch = tracked.batch.is_none();

        if is_batch && event.status.is_terminal() {
            let batch_id = event.job_id;
            self.active.remove(&batch_id);
            self.active.retain(|_, job| job.batch != Some(batch_id));
            self.recent.push_back(event.clone());
            while self.recent.len() > self.history_size {
                self.recent.pop_front();
            }
        }
    }
}

/// Observer handed to the batch runner.
#[derive(Clone)]
struct Publisher {
    book: Arc<Mutex<JobBook>>,
    events: broadcast::Sender<ProgressEvent>,
}

impl BatchObserver for Publisher {
    fn jobs_queued(&self, batch_id: JobId, jobs: &[Job]) {
        let mut book = self.book.lock();
        for job in jobs {
            book.active.insert(
                job.id,
                TrackedJob {
                    snapshot: ProgressEvent::for_album(job.id, &job.album_directory, JobStatus::Queued),
                    cancel: job.cancel.clone(),
                    batch: Some(batch_id),
                },
            );
        }
    }

    fn publish(&self, event: ProgressEvent) {
        self.book.lock().apply(&event);
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Submits batches and answers status queries. Clones share state.
#[derive(Clone)]
pub struct JobRegistry {
    runner: Arc<BatchRunner>,
    publisher: Publisher,
}

impl JobRegistry {
    pub fn new(runner: BatchRunner, history_size: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            runner: Arc::new(runner),
            publisher: Publisher {
                book: Arc::new(Mutex::new(JobBook {
                    active: HashMap::new(),
                    recent: VecDeque::new(),
                    history_size: history_size.max(1),
                    handles: HashMap::new(),
                })),
                events,
            },
        }
    }

    /// Receive every progress event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.publisher.events.subscribe()
    }

    /// Queue a batch and start it in the background.
    pub fn submit(&self, request: JobRequest) -> JobId {
        let batch_id = JobId::new_v4();
        let cancel = CancelToken::new();
        let queued = ProgressEvent::queued(batch_id);

        self.publisher.book.lock().active.insert(
            batch_id,
            TrackedJob {
                snapshot: queued.clone(),
                cancel: cancel.clone(),
                batch: None,
            },
        );
        let _ = self.publisher.events.send(queued);

        let runner = self.runner.clone();
        let publisher = self.publisher.clone();
        let handle = tokio::spawn(async move { runner.run(batch_id, &request, cancel, &publisher).await });
        self.publisher.book.lock().handles.insert(batch_id, handle);

        tracing::info!(target: "jobs", %batch_id, "Batch submitted");
        batch_id
    }

    /// Wait for a submitted batch to finish. Each batch can be awaited once.
    pub async fn wait(&self, batch_id: JobId) -> Result<BatchReport, Error> {
        let handle = self
            .publisher
            .book
            .lock()
            .handles
            .remove(&batch_id)
            .ok_or_else(|| Error::UnknownJob(batch_id.to_string()))?;

        handle.await.map_err(|e| Error::Task(e.to_string()))?
    }

    /// Request cancellation of a batch or a single album job. Returns false
    /// when the job is unknown or already finished.
    pub fn cancel(&self, job_id: JobId) -> bool {
        let book = self.publisher.book.lock();
        match book.active.get(&job_id) {
            Some(job) if !job.snapshot.status.is_terminal() => {
                job.cancel.cancel();
                tracing::info!(target: "jobs", %job_id, "Cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Latest snapshot of a job, active or in recent history.
    pub fn status(&self, job_id: JobId) -> Option<ProgressEvent> {
        let book = self.publisher.book.lock();
        book.active
            .get(&job_id)
            .map(|job| job.snapshot.clone())
            .or_else(|| book.recent.iter().rev().find(|e| e.job_id == job_id).cloned())
    }

    /// Batches that have not finished yet.
    pub fn list_active(&self) -> Vec<ProgressEvent> {
        self.publisher
            .book
            .lock()
            .active
            .values()
            .filter(|job| job.batch.is_none())
            .map(|job| job.snapshot.clone())
            .collect()
    }

    /// Up to `limit` finished batches, newest first.
    pub fn list_recent(&self, limit: usize) -> Vec<ProgressEvent> {
        self.publisher
            .book
            .lock()
            .recent
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::journal;
    use crate::jobs::JobOptions;
    use crate::test_utils::{MockReader, temp_db, write_album};
    use std::path::Path;
    use tempfile::tempdir;

    fn registry(pool: &sqlx::SqlitePool, history_size: usize) -> JobRegistry {
        let mut config = Config::default();
        config.enrichment.enabled = false;
        JobRegistry::new(
            BatchRunner::new(pool.clone(), config, Arc::new(MockReader::default())),
            history_size,
        )
    }

    fn request(source: &Path, destination: &Path) -> JobRequest {
        JobRequest {
            source_directory: source.to_path_buf(),
            destination: destination.to_path_buf(),
            options: JobOptions {
                enrichment_enabled: false,
                worker_count: Some(2),
                ..JobOptions::default()
            },
        }
    }

    #[tokio::test]
    async fn test_submit_and_wait() {
        let (pool, _db) = temp_db().await;
        let dir = tempdir().unwrap();
        let src = dir.path().join("in");
        write_album(&src, "Plaid - Spokes", &["01.flac"]);
        let registry = registry(&pool, 10);
        let mut events = registry.subscribe();

        let id = registry.submit(request(&src, &dir.path().join("lib")));
        assert_eq!(registry.status(id).unwrap().status, JobStatus::Queued);
        assert_eq!(registry.list_active().len(), 1);

        let report = registry.wait(id).await.unwrap();
        assert_eq!(report.summary.succeeded, 1);
        assert!(registry.list_active().is_empty());
        assert_eq!(registry.status(id).unwrap().status, JobStatus::Completed);
        assert_eq!(registry.list_recent(5)[0].job_id, id);
        assert!(!registry.cancel(id));

        let mut statuses = Vec::new();
        while let Ok(event) = events.try_recv() {
            if event.job_id == id {
                statuses.push(event.status);
            }
        }
        assert_eq!(statuses.first(), Some(&JobStatus::Queued));
        assert_eq!(statuses.last(), Some(&JobStatus::Completed));

        assert!(matches!(registry.wait(id).await, Err(Error::UnknownJob(_))));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let (pool, _db) = temp_db().await;
        let dir = tempdir().unwrap();
        let src = dir.path().join("in");
        write_album(&src, "A - One", &["01.mp3"]);
        write_album(&src, "B - Two", &["01.mp3"]);
        let registry = registry(&pool, 10);

        let id = registry.submit(request(&src, &dir.path().join("lib")));
        assert!(registry.cancel(id));

        let report = registry.wait(id).await.unwrap();
        assert_eq!(report.event.status, JobStatus::Cancelled);
        assert_eq!(report.summary.cancelled, 2);
        assert_eq!(journal::count_operations(&pool, None).await.unwrap(), 0);
        assert!(src.join("A - One/01.mp3").exists());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let (pool, _db) = temp_db().await;
        let dir = tempdir().unwrap();
        let src = dir.path().join("empty");
        std::fs::create_dir_all(&src).unwrap();
        let registry = registry(&pool, 2);

        let mut ids = Vec::new();
        for _ in 0..3 {
            let id = registry.submit(request(&src, &dir.path().join("lib")));
            registry.wait(id).await.unwrap();
            ids.push(id);
        }

        let recent: Vec<JobId> = registry.list_recent(10).into_iter().map(|e| e.job_id).collect();
        assert_eq!(recent, vec![ids[2], ids[1]]);
        assert!(registry.status(ids[0]).is_none());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (pool, _db) = temp_db().await;
        let registry = registry(&pool, 2);
        let id = JobId::new_v4();
        assert!(registry.status(id).is_none());
        assert!(!registry.cancel(id));
        assert!(matches!(registry.wait(id).await, Err(Error::UnknownJob(_))));
    }
}
