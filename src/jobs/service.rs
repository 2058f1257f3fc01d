//! Running a whole batch: discovery, queueing, workers and progress.

use parking_lot::Mutex;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::pipeline::{AlbumReport, PipelineContext};
use super::progress::{BatchProgress, BatchSummary, JobMessage, ProgressEvent};
use super::worker::{WorkerEvent, WorkerPool};
use super::{CancelToken, Job, JobId, JobQueue, JobRequest, JobStatus};
use crate::config::Config;
use crate::decision::DecisionEngine;
use crate::enrichment::EnrichmentClient;
use crate::error::{AlbumError, Error};
use crate::metadata::MetadataReader;
use crate::organizer::{MoveExecutor, recover_pending};
use crate::scanner::discover_albums;

/// Receives batch lifecycle notifications.
pub trait BatchObserver: Send + Sync {
    /// Album jobs of `batch_id` were queued.
    fn jobs_queued(&self, _batch_id: JobId, _jobs: &[Job]) {}

    /// A batch or album job changed state.
    fn publish(&self, event: ProgressEvent);
}

/// Observer that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl BatchObserver for LogObserver {
    fn publish(&self, event: ProgressEvent) {
        tracing::trace!(target: "jobs", job_id = %event.job_id, status = event.status.as_str(), "Job event");
    }
}

/// Everything a finished batch produced.
#[derive(Debug)]
pub struct BatchReport {
    pub batch_id: JobId,
    pub summary: BatchSummary,
    /// The final batch event
    pub event: ProgressEvent,
    /// Per-album results in completion order
    pub albums: Vec<AlbumReport>,
}

/// Runs batches against one state store. Cheap to share; the enrichment
/// client (and its rate limiters) is shared by every batch it runs, and so
/// are the destination claims of the move executor.
pub struct BatchRunner {
    pool: SqlitePool,
    config: Config,
    reader: Arc<dyn MetadataReader>,
    enrichment: Option<EnrichmentClient>,
    executor: MoveExecutor,
    /// Batches in flight; their pending journal entries are not crash leftovers
    running: Mutex<HashSet<String>>,
}

/// Registration of a batch in [`BatchRunner::running`], removed on drop.
struct RunningBatch<'a> {
    running: &'a Mutex<HashSet<String>>,
    batch_id: String,
}

impl Drop for RunningBatch<'_> {
    fn drop(&mut self) {
        self.running.lock().remove(&self.batch_id);
    }
}

impl BatchRunner {
    /// Build a runner from configuration. A catalog client that cannot be
    /// built disables enrichment with a warning.
    pub fn new(pool: SqlitePool, config: Config, reader: Arc<dyn MetadataReader>) -> Self {
        let enrichment = if config.enrichment.enabled {
            match EnrichmentClient::from_config(&config.enrichment, pool.clone()) {
                Ok(client) => Some(client),
                Err(e) => {
                    tracing::warn!(target: "jobs", error = %e, "Enrichment disabled: client setup failed");
                    None
                }
            }
        } else {
            None
        };
        Self {
            executor: MoveExecutor::new(pool.clone()),
            pool,
            config,
            reader,
            enrichment,
            running: Mutex::new(HashSet::new()),
        }
    }

    fn track(&self, batch_id: &str) -> RunningBatch<'_> {
        self.running.lock().insert(batch_id.to_string());
        RunningBatch {
            running: &self.running,
            batch_id: batch_id.to_string(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `request` to completion.
    ///
    /// Album failures are recorded in the report; only discovery failures
    /// and journal recovery errors are returned as `Err`. A terminal event
    /// for `batch_id` is published either way.
    pub async fn run(
        &self,
        batch_id: JobId,
        request: &JobRequest,
        cancel: CancelToken,
        observer: &dyn BatchObserver,
    ) -> Result<BatchReport, Error> {
        let options = &request.options;
        let interval = self.config.workers.progress_interval;

        let _running = self.track(&batch_id.to_string());
        let prepared = self.prepare(request).await;
        let album_dirs = match prepared {
            Ok(dirs) => dirs,
            Err(e) => {
                let mut progress = BatchProgress::new(batch_id, 0, interval);
                progress.abort(&request.source_directory, e.to_string());
                observer.publish(progress.finish(cancel.is_cancelled()));
                return Err(e);
            }
        };

        let jobs: Vec<Job> = album_dirs
            .into_iter()
            .map(|dir| Job::new(dir, cancel.child()))
            .collect();
        observer.jobs_queued(batch_id, &jobs);

        let mut progress = BatchProgress::new(batch_id, jobs.len(), interval);
        observer.publish(progress.start());

        let engine = DecisionEngine::new(self.config.decision.clone(), &request.destination)
            .with_forced_mode(options.mode);
        for (mode, e) in engine.template_errors() {
            tracing::warn!(target: "jobs", %mode, error = %e, "Template unusable; albums in this mode go to Unsorted");
        }

        let ctx = Arc::new(PipelineContext {
            pool: self.pool.clone(),
            batch_id: batch_id.to_string(),
            reader: self.reader.clone(),
            enrichment: if options.enrichment_enabled {
                self.enrichment.clone()
            } else {
                None
            },
            engine,
            executor: self.executor.clone(),
            confidence_threshold: self.config.enrichment.confidence_threshold,
            dry_run: options.dry_run,
            incremental: options.incremental,
        });

        let worker_pool = WorkerPool::new(options.worker_count.unwrap_or_else(|| self.config.worker_count()));
        tracing::info!(
            target: "jobs",
            %batch_id,
            albums = jobs.len(),
            workers = worker_pool.workers(),
            dry_run = options.dry_run,
            "Batch started"
        );

        let queue = Arc::new(JobQueue::new(jobs));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let workers = tokio::spawn({
            let batch = cancel.clone();
            async move { worker_pool.run(ctx, queue, batch, tx).await }
        });

        let mut albums = Vec::new();
        while let Some(event) = rx.recv().await {
            match event {
                WorkerEvent::Started { job_id, album } => {
                    progress.album_started(&album);
                    observer.publish(ProgressEvent::for_album(job_id, &album, JobStatus::Running));
                }
                WorkerEvent::Finished(report) => {
                    observer.publish(album_event(&report));
                    if progress.record(&report) {
                        observer.publish(progress.snapshot());
                    }
                    albums.push(report);
                }
            }
        }
        if let Err(e) = workers.await {
            tracing::error!(target: "jobs", %batch_id, error = %e, "Worker pool ended abnormally");
        }

        let event = progress.finish(cancel.is_cancelled());
        let summary = progress.summary();
        if let Some(fatal) = progress.fatal() {
            tracing::error!(target: "jobs", %batch_id, error = fatal, "Batch aborted");
        }
        tracing::info!(
            target: "jobs",
            %batch_id,
            status = event.status.as_str(),
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            "Batch finished"
        );
        observer.publish(event.clone());

        Ok(BatchReport {
            batch_id,
            summary,
            event,
            albums,
        })
    }

    /// Recover interrupted moves and find the album directories.
    async fn prepare(&self, request: &JobRequest) -> Result<Vec<PathBuf>, Error> {
        crate::db::ping(&self.pool).await?;
        if !request.options.dry_run {
            let in_flight = self.running.lock().clone();
            let recovered = recover_pending(&self.pool, &in_flight).await?;
            if recovered.completed + recovered.failed > 0 {
                tracing::info!(
                    target: "organizer::journal",
                    completed = recovered.completed,
                    failed = recovered.failed,
                    "Resolved interrupted moves from a previous run"
                );
            }
        }
        if self.enrichment.is_some() {
            let purged = crate::db::cache::purge_expired(&self.pool).await?;
            if purged > 0 {
                tracing::debug!(target: "enrichment::cache", purged, "Dropped expired lookups");
            }
        }

        let source = request.source_directory.clone();
        let exclude = excluded_dirs(&source, &request.destination);
        let found = tokio::task::spawn_blocking(move || discover_albums(&source, &exclude))
            .await
            .map_err(|e| AlbumError::Worker {
                album: request.source_directory.clone(),
                message: e.to_string(),
            })?;
        found.map_err(|e| Error::Album(AlbumError::Scan(e)))
    }
}

/// The destination is skipped during discovery when it lives inside the
/// source tree; organizing a library in place scans all of it.
fn excluded_dirs(source: &Path, destination: &Path) -> Vec<PathBuf> {
    if destination != source && destination.starts_with(source) {
        vec![destination.to_path_buf()]
    } else {
        Vec::new()
    }
}

fn album_event(report: &AlbumReport) -> ProgressEvent {
    let errors = match &report.result {
        Err(e) => vec![JobMessage::error(&report.album, e)],
        Ok(_) => Vec::new(),
    };
    let warnings = report
        .warnings
        .iter()
        .map(|w| JobMessage::warning(&report.album, w.clone()))
        .collect();
    ProgressEvent::for_album(report.job_id, &report.album, report.status()).with_messages(errors, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::journal;
    use crate::jobs::{AlbumOutcome, JobOptions};
    use crate::organizer::{RollbackTarget, rollback};
    use crate::model::MoveStatus;
    use crate::organizer::RollbackError;
    use crate::test_utils::{MockReader, temp_db, write_album};
    use std::fs;
    use tempfile::tempdir;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<ProgressEvent>>,
    }

    impl BatchObserver for Recorder {
        fn publish(&self, event: ProgressEvent) {
            self.events.lock().push(event);
        }
    }

    fn runner(pool: &SqlitePool) -> BatchRunner {
        let mut config = Config::default();
        config.enrichment.enabled = false;
        config.workers.progress_interval = 2;
        BatchRunner::new(pool.clone(), config, Arc::new(MockReader::default()))
    }

    fn request(source: &Path, destination: &Path) -> JobRequest {
        JobRequest {
            source_directory: source.to_path_buf(),
            destination: destination.to_path_buf(),
            options: JobOptions {
                enrichment_enabled: false,
                worker_count: Some(3),
                ..JobOptions::default()
            },
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failed_album_does_not_abort_batch() {
        let (pool, _db) = temp_db().await;
        let dir = tempdir().unwrap();
        let src = dir.path().join("in");
        let lib = dir.path().join("lib");
        for name in ["Aphex Twin - Drukqs", "Plaid - Double Figure", "Autechre - Confield"] {
            write_album(&src, name, &["01.flac", "02.flac"]);
        }
        // A file where Plaid's artist directory would go
        fs::create_dir_all(lib.join("Lossless/Artists")).unwrap();
        fs::write(lib.join("Lossless/Artists/Plaid"), b"blocker").unwrap();

        let recorder = Recorder::default();
        let report = runner(&pool)
            .run(JobId::new_v4(), &request(&src, &lib), CancelToken::new(), &recorder)
            .await
            .unwrap();

        assert_eq!(report.summary, BatchSummary { succeeded: 2, failed: 1, skipped: 0, cancelled: 0 });
        assert_eq!(report.event.status, JobStatus::Completed);
        assert_eq!(report.event.errors.len(), 1);
        assert_eq!(report.event.errors[0].kind, "MoveError");
        assert!(src.join("Plaid - Double Figure/01.flac").exists());
        assert!(lib.join("Lossless/Artists/Autechre/Confield/01.flac").exists());

        let events = recorder.events.lock();
        assert_eq!(events.first().unwrap().status, JobStatus::Running);
        assert_eq!(events.last().unwrap().status, JobStatus::Completed);
        assert_eq!(events.last().unwrap().processed_items, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_second_incremental_run_moves_nothing() {
        let (pool, _db) = temp_db().await;
        let dir = tempdir().unwrap();
        let src = dir.path().join("in");
        let lib = dir.path().join("lib");
        for name in ["Aphex Twin - Drukqs", "Plaid - Double Figure"] {
            write_album(&src, name, &["01.flac", "cover.jpg"]);
        }
        let runner = runner(&pool);

        let first = runner
            .run(JobId::new_v4(), &request(&src, &lib), CancelToken::new(), &LogObserver)
            .await
            .unwrap();
        assert_eq!(first.summary.succeeded, 2);
        let moves = journal::count_operations(&pool, None).await.unwrap();
        assert_eq!(moves, 4);

        let second = runner
            .run(JobId::new_v4(), &request(&lib, &lib), CancelToken::new(), &LogObserver)
            .await
            .unwrap();
        assert_eq!(second.summary, BatchSummary { succeeded: 0, failed: 0, skipped: 2, cancelled: 0 });
        assert!(second
            .albums
            .iter()
            .all(|a| matches!(a.result, Ok(AlbumOutcome::AlreadyProcessed))));
        assert_eq!(journal::count_operations(&pool, None).await.unwrap(), moves);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_batch_rollback_restores_sources() {
        let (pool, _db) = temp_db().await;
        let dir = tempdir().unwrap();
        let src = dir.path().join("in");
        let lib = dir.path().join("lib");
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join("README.txt"), b"unrelated").unwrap();
        for name in ["Aphex Twin - Drukqs", "Plaid - Double Figure", "Autechre - Confield"] {
            write_album(&src, name, &["01.flac", "02.flac"]);
        }

        let batch_id = JobId::new_v4();
        let report = runner(&pool)
            .run(batch_id, &request(&src, &lib), CancelToken::new(), &LogObserver)
            .await
            .unwrap();
        assert_eq!(report.summary.succeeded, 3);

        let undo = rollback(&pool, &RollbackTarget::Batch(batch_id.to_string()), Some(&lib))
            .await
            .unwrap();
        assert!(undo.is_complete());
        assert_eq!(undo.outcomes.len(), 6);
        for name in ["Aphex Twin - Drukqs", "Plaid - Double Figure", "Autechre - Confield"] {
            assert!(src.join(name).join("01.flac").exists());
            assert!(src.join(name).join("02.flac").exists());
        }
        let remaining: Vec<_> = fs::read_dir(&lib).unwrap().map(|e| e.unwrap().file_name()).collect();
        assert_eq!(remaining, vec![std::ffi::OsString::from("README.txt")]);
    }

    #[tokio::test]
    async fn test_cancelled_batch_moves_nothing() {
        let (pool, _db) = temp_db().await;
        let dir = tempdir().unwrap();
        let src = dir.path().join("in");
        for name in ["A - One", "B - Two"] {
            write_album(&src, name, &["01.mp3"]);
        }
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = runner(&pool)
            .run(JobId::new_v4(), &request(&src, &dir.path().join("lib")), cancel, &LogObserver)
            .await
            .unwrap();
        assert_eq!(report.summary.cancelled, 2);
        assert_eq!(report.event.status, JobStatus::Cancelled);
        assert_eq!(journal::count_operations(&pool, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_source_fails_batch() {
        let (pool, _db) = temp_db().await;
        let dir = tempdir().unwrap();
        let recorder = Recorder::default();
        let result = runner(&pool)
            .run(
                JobId::new_v4(),
                &request(&dir.path().join("nope"), &dir.path().join("lib")),
                CancelToken::new(),
                &recorder,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(recorder.events.lock().last().unwrap().status, JobStatus::Failed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_batches_share_one_store() {
        let (pool, _db) = temp_db().await;
        let dir = tempdir().unwrap();
        let lib = dir.path().join("lib");
        let first_src = dir.path().join("in1");
        let second_src = dir.path().join("in2");
        for name in ["Aphex Twin - Drukqs", "Plaid - Double Figure", "Autechre - Confield"] {
            write_album(&first_src, name, &["01.flac", "02.flac", "03.flac"]);
        }
        for name in ["Boards of Canada - Geogaddi", "Squarepusher - Ultravisitor", "Bola - Soup"] {
            write_album(&second_src, name, &["01.flac", "02.flac", "03.flac"]);
        }

        let runner = Arc::new(runner(&pool));
        let (first_req, second_req) = (request(&first_src, &lib), request(&second_src, &lib));
        let (first, second) = tokio::join!(
            runner.run(JobId::new_v4(), &first_req, CancelToken::new(), &LogObserver),
            runner.run(JobId::new_v4(), &second_req, CancelToken::new(), &LogObserver),
        );
        assert_eq!(first.unwrap().summary.succeeded, 3);
        assert_eq!(second.unwrap().summary.succeeded, 3);

        let ops = journal::list_operations(&pool, None).await.unwrap();
        assert_eq!(ops.len(), 18);
        assert!(ops.iter().all(|op| op.status == MoveStatus::Completed));
        assert!(runner.running.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_albums_rendering_one_destination_keep_both() {
        let (pool, _db) = temp_db().await;
        let dir = tempdir().unwrap();
        let src = dir.path().join("in");
        let lib = dir.path().join("lib");
        let first = write_album(&src.join("a"), "Aphex Twin - Drukqs", &["01.flac", "02.flac"]);
        let second = write_album(&src.join("b"), "Aphex Twin - Drukqs", &["01.flac", "02.flac", "03.flac"]);

        let mut req = request(&src, &lib);
        req.options.worker_count = Some(2);
        let report = runner(&pool)
            .run(JobId::new_v4(), &req, CancelToken::new(), &LogObserver)
            .await
            .unwrap();
        assert_eq!(report.summary.failed, 0);
        assert_eq!(report.summary.succeeded + report.summary.skipped, 2);

        let mut destinations: Vec<PathBuf> = report
            .albums
            .iter()
            .filter_map(|a| match &a.result {
                Ok(AlbumOutcome::Organized { destination, .. }) => Some(destination.clone()),
                _ => None,
            })
            .collect();
        let organized = destinations.len();
        destinations.sort();
        destinations.dedup();
        assert_eq!(destinations.len(), organized);
        assert!(destinations.contains(&lib.join("Lossless/Artists/Aphex Twin/Drukqs")));

        // Every file is either in the library or still at its source
        let completed = journal::list_operations(&pool, None)
            .await
            .unwrap()
            .into_iter()
            .filter(|op| op.status == MoveStatus::Completed)
            .count();
        let left = [&first, &second]
            .iter()
            .filter(|dir| dir.exists())
            .map(|dir| fs::read_dir(dir).unwrap().count())
            .sum::<usize>();
        assert_eq!(completed + left, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_recovery_skips_batches_still_running() {
        let (pool, _db) = temp_db().await;
        let dir = tempdir().unwrap();
        let src = dir.path().join("in");
        write_album(&src, "Plaid - Double Figure", &["01.flac"]);

        let other_src = dir.path().join("elsewhere").join("01.flac");
        fs::create_dir_all(other_src.parent().unwrap()).unwrap();
        fs::write(&other_src, b"mid-move").unwrap();
        let other_dest = dir.path().join("lib").join("01.flac");
        let pending = journal::append_pending(&pool, "other", &other_src, &other_dest).await.unwrap();

        let runner = runner(&pool);
        let other = runner.track("other");
        let report = runner
            .run(JobId::new_v4(), &request(&src, &dir.path().join("lib")), CancelToken::new(), &LogObserver)
            .await
            .unwrap();
        assert_eq!(report.summary.succeeded, 1);
        let op = journal::get_operation(&pool, pending).await.unwrap().unwrap();
        assert_eq!(op.status, MoveStatus::Pending);

        // Once it stops running, its entry counts as interrupted
        drop(other);
        runner
            .run(JobId::new_v4(), &request(&src, &dir.path().join("lib")), CancelToken::new(), &LogObserver)
            .await
            .unwrap();
        let op = journal::get_operation(&pool, pending).await.unwrap().unwrap();
        assert_eq!(op.status, MoveStatus::Failed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_halted_rollback_reprocesses_restored_album() {
        let (pool, _db) = temp_db().await;
        let dir = tempdir().unwrap();
        let src = dir.path().join("in");
        let lib = dir.path().join("lib");
        for name in ["Aphex Twin - Drukqs", "Plaid - Double Figure"] {
            write_album(&src, name, &["01.flac", "02.flac"]);
        }
        let runner = runner(&pool);
        let mut req = request(&src, &lib);
        req.options.worker_count = Some(1);

        let batch_id = JobId::new_v4();
        let first = runner.run(batch_id, &req, CancelToken::new(), &LogObserver).await.unwrap();
        assert_eq!(first.summary.succeeded, 2);

        // Edit the last file of the first album moved, so the rollback
        // restores the second album and halts there
        let ops = journal::list_operations(&pool, Some(&batch_id.to_string())).await.unwrap();
        assert_eq!(ops.len(), 4);
        fs::write(&ops[1].dest_path, b"edited").unwrap();
        let restored_album = ops[2].source_path.parent().unwrap().to_path_buf();

        let undo = rollback(&pool, &RollbackTarget::Batch(batch_id.to_string()), Some(&lib))
            .await
            .unwrap();
        assert_eq!(undo.outcomes.len(), 2);
        assert!(matches!(undo.error, Some(RollbackError::ContentChanged { .. })));
        assert!(restored_album.join("01.flac").exists());

        let again = runner.run(JobId::new_v4(), &req, CancelToken::new(), &LogObserver).await.unwrap();
        assert_eq!(again.albums.len(), 1);
        assert_eq!(again.albums[0].album, restored_album);
        assert!(matches!(again.albums[0].result, Ok(AlbumOutcome::Organized { .. })));
    }

    #[test]
    fn test_destination_inside_source_is_excluded() {
        assert_eq!(
            excluded_dirs(Path::new("/music"), Path::new("/music/library")),
            vec![PathBuf::from("/music/library")]
        );
        assert!(excluded_dirs(Path::new("/music"), Path::new("/music")).is_empty());
        assert!(excluded_dirs(Path::new("/in"), Path::new("/lib")).is_empty());
    }
}
