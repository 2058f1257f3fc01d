//! Fixed-size pool of pipeline workers.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::pipeline::{AlbumReport, PipelineContext, Stage, process_album};
use super::{CancelToken, JobId, JobQueue};
use crate::error::AlbumError;

/// Sent by workers as albums move through the pool.
#[derive(Debug)]
pub enum WorkerEvent {
    Started { job_id: JobId, album: PathBuf },
    Finished(AlbumReport),
}

/// Runs queued jobs on `workers` concurrent tasks.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Drain `queue`, sending a `Started` and a `Finished` event per job.
    ///
    /// A fatal album error cancels `batch`; workers stop claiming and every
    /// job still queued is reported cancelled. Returns once all workers have
    /// exited.
    pub async fn run(
        &self,
        ctx: Arc<PipelineContext>,
        queue: Arc<JobQueue>,
        batch: CancelToken,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) {
        let handles: Vec<_> = (0..self.workers)
            .map(|worker_id| {
                let ctx = ctx.clone();
                let queue = queue.clone();
                let batch = batch.clone();
                let events = events.clone();
                tokio::spawn(async move { worker_loop(worker_id, ctx, queue, batch, events).await })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(target: "jobs::worker", error = %e, "Worker task ended abnormally");
            }
        }

        for job in queue.drain() {
            let _ = events.send(WorkerEvent::Finished(AlbumReport::cancelled(&job, Stage::Classify)));
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: Arc<PipelineContext>,
    queue: Arc<JobQueue>,
    batch: CancelToken,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    tracing::debug!(target: "jobs::worker", worker_id, "Worker started");

    while !batch.is_cancelled() {
        let Some(job) = queue.claim() else {
            break;
        };
        let _ = events.send(WorkerEvent::Started {
            job_id: job.id,
            album: job.album_directory.clone(),
        });

        // Each album runs in its own task so a panic stays with that album.
        let task_ctx = ctx.clone();
        let task_job = job.clone();
        let report = match tokio::spawn(async move { process_album(&task_ctx, &task_job).await }).await {
            Ok(report) => report,
            Err(e) => AlbumReport {
                job_id: job.id,
                album: job.album_directory.clone(),
                result: Err(AlbumError::Worker {
                    album: job.album_directory.clone(),
                    message: e.to_string(),
                }),
                warnings: Vec::new(),
            },
        };

        if report.is_fatal() {
            tracing::error!(
                target: "jobs::worker",
                worker_id,
                album = %report.album.display(),
                "Fatal error, cancelling batch"
            );
            batch.cancel();
        }
        let _ = events.send(WorkerEvent::Finished(report));
    }

    tracing::debug!(target: "jobs::worker", worker_id, "Worker exiting");
}
