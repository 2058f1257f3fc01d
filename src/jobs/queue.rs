//! Shared FIFO of album jobs.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;

use super::{CancelToken, JobId};

/// One album directory waiting to be processed.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub album_directory: PathBuf,
    pub cancel: CancelToken,
}

impl Job {
    pub fn new(album_directory: PathBuf, cancel: CancelToken) -> Self {
        Self {
            id: JobId::new_v4(),
            album_directory,
            cancel,
        }
    }
}

/// FIFO queue shared by all workers of a batch.
///
/// [`claim`](JobQueue::claim) pops under the lock, so a job is handed to
/// exactly one worker.
#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<Job>>,
}

impl JobQueue {
    pub fn new(jobs: impl IntoIterator<Item = Job>) -> Self {
        Self {
            jobs: Mutex::new(jobs.into_iter().collect()),
        }
    }

    pub fn push(&self, job: Job) {
        self.jobs.lock().push_back(job);
    }

    /// Take the oldest queued job.
    pub fn claim(&self) -> Option<Job> {
        self.jobs.lock().pop_front()
    }

    /// Remove every job still queued.
    pub fn drain(&self) -> Vec<Job> {
        self.jobs.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_fifo_order() {
        let token = CancelToken::new();
        let queue = JobQueue::new(["/a", "/b", "/c"].map(|p| Job::new(PathBuf::from(p), token.child())));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.claim().unwrap().album_directory, PathBuf::from("/a"));
        assert_eq!(queue.claim().unwrap().album_directory, PathBuf::from("/b"));
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.claim().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_each_job_claimed_exactly_once() {
        let token = CancelToken::new();
        let queue = Arc::new(JobQueue::new(
            (0..1000).map(|i| Job::new(PathBuf::from(format!("/album/{i}")), token.child())),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    let mut claimed = Vec::new();
                    while let Some(job) = queue.claim() {
                        claimed.push(job.id);
                    }
                    claimed
                })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "job claimed twice");
                total += 1;
            }
        }
        assert_eq!(total, 1000);
    }
}
