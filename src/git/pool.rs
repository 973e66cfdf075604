//! Bounded parallel diff computation
//!
//! Workers share nothing but an atomic progress counter; each opens its own
//! repository handle and sends one finished record per commit to a single
//! consumer, in completion order.

use super::diff::{DiffLimits, DiffedCommit, diff_commit};
use crate::error::GitError;
use git2::Repository;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc::UnboundedSender;

/// Result of diffing one commit
pub type DiffOutcome = Result<DiffedCommit, GitError>;

/// Progress callback receiving `(processed, total)`
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Fixed-size pool of diff workers for one repository
pub struct DiffPool {
    pool: rayon::ThreadPool,
    repo_path: PathBuf,
    limits: DiffLimits,
}

impl DiffPool {
    pub fn new(repo_path: &Path, workers: usize, limits: DiffLimits) -> Result<Self, GitError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("worklog-diff-{}", i))
            .build()
            .map_err(|e| GitError::PoolFailed(e.to_string()))?;

        Ok(Self {
            pool,
            repo_path: repo_path.to_path_buf(),
            limits,
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Diff every commit in `hashes`, sending each outcome as soon as it is ready
    ///
    /// Blocks until all workers finish. A send to a dropped receiver is ignored
    /// so a consumer that gave up does not stall the pool.
    pub fn run(
        &self,
        hashes: &[String],
        tx: UnboundedSender<DiffOutcome>,
        progress: Arc<AtomicUsize>,
        on_progress: Option<ProgressFn>,
    ) {
        let total = hashes.len();
        let repo_path = self.repo_path.as_path();
        let limits = self.limits;

        self.pool.install(|| {
            hashes.par_iter().for_each_init(
                || Repository::open(repo_path),
                |repo, hash| {
                    let outcome = match repo {
                        Ok(repo) => diff_commit(repo, hash, &limits),
                        Err(e) => Err(GitError::OpenFailed(format!(
                            "{}: {}",
                            repo_path.display(),
                            e.message()
                        ))),
                    };
                    let _ = tx.send(outcome);

                    let done = progress.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(callback) = &on_progress {
                        callback(done, total);
                    }
                },
            );
        });

        tracing::debug!(
            "Diff pool finished {} commits on {} workers",
            total,
            self.workers()
        );
    }

    /// Diff every commit and collect the outcomes, order unspecified
    pub fn diff_all(&self, hashes: &[String]) -> Vec<DiffOutcome> {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        self.run(hashes, tx, Arc::new(AtomicUsize::new(0)), None);

        let mut outcomes = Vec::with_capacity(hashes.len());
        while let Ok(outcome) = rx.try_recv() {
            outcomes.push(outcome);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_repo::TestRepo;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn test_pool_diffs_every_commit() {
        let repo = TestRepo::new();
        let mut hashes = Vec::new();
        for i in 0..6 {
            hashes.push(repo.commit(
                "main",
                "f.txt",
                &format!("{}\n", i),
                &format!("c{}", i),
                1_000 + i,
            ));
        }

        let pool = DiffPool::new(repo.path(), 3, DiffLimits::default()).unwrap();
        assert_eq!(pool.workers(), 3);

        let outcomes = pool.diff_all(&hashes);
        assert_eq!(outcomes.len(), 6);
        let seen: HashSet<_> = outcomes
            .into_iter()
            .map(|o| o.unwrap().meta.hash)
            .collect();
        assert_eq!(seen, hashes.iter().cloned().collect());
    }

    #[test]
    fn test_progress_reaches_total() {
        let repo = TestRepo::new();
        let hashes: Vec<_> = (0..4)
            .map(|i| repo.commit("main", "f.txt", &format!("{}\n", i), "c", 1_000 + i))
            .collect();

        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let callback: ProgressFn = Arc::new(move |done, total| {
            sink.lock().unwrap().push((done, total));
        });

        let progress = Arc::new(AtomicUsize::new(0));
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let pool = DiffPool::new(repo.path(), 2, DiffLimits::default()).unwrap();
        pool.run(&hashes, tx, progress.clone(), Some(callback));

        assert_eq!(progress.load(Ordering::SeqCst), 4);
        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 4);
        assert!(reports.iter().all(|(_, total)| *total == 4));
        assert!(reports.iter().any(|(done, _)| *done == 4));
    }

    #[test]
    fn test_bad_hash_reports_error_without_stopping() {
        let repo = TestRepo::new();
        let good = repo.commit("main", "f.txt", "1\n", "c", 1_000);
        let hashes = vec![good.clone(), "0".repeat(40)];

        let pool = DiffPool::new(repo.path(), 2, DiffLimits::default()).unwrap();
        let outcomes = pool.diff_all(&hashes);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|o| matches!(o, Err(GitError::UnreadableObject { .. }))));
    }
}
