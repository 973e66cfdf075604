//! Git repository operations for incremental history ingestion
//!
//! Provides functionality to walk git repositories, resolve branches and
//! their common ancestors, and diff commits against their first parent on a
//! bounded worker pool.

/// Per-commit diff computation and hunk line counting
pub mod diff;
/// Bounded parallel diff workers
pub mod pool;
/// Git repository walking and commit extraction
pub mod walker;

#[cfg(test)]
pub(crate) mod test_repo;

pub use diff::{DiffLimits, DiffedCommit, diff_commit};
pub use pool::{DiffOutcome, DiffPool, ProgressFn};
pub use walker::{CommitMeta, GitWalker, UserIdentity, WalkBounds, WalkControl};
