//! Incremental Git Ingestion Engine
//!
//! Walks each selected branch from its head down to the saved cursor, diffs new
//! commits on a bounded worker pool and persists them through a single
//! consumer. Feature branches only contribute commits that are not reachable
//! from the default branch.

/// Author matching against the configured local identity
pub mod identity;
/// Branch selection resolution and persistence
pub mod selection;


pub use identity::{github_noreply_username, is_user_commit};
pub use selection::{
    BranchPrompt, BranchRequest, BranchSelection, BranchSelector, SavedChoice, SelectionStore,
};

use crate::config::IngestConfig;
use crate::error::{GitError, LlmError, StoreError, WorklogError};
use crate::git::{
    CommitMeta, DiffLimits, DiffPool, DiffedCommit, GitWalker, ProgressFn, UserIdentity,
    WalkBounds,
};
use crate::git::diff::{TRUNCATION_MARKER, floor_char_boundary};
use crate::llm::prompts::{self, CodebaseContext};
use crate::llm::{LanguageModelClient, with_timeout};
use crate::store::{BranchRecord, BranchStatus, Codebase, CommitRecord, FileChangeRecord, Store, short_hash};
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::{Duration, Instant};

/// Counts produced by ingesting one branch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub commits_ingested: usize,
    pub file_changes_ingested: usize,
    /// Walked commits that were already stored
    pub commits_skipped: usize,
    /// Commits that could not be persisted
    pub commits_failed: usize,
    /// Whether the branch cursor moved this run
    pub cursor_advanced: bool,
}

/// Outcome of one branch within a multi-branch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchOutcome {
    pub branch: String,
    pub result: Result<IngestStats, String>,
}

/// Per-branch results of [`IngestionEngine::ingest_selection`], default branch first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub branches: Vec<BranchOutcome>,
    pub duration_ms: u64,
}

impl IngestReport {
    pub fn commits_ingested(&self) -> usize {
        self.succeeded().map(|(_, s)| s.commits_ingested).sum()
    }

    pub fn file_changes_ingested(&self) -> usize {
        self.succeeded().map(|(_, s)| s.file_changes_ingested).sum()
    }

    pub fn failed_branches(&self) -> impl Iterator<Item = (&str, &str)> {
        self.branches.iter().filter_map(|o| match &o.result {
            Err(e) => Some((o.branch.as_str(), e.as_str())),
            Ok(_) => None,
        })
    }

    fn succeeded(&self) -> impl Iterator<Item = (&str, &IngestStats)> {
        self.branches.iter().filter_map(|o| match &o.result {
            Ok(stats) => Some((o.branch.as_str(), stats)),
            Err(_) => None,
        })
    }
}

/// Repository facts needed before a run: root, branches, default, identity
#[derive(Debug, Clone)]
pub struct RepoOverview {
    pub root: PathBuf,
    pub name: String,
    pub branches: Vec<String>,
    pub detected_default: Option<String>,
    pub identity: Option<UserIdentity>,
}

/// Who counts as "the user" when flagging commits
#[derive(Debug, Clone, Default)]
pub struct UserMatch {
    pub email: Option<String>,
    pub github_handle: Option<String>,
}

/// Discover the repository containing `path` and describe it
pub async fn inspect_repository(path: &Path) -> Result<RepoOverview, WorklogError> {
    let path = path.to_path_buf();
    let overview = tokio::task::spawn_blocking(move || -> Result<RepoOverview, GitError> {
        let walker = GitWalker::discover(&path)?;
        let root = walker.repo_path().to_path_buf();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root.display().to_string());
        Ok(RepoOverview {
            name,
            branches: walker.list_branches()?,
            detected_default: walker.detect_default_branch(),
            identity: walker.user_identity(),
            root,
        })
    })
    .await
    .context("Failed to spawn blocking task for repository discovery")??;
    Ok(overview)
}

/// What the blocking walk decided for one branch
struct BranchPlan {
    head: String,
    repo_path: PathBuf,
    commits: Vec<CommitMeta>,
    /// The stored cursor is an ancestor-or-self of the head (or absent)
    cursor_moves_forward: bool,
}

/// Orchestrates walker, diff pool, store and optional commit summaries
pub struct IngestionEngine {
    store: Arc<Store>,
    llm: Option<Arc<dyn LanguageModelClient>>,
    config: IngestConfig,
    on_progress: Option<ProgressFn>,
}

impl IngestionEngine {
    /// Create an engine; requesting summaries without a client fails the run
    pub fn new(
        store: Arc<Store>,
        config: IngestConfig,
        llm: Option<Arc<dyn LanguageModelClient>>,
    ) -> Result<Self, WorklogError> {
        if config.generate_summaries && llm.is_none() {
            return Err(LlmError::NotConfigured.into());
        }
        Ok(Self {
            store,
            llm,
            config,
            on_progress: None,
        })
    }

    /// Report `(processed, total)` diff progress while a branch is ingested
    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn summarizer(&self) -> Option<&Arc<dyn LanguageModelClient>> {
        self.llm.as_ref().filter(|_| self.config.generate_summaries)
    }

    fn limits(&self) -> DiffLimits {
        DiffLimits {
            max_file_diff_chars: self.config.max_file_diff_chars,
            patch_budget_bytes: self.config.patch_budget_bytes,
        }
    }

    /// Register the repository as a codebase, recording its default branch on first sight
    pub fn register_codebase(&self, overview: &RepoOverview) -> Result<Codebase, WorklogError> {
        let path = overview.root.display().to_string();
        let mut codebase = self.store.upsert_codebase(&path, &overview.name)?;

        if codebase.default_branch.is_empty()
            && let Some(default) = &overview.detected_default
        {
            self.store.set_default_branch(codebase.id, default)?;
            codebase.default_branch = default.clone();
            tracing::info!("Registered codebase {} (default branch {})", path, default);
        }
        self.sync_branch_status(&codebase, &overview.branches)?;
        Ok(codebase)
    }

    /// Mark stored branches gone from the repository as deleted, and revive
    /// any that reappeared
    fn sync_branch_status(
        &self,
        codebase: &Codebase,
        present: &[String],
    ) -> Result<(), WorklogError> {
        for branch in self.store.list_branches(codebase.id)? {
            let exists = present.contains(&branch.name);
            let status = match (exists, branch.status) {
                (false, BranchStatus::Active) => BranchStatus::Deleted,
                (true, BranchStatus::Deleted) => BranchStatus::Active,
                _ => continue,
            };
            tracing::info!("Branch {} is now {}", branch.name, status.as_str());
            self.store.set_branch_status(branch.id, status)?;
        }
        Ok(())
    }

    /// Ingest every branch of a selection, default branch first
    ///
    /// Branch-level failures are recorded and the run continues; run-level
    /// failures abort.
    pub async fn ingest_selection(
        &self,
        codebase: &Codebase,
        selection: &BranchSelection,
        since: Option<i64>,
        user: &UserMatch,
    ) -> Result<IngestReport, WorklogError> {
        let start = Instant::now();
        self.store
            .set_default_branch(codebase.id, &selection.default_branch)?;

        let mut ordered: Vec<&String> = selection
            .branches
            .iter()
            .filter(|b| **b == selection.default_branch)
            .collect();
        ordered.extend(
            selection
                .branches
                .iter()
                .filter(|b| **b != selection.default_branch),
        );

        let mut report = IngestReport::default();
        for branch in ordered {
            let base = if *branch == selection.default_branch {
                ""
            } else {
                selection.default_branch.as_str()
            };

            let result = self
                .ingest_branch(
                    codebase,
                    branch,
                    base,
                    since,
                    user.email.as_deref(),
                    user.github_handle.as_deref(),
                )
                .await;

            match result {
                Ok(stats) => report.branches.push(BranchOutcome {
                    branch: branch.clone(),
                    result: Ok(stats),
                }),
                Err(e) if e.is_fatal_to_run() => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping branch {}: {}", branch, e);
                    report.branches.push(BranchOutcome {
                        branch: branch.clone(),
                        result: Err(e.to_string()),
                    });
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Ingested {} commits and {} file changes across {} branches in {} ms",
            report.commits_ingested(),
            report.file_changes_ingested(),
            report.branches.len(),
            report.duration_ms
        );
        Ok(report)
    }

    /// Ingest new commits of one branch
    ///
    /// An empty `base_branch` marks the default branch, whose whole history is
    /// ingested. Otherwise only commits not reachable from `base_branch` are
    /// ingested, or the full history when the two share no ancestor.
    pub async fn ingest_branch(
        &self,
        codebase: &Codebase,
        branch: &str,
        base_branch: &str,
        since: Option<i64>,
        user_email: Option<&str>,
        github_handle: Option<&str>,
    ) -> Result<IngestStats, WorklogError> {
        let is_default = base_branch.is_empty();
        let record = if is_default {
            self.store.set_default_branch(codebase.id, branch)?
        } else {
            self.store.ensure_branch(codebase.id, branch, base_branch)?
        };
        let cursor = self.store.get_cursor(codebase.id, branch)?;

        let plan = self
            .plan_branch(codebase, branch, base_branch, cursor.clone(), since)
            .await?;

        let mut stats = IngestStats::default();
        let mut pending = Vec::with_capacity(plan.commits.len());
        for meta in &plan.commits {
            if self.store.commit_exists(codebase.id, &meta.hash)? {
                tracing::debug!("Skipping stored commit {}", short_hash(&meta.hash));
                stats.commits_skipped += 1;
            } else {
                pending.push(meta.hash.clone());
            }
        }

        tracing::info!(
            "Branch {}: {} new commits ({} already stored)",
            branch,
            pending.len(),
            stats.commits_skipped
        );

        if !pending.is_empty() {
            let context = CodebaseContext {
                name: codebase.name.clone(),
                summary: codebase.summary.clone(),
            };
            self.persist_commits(
                codebase,
                &record,
                &plan.repo_path,
                pending,
                &context,
                user_email,
                github_handle,
                &mut stats,
            )
            .await?;
        }

        self.store.refresh_branch_metadata(record.id)?;

        if stats.commits_failed > 0 {
            tracing::warn!(
                "Branch {}: {} commits failed to persist, cursor stays put",
                branch,
                stats.commits_failed
            );
        } else if cursor.as_deref() == Some(plan.head.as_str()) {
            tracing::debug!("Branch {} cursor already at head", branch);
        } else if plan.cursor_moves_forward {
            self.store.set_cursor(codebase.id, branch, &plan.head)?;
            stats.cursor_advanced = true;
        } else {
            tracing::warn!(
                "Branch {} head {} does not descend from cursor {}, keeping cursor",
                branch,
                short_hash(&plan.head),
                cursor.as_deref().map(short_hash).unwrap_or("-")
            );
        }

        Ok(stats)
    }

    /// Resolve heads and walk the branch on a blocking thread
    async fn plan_branch(
        &self,
        codebase: &Codebase,
        branch: &str,
        base_branch: &str,
        cursor: Option<String>,
        since: Option<i64>,
    ) -> Result<BranchPlan, WorklogError> {
        let repo_path = PathBuf::from(&codebase.path);
        let branch = branch.to_string();
        let base_branch = base_branch.to_string();

        let plan = tokio::task::spawn_blocking(move || -> Result<BranchPlan, GitError> {
            let walker = GitWalker::open(&repo_path)?;
            let head = walker.branch_head(&branch)?;

            let mut cursor_moves_forward = true;
            let stop = match cursor {
                Some(cursor) if !walker.has_commit(&cursor) => {
                    tracing::warn!(
                        "Cursor {} of branch {} is no longer in the repository",
                        short_hash(&cursor),
                        branch
                    );
                    None
                }
                Some(cursor) => {
                    cursor_moves_forward = walker
                        .is_ancestor_or_self(&cursor, &head)
                        .unwrap_or_else(|e| {
                            tracing::warn!("Ancestry check for branch {} failed: {}", branch, e);
                            false
                        });
                    Some(cursor)
                }
                None => None,
            };

            let hide = if base_branch.is_empty() {
                Vec::new()
            } else {
                unique_commit_boundary(&walker, &branch, &head, &base_branch)
            };

            let bounds = WalkBounds { stop, hide, since };
            let commits = walker.ancestors(&head, &bounds)?;
            Ok(BranchPlan {
                head,
                repo_path: walker.repo_path().to_path_buf(),
                commits,
                cursor_moves_forward,
            })
        })
        .await
        .context("Failed to spawn blocking task for history walk")??;

        Ok(plan)
    }

    /// Diff `hashes` on the worker pool and persist results as they arrive
    #[allow(clippy::too_many_arguments)]
    async fn persist_commits(
        &self,
        codebase: &Codebase,
        branch: &BranchRecord,
        repo_path: &Path,
        hashes: Vec<String>,
        context: &CodebaseContext,
        user_email: Option<&str>,
        github_handle: Option<&str>,
        stats: &mut IngestStats,
    ) -> Result<(), WorklogError> {
        let pool = DiffPool::new(repo_path, self.config.effective_workers(), self.limits())?;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let progress = Arc::new(AtomicUsize::new(0));
        let on_progress = self.on_progress.clone();

        let workers = tokio::task::spawn_blocking(move || {
            pool.run(&hashes, tx, progress, on_progress);
        });

        while let Some(outcome) = rx.recv().await {
            let diffed = outcome?;
            self.persist_one(codebase, branch, diffed, context, user_email, github_handle, stats)
                .await?;
        }

        workers
            .await
            .map_err(|e| GitError::PoolFailed(e.to_string()))?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_one(
        &self,
        codebase: &Codebase,
        branch: &BranchRecord,
        diffed: DiffedCommit,
        context: &CodebaseContext,
        user_email: Option<&str>,
        github_handle: Option<&str>,
        stats: &mut IngestStats,
    ) -> Result<(), WorklogError> {
        let DiffedCommit {
            meta,
            files,
            stats: commit_stats,
            patch_excerpt,
        } = diffed;
        let short = short_hash(&meta.hash).to_string();

        if let Err(e) =
            self.store
                .upsert_developer(&meta.author_email, &meta.author_name, meta.author_time)
        {
            tracing::warn!("Failed to record author of {}: {}", short, e);
        }

        let is_user = is_user_commit(&meta.author_email, user_email, github_handle);

        let summary = match self.summarizer() {
            Some(llm) if is_user && !files.is_empty() => {
                let prompt = prompts::commit_summary(context, &meta.message, &files, &patch_excerpt);
                let limit = Duration::from_secs(self.config.commit_summary_timeout_secs);
                let text = with_timeout(&format!("commit {}", short), limit, llm.complete(&prompt))
                    .await?;
                Some(text)
            }
            _ => None,
        };

        let record = CommitRecord {
            codebase_id: codebase.id,
            hash: meta.hash.clone(),
            branch_id: Some(branch.id),
            author_name: meta.author_name,
            author_email: meta.author_email,
            message: meta.message,
            summary,
            timestamp: meta.author_time,
            stats: commit_stats,
            is_user_commit: is_user,
            is_on_default_branch: branch.is_default,
        };

        match self.store.insert_commit(&record) {
            Ok(()) => {}
            Err(e @ (StoreError::Connection { .. } | StoreError::LockPoisoned)) => {
                return Err(e.into());
            }
            Err(e) => {
                tracing::warn!("Skipping commit {}: {}", short, e);
                stats.commits_failed += 1;
                return Ok(());
            }
        }
        stats.commits_ingested += 1;

        for change in &files {
            match self.store.insert_file_change(codebase.id, &meta.hash, change) {
                Ok(()) => stats.file_changes_ingested += 1,
                Err(e) => tracing::warn!(
                    "Skipping file change {} of commit {}: {}",
                    change.path,
                    short,
                    e
                ),
            }
        }
        Ok(())
    }

    /// Generate summaries for stored user commits that lack one
    ///
    /// Returns how many summaries were written.
    pub async fn backfill_summaries(
        &self,
        codebase: &Codebase,
        limit: usize,
    ) -> Result<usize, WorklogError> {
        let llm = self.llm.as_ref().ok_or(LlmError::NotConfigured)?;
        let context = CodebaseContext {
            name: codebase.name.clone(),
            summary: codebase.summary.clone(),
        };
        let timeout = Duration::from_secs(self.config.commit_summary_timeout_secs);

        let mut written = 0;
        for commit in self.store.commits_missing_summary(codebase.id, limit)? {
            let files = self.store.list_file_changes(codebase.id, &commit.hash)?;
            if files.is_empty() {
                continue;
            }

            let excerpt = stored_patch_excerpt(&files, self.config.patch_budget_bytes);
            let prompt = prompts::commit_summary(&context, &commit.message, &files, &excerpt);
            let target = format!("commit {}", commit.short_hash());
            let summary = with_timeout(&target, timeout, llm.complete(&prompt)).await?;

            if self
                .store
                .update_commit_summary(codebase.id, &commit.hash, &summary)?
            {
                written += 1;
            }
        }

        tracing::info!("Backfilled {} commit summaries", written);
        Ok(written)
    }
}

/// Tips to hide so a walk from `head` yields only commits unique to `branch`
///
/// Hides the base head when the two branches share an ancestor; otherwise
/// nothing is hidden and the whole branch history is walked.
fn unique_commit_boundary(
    walker: &GitWalker,
    branch: &str,
    head: &str,
    base_branch: &str,
) -> Vec<String> {
    let base_head = match walker.branch_head(base_branch) {
        Ok(base_head) => base_head,
        Err(e) => {
            tracing::warn!(
                "Cannot resolve base branch {} for {}, ingesting full history: {}",
                base_branch,
                branch,
                e
            );
            return Vec::new();
        }
    };

    match walker.merge_base(head, &base_head) {
        Ok(Some(merge_base)) => {
            tracing::debug!(
                "Branch {} forks from {} at {}",
                branch,
                base_branch,
                short_hash(&merge_base)
            );
            vec![base_head]
        }
        Ok(None) => {
            tracing::info!(
                "Branch {} shares no history with {}, ingesting full history",
                branch,
                base_branch
            );
            Vec::new()
        }
        Err(e) => {
            tracing::warn!(
                "Merge-base lookup for {} failed, ingesting full history: {}",
                branch,
                e
            );
            Vec::new()
        }
    }
}

/// Rebuild a bounded patch excerpt from stored per-file diffs
fn stored_patch_excerpt(files: &[FileChangeRecord], budget: usize) -> String {
    let mut excerpt = String::new();
    for diff in files.iter().filter_map(|f| f.diff.as_deref()) {
        let remaining = budget.saturating_sub(excerpt.len());
        if diff.len() > remaining {
            excerpt.push_str(&diff[..floor_char_boundary(diff, remaining)]);
            excerpt.push_str(TRUNCATION_MARKER);
            break;
        }
        excerpt.push_str(diff);
    }
    excerpt
}
