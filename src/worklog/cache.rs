//! Hierarchical Worklog Cache
//!
//! Every generation step is keyed by (codebase, profile, date, branch, entry
//! type, group-by). Stored content is reused only while its signature matches
//! the signature of the commits that would produce it today, and never for the
//! current day.

use super::assemble::Totals;
use super::signature::content_signature;
use crate::error::WorklogError;
use crate::store::{CommitRecord, EntryType, GroupBy, Store, WorklogEntry, WorklogKey};
use chrono::{Local, NaiveDate};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Signature-checked memoization of worklog generation, backed by the store
pub struct WorklogCache {
    store: Arc<Store>,
    codebase_id: i64,
    profile: String,
    summarizer: String,
    today: NaiveDate,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl WorklogCache {
    /// `summarizer` identifies what produces the prose; changing it invalidates entries
    pub fn new(store: Arc<Store>, codebase_id: i64, profile: &str, summarizer: &str) -> Self {
        Self {
            store,
            codebase_id,
            profile: profile.to_string(),
            summarizer: summarizer.to_string(),
            today: Local::now().date_naive(),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Override the date treated as "today"
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// Entries served from cache so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Entries generated so far
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn signature(
        &self,
        entry_type: EntryType,
        group_by: GroupBy,
        commits: &[&CommitRecord],
    ) -> String {
        content_signature(
            commits.iter().map(|c| c.hash.as_str()),
            entry_type,
            group_by,
            &self.summarizer,
        )
    }

    fn key(
        &self,
        date: NaiveDate,
        branch_id: Option<i64>,
        entry_type: EntryType,
        group_by: GroupBy,
    ) -> WorklogKey {
        WorklogKey {
            codebase_id: self.codebase_id,
            profile: self.profile.clone(),
            entry_date: date,
            branch_id,
            entry_type,
            group_by,
        }
    }

    /// Return cached content for this identity, or generate and store it
    ///
    /// The flag is `true` when the content came from the cache. Read failures
    /// count as misses and write failures are logged; neither fails the call.
    #[allow(clippy::too_many_arguments)]
    pub async fn get_cached_or_generate<F, Fut>(
        &self,
        date: NaiveDate,
        branch_id: Option<i64>,
        branch_name: Option<&str>,
        entry_type: EntryType,
        group_by: GroupBy,
        commits: &[&CommitRecord],
        generate: F,
    ) -> Result<(String, bool), WorklogError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, WorklogError>>,
    {
        let signature = self.signature(entry_type, group_by, commits);
        let key = self.key(date, branch_id, entry_type, group_by);
        let label = format!(
            "{} {}{}",
            entry_type,
            date,
            branch_name.map(|b| format!(" [{}]", b)).unwrap_or_default()
        );

        if date == self.today {
            tracing::debug!("{} is today, regenerating", label);
        } else {
            match self.store.get_worklog_entry(&key) {
                Ok(Some(entry)) if entry.signature == signature => {
                    tracing::debug!("Cache hit for {}", label);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok((entry.content, true));
                }
                Ok(Some(_)) => tracing::debug!("Signature changed for {}", label),
                Ok(None) => tracing::debug!("No cached entry for {}", label),
                Err(e) => tracing::warn!("Cache read for {} failed, regenerating: {}", label, e),
            }
        }

        let content = generate().await?;
        self.misses.fetch_add(1, Ordering::Relaxed);

        let totals = Totals::of(commits.iter().copied());
        let entry = WorklogEntry {
            key,
            content: content.clone(),
            signature,
            commit_count: totals.commit_count,
            additions: totals.additions,
            deletions: totals.deletions,
            created_at: chrono::Utc::now().timestamp(),
        };
        if let Err(e) = self.store.upsert_worklog_entry(&entry) {
            tracing::warn!("Failed to cache {}: {}", label, e);
        }

        Ok((content, false))
    }
}
