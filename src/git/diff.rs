//! Per-commit diff computation against the first parent

use super::walker::{CommitMeta, commit_meta};
use crate::error::GitError;
use crate::store::{ChangeType, CommitStats, FileChangeRecord};
use git2::{Delta, DiffFindOptions, DiffOptions, Oid, Patch, Repository};

pub(crate) const TRUNCATION_MARKER: &str = "\n\n[... diff truncated ...]";

/// Size bounds for stored and prompted diff text
#[derive(Debug, Clone, Copy)]
pub struct DiffLimits {
    /// Characters of unified diff kept per file change
    pub max_file_diff_chars: usize,
    /// Bytes of combined patch text kept per commit
    pub patch_budget_bytes: usize,
}

impl Default for DiffLimits {
    fn default() -> Self {
        Self {
            max_file_diff_chars: 10_000,
            patch_budget_bytes: 8_000,
        }
    }
}

/// A commit with its file changes materialized
#[derive(Debug, Clone)]
pub struct DiffedCommit {
    pub meta: CommitMeta,
    pub files: Vec<FileChangeRecord>,
    pub stats: CommitStats,
    /// Combined patch text across files, bounded by the patch budget
    pub patch_excerpt: String,
}

/// Count added and deleted lines by scanning unified-diff hunks
///
/// Only lines inside `@@` hunks count, so `+++`/`---` file headers are ignored.
pub fn count_hunk_lines(patch: &str) -> (u64, u64) {
    let mut in_hunk = false;
    let mut additions = 0;
    let mut deletions = 0;

    for line in patch.lines() {
        if line.starts_with("@@") {
            in_hunk = true;
        } else if line.starts_with("diff --git") {
            in_hunk = false;
        } else if in_hunk {
            match line.as_bytes().first() {
                Some(b'+') => additions += 1,
                Some(b'-') => deletions += 1,
                _ => {}
            }
        }
    }

    (additions, deletions)
}

/// Keep at most `max` characters, never splitting a character
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

/// Largest char boundary not after `max` bytes
pub(crate) fn floor_char_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    (0..=max).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0)
}

fn change_type(status: Delta) -> ChangeType {
    match status {
        Delta::Added | Delta::Copied | Delta::Untracked => ChangeType::Add,
        Delta::Deleted => ChangeType::Delete,
        Delta::Renamed => ChangeType::Rename,
        _ => ChangeType::Modify,
    }
}

/// Diff one commit against its first parent
///
/// A root commit yields no file changes and empty stats.
pub fn diff_commit(
    repo: &Repository,
    hash: &str,
    limits: &DiffLimits,
) -> Result<DiffedCommit, GitError> {
    let diff_err = |reason: String| GitError::DiffFailed {
        commit: hash.to_string(),
        reason,
    };

    let oid = Oid::from_str(hash).map_err(|e| diff_err(e.message().to_string()))?;
    let commit = repo
        .find_commit(oid)
        .map_err(|e| GitError::UnreadableObject {
            oid: hash.to_string(),
            reason: e.message().to_string(),
        })?;
    let meta = commit_meta(&commit);

    if commit.parent_count() == 0 {
        return Ok(DiffedCommit {
            meta,
            files: Vec::new(),
            stats: CommitStats::default(),
            patch_excerpt: String::new(),
        });
    }

    let tree = commit.tree().map_err(|e| diff_err(e.message().to_string()))?;
    let parent_tree = commit
        .parent(0)
        .and_then(|p| p.tree())
        .map_err(|e| diff_err(format!("reading parent: {}", e.message())))?;

    let mut diff_opts = DiffOptions::new();
    diff_opts
        .context_lines(3)
        .interhunk_lines(0)
        .ignore_whitespace(false);

    let mut diff = repo
        .diff_tree_to_tree(Some(&parent_tree), Some(&tree), Some(&mut diff_opts))
        .map_err(|e| diff_err(e.message().to_string()))?;
    diff.find_similar(Some(DiffFindOptions::new().renames(true)))
        .map_err(|e| diff_err(format!("rename detection: {}", e.message())))?;

    let mut files = Vec::with_capacity(diff.deltas().len());
    let mut patch_excerpt = String::new();
    let mut excerpt_truncated = false;

    for idx in 0..diff.deltas().len() {
        let Some(delta) = diff.get_delta(idx) else {
            continue;
        };
        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        let patch_text = match Patch::from_diff(&diff, idx) {
            Ok(Some(mut patch)) => patch
                .to_buf()
                .ok()
                .map(|buf| String::from_utf8_lossy(&buf).into_owned()),
            Ok(None) => None,
            Err(e) => return Err(diff_err(format!("patch for {}: {}", path, e.message()))),
        };

        let (additions, deletions) = patch_text.as_deref().map(count_hunk_lines).unwrap_or((0, 0));

        if let Some(text) = &patch_text
            && !excerpt_truncated
        {
            let remaining = limits.patch_budget_bytes.saturating_sub(patch_excerpt.len());
            if text.len() <= remaining {
                patch_excerpt.push_str(text);
            } else {
                patch_excerpt.push_str(&text[..floor_char_boundary(text, remaining)]);
                patch_excerpt.push_str(TRUNCATION_MARKER);
                excerpt_truncated = true;
                tracing::debug!("Truncated patch excerpt for commit {}", hash);
            }
        }

        files.push(FileChangeRecord {
            path,
            change_type: change_type(delta.status()),
            additions,
            deletions,
            diff: patch_text.map(|text| truncate_chars(&text, limits.max_file_diff_chars)),
        });
    }

    let stats = CommitStats::from_changes(&files);
    Ok(DiffedCommit {
        meta,
        files,
        stats,
        patch_excerpt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_repo::TestRepo;

    #[test]
    fn test_count_hunk_lines_ignores_headers() {
        let patch = "diff --git a/f b/f\n--- a/f\n+++ b/f\n@@ -1,3 +1,3 @@\n ctx\n-old\n+new\n+more\n";
        assert_eq!(count_hunk_lines(patch), (2, 1));
    }

    #[test]
    fn test_count_hunk_lines_deleted_dash_line() {
        // A removed line whose content starts with "--" is still a deletion
        let patch = "@@ -1,2 +1,1 @@\n--- not a header\n keep\n";
        assert_eq!(count_hunk_lines(patch), (0, 1));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(floor_char_boundary("héllo", 2), 1);
    }

    #[test]
    fn test_non_utf8_text_still_counts_lines() {
        let repo = TestRepo::new();
        repo.commit("main", "a.txt", "one\n", "root", 1_000);
        let latin1: &[u8] = b"caf\xe9\nna\xefve\n";
        let second = repo.commit_raw(
            "main",
            &[("latin1.txt", Some(latin1))],
            "latin-1 file",
            2_000,
            TestRepo::NAME,
            TestRepo::EMAIL,
        );

        let diffed = diff_commit(&repo.repo, &second, &DiffLimits::default()).unwrap();
        let file = &diffed.files[0];
        assert_eq!(file.path, "latin1.txt");
        assert_eq!((file.additions, file.deletions), (2, 0));
        assert!(file.diff.as_deref().is_some_and(|d| d.contains("+caf")));
        assert_eq!(diffed.stats.additions, 2);
        assert!(diffed.patch_excerpt.contains("latin1.txt"));
    }

    #[test]
    fn test_root_commit_has_empty_stats() {
        let repo = TestRepo::new();
        let root = repo.commit("main", "a.txt", "one\ntwo\n", "root", 1_000);
        let diffed = diff_commit(&repo.repo, &root, &DiffLimits::default()).unwrap();
        assert!(diffed.files.is_empty());
        assert_eq!(diffed.stats, CommitStats::default());
        assert!(diffed.patch_excerpt.is_empty());
    }

    #[test]
    fn test_add_modify_delete_counts() {
        let repo = TestRepo::new();
        repo.commit_files(
            "main",
            &[("keep.txt", Some("a\nb\nc\n")), ("gone.txt", Some("x\ny\n"))],
            "root",
            1_000,
            TestRepo::NAME,
            TestRepo::EMAIL,
        );
        let second = repo.commit_files(
            "main",
            &[
                ("keep.txt", Some("a\nB\nc\nd\n")),
                ("gone.txt", None),
                ("new.txt", Some("fresh\n")),
            ],
            "second",
            2_000,
            TestRepo::NAME,
            TestRepo::EMAIL,
        );

        let diffed = diff_commit(&repo.repo, &second, &DiffLimits::default()).unwrap();
        let by_path = |p: &str| diffed.files.iter().find(|f| f.path == p).unwrap();

        let keep = by_path("keep.txt");
        assert_eq!(keep.change_type, ChangeType::Modify);
        assert_eq!((keep.additions, keep.deletions), (2, 1));

        let gone = by_path("gone.txt");
        assert_eq!(gone.change_type, ChangeType::Delete);
        assert_eq!((gone.additions, gone.deletions), (0, 2));

        let new = by_path("new.txt");
        assert_eq!(new.change_type, ChangeType::Add);
        assert_eq!(new.additions, 1);

        assert_eq!(diffed.stats.files_changed, 3);
        assert_eq!(diffed.stats.additions, 3);
        assert_eq!(diffed.stats.deletions, 3);
        assert!(diffed.patch_excerpt.contains("+fresh"));
    }

    #[test]
    fn test_diff_limits_truncate() {
        let repo = TestRepo::new();
        repo.commit("main", "big.txt", "start\n", "root", 1_000);
        let body: String = (0..500).map(|i| format!("line {i}\n")).collect();
        let second = repo.commit("main", "big.txt", &body, "grow", 2_000);

        let limits = DiffLimits {
            max_file_diff_chars: 100,
            patch_budget_bytes: 200,
        };
        let diffed = diff_commit(&repo.repo, &second, &limits).unwrap();
        let file = &diffed.files[0];
        assert_eq!(file.diff.as_ref().unwrap().chars().count(), 100);
        // Line counts come from the full patch, not the truncated copy
        assert_eq!(file.additions, 500);
        assert!(diffed.patch_excerpt.ends_with(TRUNCATION_MARKER));
        assert!(diffed.patch_excerpt.len() <= 200 + TRUNCATION_MARKER.len());
    }
}
