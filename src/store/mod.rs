//! Relational store backed by SQLite
//!
//! Every entity is addressed by its identity and written through idempotent
//! upserts, so ingestion and the worklog cache can share one database without
//! coordinating: each identity has exactly one logical writer.

mod models;
mod schema;

pub use models::*;
pub use schema::SCHEMA;

use crate::error::StoreError;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

type StoreResult<T> = Result<T, StoreError>;

/// SQLite-backed store for codebases, commits, cursors and worklog entries
pub struct Store {
    conn: Mutex<Connection>,
    location: String,
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Wrap a row-decoding failure so it surfaces as a conversion error
fn decode_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn with_op<T>(operation: &str, result: rusqlite::Result<T>) -> StoreResult<T> {
    result.map_err(|e| StoreError::from_sqlite(operation, e))
}

const CODEBASE_COLUMNS: &str = "id, path, name, default_branch, summary";
const BRANCH_COLUMNS: &str = "id, codebase_id, name, is_default, base_branch, status, \
     commit_count, first_commit_hash, last_commit_hash, updated_at";
const COMMIT_COLUMNS: &str = "codebase_id, hash, branch_id, author_name, author_email, message, \
     summary, committed_at, stats, is_user_commit, is_on_default_branch";
const ENTRY_COLUMNS: &str = "codebase_id, profile, entry_date, branch_id, entry_type, group_by, \
     content, signature, commit_count, additions, deletions, created_at";

fn codebase_from_row(row: &Row<'_>) -> rusqlite::Result<Codebase> {
    Ok(Codebase {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        default_branch: row.get(3)?,
        summary: row.get(4)?,
    })
}

fn branch_from_row(row: &Row<'_>) -> rusqlite::Result<BranchRecord> {
    let status: String = row.get(5)?;
    Ok(BranchRecord {
        id: row.get(0)?,
        codebase_id: row.get(1)?,
        name: row.get(2)?,
        is_default: row.get(3)?,
        base_branch: row.get(4)?,
        status: status.parse().map_err(|e| decode_err(5, e))?,
        commit_count: row.get(6)?,
        first_commit_hash: row.get(7)?,
        last_commit_hash: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn commit_from_row(row: &Row<'_>) -> rusqlite::Result<CommitRecord> {
    let stats_json: String = row.get(8)?;
    let stats: CommitStats =
        serde_json::from_str(&stats_json).map_err(|e| decode_err(8, e.to_string()))?;
    Ok(CommitRecord {
        codebase_id: row.get(0)?,
        hash: row.get(1)?,
        branch_id: row.get(2)?,
        author_name: row.get(3)?,
        author_email: row.get(4)?,
        message: row.get(5)?,
        summary: row.get(6)?,
        timestamp: row.get(7)?,
        stats,
        is_user_commit: row.get(9)?,
        is_on_default_branch: row.get(10)?,
    })
}

fn file_change_from_row(row: &Row<'_>) -> rusqlite::Result<FileChangeRecord> {
    let change_type: String = row.get(1)?;
    let additions: i64 = row.get(2)?;
    let deletions: i64 = row.get(3)?;
    Ok(FileChangeRecord {
        path: row.get(0)?,
        change_type: change_type.parse().map_err(|e| decode_err(1, e))?,
        additions: additions.max(0) as u64,
        deletions: deletions.max(0) as u64,
        diff: row.get(4)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<WorklogEntry> {
    let date: String = row.get(2)?;
    let branch_id: i64 = row.get(3)?;
    let entry_type: String = row.get(4)?;
    let group_by: String = row.get(5)?;
    Ok(WorklogEntry {
        key: WorklogKey {
            codebase_id: row.get(0)?,
            profile: row.get(1)?,
            entry_date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|e| decode_err(2, e.to_string()))?,
            branch_id: (branch_id != 0).then_some(branch_id),
            entry_type: entry_type.parse().map_err(|e| decode_err(4, e))?,
            group_by: group_by.parse().map_err(|e| decode_err(5, e))?,
        },
        content: row.get(6)?,
        signature: row.get(7)?,
        commit_count: row.get(8)?,
        additions: row.get(9)?,
        deletions: row.get(10)?,
        created_at: row.get(11)?,
    })
}

impl Store {
    /// Open (or create) the store at `path` and apply the schema
    pub fn open(path: &Path) -> StoreResult<Self> {
        let location = path.display().to_string();
        let connection_err = |reason: String| StoreError::Connection {
            path: location.clone(),
            reason,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| connection_err(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|e| connection_err(e.to_string()))?;
        Self::init(conn, location.clone()).map_err(|e| match e {
            StoreError::Connection { reason, .. } => connection_err(reason),
            other => other,
        })
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Connection {
            path: ":memory:".to_string(),
            reason: e.to_string(),
        })?;
        Self::init(conn, ":memory:".to_string())
    }

    fn init(conn: Connection, location: String) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Connection {
                path: location.clone(),
                reason: format!("failed to apply schema: {}", e),
            })?;
        tracing::debug!("Store ready at {}", location);
        Ok(Self {
            conn: Mutex::new(conn),
            location,
        })
    }

    /// Where this store lives (file path or `:memory:`)
    pub fn location(&self) -> &str {
        &self.location
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    // ============================================
    // CODEBASES
    // ============================================

    /// Register a repository path, or return the existing record
    pub fn upsert_codebase(&self, path: &str, name: &str) -> StoreResult<Codebase> {
        let conn = self.conn()?;
        let now = now_secs();
        with_op(
            "upsert codebase",
            conn.execute(
                "INSERT INTO codebases (path, name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(path) DO UPDATE SET name = excluded.name",
                params![path, name, now],
            ),
        )?;
        with_op(
            "load codebase",
            conn.query_row(
                &format!("SELECT {CODEBASE_COLUMNS} FROM codebases WHERE path = ?1"),
                params![path],
                codebase_from_row,
            ),
        )
    }

    pub fn get_codebase(&self, id: i64) -> StoreResult<Option<Codebase>> {
        let conn = self.conn()?;
        with_op(
            "get codebase",
            conn.query_row(
                &format!("SELECT {CODEBASE_COLUMNS} FROM codebases WHERE id = ?1"),
                params![id],
                codebase_from_row,
            )
            .optional(),
        )
    }

    pub fn get_codebase_by_path(&self, path: &str) -> StoreResult<Option<Codebase>> {
        let conn = self.conn()?;
        with_op(
            "get codebase by path",
            conn.query_row(
                &format!("SELECT {CODEBASE_COLUMNS} FROM codebases WHERE path = ?1"),
                params![path],
                codebase_from_row,
            )
            .optional(),
        )
    }

    /// Set the free-text description handed to summarizers as context
    pub fn set_codebase_summary(&self, id: i64, summary: Option<&str>) -> StoreResult<()> {
        let conn = self.conn()?;
        with_op(
            "set codebase summary",
            conn.execute(
                "UPDATE codebases SET summary = ?1, updated_at = ?2 WHERE id = ?3",
                params![summary, now_secs(), id],
            ),
        )?;
        Ok(())
    }

    // ============================================
    // DEVELOPERS
    // ============================================

    /// Record an author, widening the first/last seen window
    pub fn upsert_developer(&self, email: &str, name: &str, seen_at: i64) -> StoreResult<()> {
        let conn = self.conn()?;
        with_op(
            "upsert developer",
            conn.execute(
                "INSERT INTO developers (email, name, first_seen, last_seen)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(email) DO UPDATE SET
                    name = CASE WHEN excluded.last_seen >= developers.last_seen
                                THEN excluded.name ELSE developers.name END,
                    first_seen = MIN(developers.first_seen, excluded.first_seen),
                    last_seen = MAX(developers.last_seen, excluded.last_seen)",
                params![email, name, seen_at],
            ),
        )?;
        Ok(())
    }

    pub fn get_developer(&self, email: &str) -> StoreResult<Option<Developer>> {
        let conn = self.conn()?;
        with_op(
            "get developer",
            conn.query_row(
                "SELECT email, name, first_seen, last_seen FROM developers WHERE email = ?1",
                params![email],
                |row| {
                    Ok(Developer {
                        email: row.get(0)?,
                        name: row.get(1)?,
                        first_seen: row.get(2)?,
                        last_seen: row.get(3)?,
                    })
                },
            )
            .optional(),
        )
    }

    // ============================================
    // BRANCHES
    // ============================================

    /// Create the branch record on first sight; existing records keep their flags
    pub fn ensure_branch(
        &self,
        codebase_id: i64,
        name: &str,
        base_branch: &str,
    ) -> StoreResult<BranchRecord> {
        let conn = self.conn()?;
        with_op(
            "ensure branch",
            conn.execute(
                "INSERT INTO branches (codebase_id, name, base_branch, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(codebase_id, name) DO UPDATE SET
                    base_branch = CASE WHEN branches.is_default = 1 THEN ''
                                       ELSE excluded.base_branch END,
                    status = 'active'",
                params![codebase_id, name, base_branch, now_secs()],
            ),
        )?;
        with_op(
            "load branch",
            conn.query_row(
                &format!(
                    "SELECT {BRANCH_COLUMNS} FROM branches WHERE codebase_id = ?1 AND name = ?2"
                ),
                params![codebase_id, name],
                branch_from_row,
            ),
        )
    }

    pub fn get_branch(&self, codebase_id: i64, name: &str) -> StoreResult<Option<BranchRecord>> {
        let conn = self.conn()?;
        with_op(
            "get branch",
            conn.query_row(
                &format!(
                    "SELECT {BRANCH_COLUMNS} FROM branches WHERE codebase_id = ?1 AND name = ?2"
                ),
                params![codebase_id, name],
                branch_from_row,
            )
            .optional(),
        )
    }

    pub fn list_branches(&self, codebase_id: i64) -> StoreResult<Vec<BranchRecord>> {
        let conn = self.conn()?;
        let mut stmt = with_op(
            "list branches",
            conn.prepare(&format!(
                "SELECT {BRANCH_COLUMNS} FROM branches WHERE codebase_id = ?1 ORDER BY name"
            )),
        )?;
        let rows = with_op(
            "list branches",
            stmt.query_map(params![codebase_id], branch_from_row)
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>()),
        )?;
        Ok(rows)
    }

    /// Make `name` the only default branch of the codebase
    pub fn set_default_branch(&self, codebase_id: i64, name: &str) -> StoreResult<BranchRecord> {
        let mut conn = self.conn()?;
        let now = now_secs();
        let tx = with_op("set default branch", conn.transaction())?;
        with_op(
            "clear default flags",
            tx.execute(
                "UPDATE branches SET is_default = 0 WHERE codebase_id = ?1 AND name != ?2",
                params![codebase_id, name],
            ),
        )?;
        with_op(
            "flag default branch",
            tx.execute(
                "INSERT INTO branches (codebase_id, name, is_default, base_branch, updated_at)
                 VALUES (?1, ?2, 1, '', ?3)
                 ON CONFLICT(codebase_id, name) DO UPDATE SET
                    is_default = 1, base_branch = '', updated_at = excluded.updated_at",
                params![codebase_id, name, now],
            ),
        )?;
        with_op(
            "update codebase default",
            tx.execute(
                "UPDATE codebases SET default_branch = ?1, updated_at = ?2 WHERE id = ?3",
                params![name, now, codebase_id],
            ),
        )?;
        let branch = with_op(
            "load default branch",
            tx.query_row(
                &format!(
                    "SELECT {BRANCH_COLUMNS} FROM branches WHERE codebase_id = ?1 AND name = ?2"
                ),
                params![codebase_id, name],
                branch_from_row,
            ),
        )?;
        with_op("commit default branch", tx.commit())?;
        Ok(branch)
    }

    /// Recompute commit count and first/last hashes from stored commits
    pub fn refresh_branch_metadata(&self, branch_id: i64) -> StoreResult<BranchRecord> {
        let conn = self.conn()?;
        with_op(
            "refresh branch metadata",
            conn.execute(
                "UPDATE branches SET
                    commit_count = (SELECT COUNT(*) FROM commits WHERE branch_id = ?1),
                    first_commit_hash = (SELECT hash FROM commits WHERE branch_id = ?1
                                         ORDER BY committed_at ASC, hash ASC LIMIT 1),
                    last_commit_hash = (SELECT hash FROM commits WHERE branch_id = ?1
                                        ORDER BY committed_at DESC, hash DESC LIMIT 1),
                    updated_at = ?2
                 WHERE id = ?1",
                params![branch_id, now_secs()],
            ),
        )?;
        with_op(
            "load branch",
            conn.query_row(
                &format!("SELECT {BRANCH_COLUMNS} FROM branches WHERE id = ?1"),
                params![branch_id],
                branch_from_row,
            ),
        )
    }

    pub fn set_branch_status(&self, branch_id: i64, status: BranchStatus) -> StoreResult<()> {
        let conn = self.conn()?;
        with_op(
            "set branch status",
            conn.execute(
                "UPDATE branches SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now_secs(), branch_id],
            ),
        )?;
        Ok(())
    }

    // ============================================
    // COMMITS
    // ============================================

    pub fn commit_exists(&self, codebase_id: i64, hash: &str) -> StoreResult<bool> {
        let conn = self.conn()?;
        with_op(
            "check commit",
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM commits WHERE codebase_id = ?1 AND hash = ?2)",
                params![codebase_id, hash],
                |row| row.get(0),
            ),
        )
    }

    /// Insert a new commit; a duplicate hash is a constraint violation
    pub fn insert_commit(&self, commit: &CommitRecord) -> StoreResult<()> {
        let stats = serde_json::to_string(&commit.stats).map_err(|e| StoreError::Decode {
            column: "stats".to_string(),
            reason: e.to_string(),
        })?;
        let conn = self.conn()?;
        with_op(
            "insert commit",
            conn.execute(
                &format!("INSERT INTO commits ({COMMIT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
                params![
                    commit.codebase_id,
                    commit.hash,
                    commit.branch_id,
                    commit.author_name,
                    commit.author_email,
                    commit.message,
                    commit.summary,
                    commit.timestamp,
                    stats,
                    commit.is_user_commit,
                    commit.is_on_default_branch,
                ],
            ),
        )?;
        Ok(())
    }

    pub fn get_commit(&self, codebase_id: i64, hash: &str) -> StoreResult<Option<CommitRecord>> {
        let conn = self.conn()?;
        with_op(
            "get commit",
            conn.query_row(
                &format!("SELECT {COMMIT_COLUMNS} FROM commits WHERE codebase_id = ?1 AND hash = ?2"),
                params![codebase_id, hash],
                commit_from_row,
            )
            .optional(),
        )
    }

    /// Backfill the summary of an existing commit
    pub fn update_commit_summary(
        &self,
        codebase_id: i64,
        hash: &str,
        summary: &str,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let updated = with_op(
            "update commit summary",
            conn.execute(
                "UPDATE commits SET summary = ?1 WHERE codebase_id = ?2 AND hash = ?3",
                params![summary, codebase_id, hash],
            ),
        )?;
        Ok(updated > 0)
    }

    fn query_commits(
        &self,
        operation: &str,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> StoreResult<Vec<CommitRecord>> {
        let conn = self.conn()?;
        let mut stmt = with_op(
            operation,
            conn.prepare(&format!(
                "SELECT {COMMIT_COLUMNS} FROM commits WHERE {where_clause}"
            )),
        )?;
        with_op(
            operation,
            stmt.query_map(params, commit_from_row)
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>()),
        )
    }

    /// Commits attributed to a branch, newest first
    pub fn commits_for_branch(&self, branch_id: i64) -> StoreResult<Vec<CommitRecord>> {
        self.query_commits(
            "commits for branch",
            "branch_id = ?1 ORDER BY committed_at DESC, hash DESC",
            &[&branch_id],
        )
    }

    /// Commits whose author time falls in `[start, end)`, oldest first
    pub fn commits_in_range(
        &self,
        codebase_id: i64,
        start: i64,
        end: i64,
        only_user: bool,
    ) -> StoreResult<Vec<CommitRecord>> {
        let user_filter = if only_user { " AND is_user_commit = 1" } else { "" };
        self.query_commits(
            "commits in range",
            &format!(
                "codebase_id = ?1 AND committed_at >= ?2 AND committed_at < ?3{user_filter} \
                 ORDER BY committed_at ASC, hash ASC"
            ),
            &[&codebase_id, &start, &end],
        )
    }

    /// User commits that still lack a generated summary, newest first
    pub fn commits_missing_summary(
        &self,
        codebase_id: i64,
        limit: usize,
    ) -> StoreResult<Vec<CommitRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_commits(
            "commits missing summary",
            "codebase_id = ?1 AND is_user_commit = 1 AND (summary IS NULL OR summary = '') \
             ORDER BY committed_at DESC LIMIT ?2",
            &[&codebase_id, &limit],
        )
    }

    // ============================================
    // FILE CHANGES
    // ============================================

    pub fn insert_file_change(
        &self,
        codebase_id: i64,
        commit_hash: &str,
        change: &FileChangeRecord,
    ) -> StoreResult<()> {
        let conn = self.conn()?;
        with_op(
            "insert file change",
            conn.execute(
                "INSERT INTO file_changes
                    (codebase_id, commit_hash, path, change_type, additions, deletions, diff)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    codebase_id,
                    commit_hash,
                    change.path,
                    change.change_type.as_str(),
                    change.additions as i64,
                    change.deletions as i64,
                    change.diff,
                ],
            ),
        )?;
        Ok(())
    }

    pub fn list_file_changes(
        &self,
        codebase_id: i64,
        commit_hash: &str,
    ) -> StoreResult<Vec<FileChangeRecord>> {
        let conn = self.conn()?;
        let mut stmt = with_op(
            "list file changes",
            conn.prepare(
                "SELECT path, change_type, additions, deletions, diff FROM file_changes
                 WHERE codebase_id = ?1 AND commit_hash = ?2 ORDER BY path",
            ),
        )?;
        with_op(
            "list file changes",
            stmt.query_map(params![codebase_id, commit_hash], file_change_from_row)
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>()),
        )
    }

    // ============================================
    // BRANCH CURSORS
    // ============================================

    pub fn get_cursor(&self, codebase_id: i64, branch: &str) -> StoreResult<Option<String>> {
        let conn = self.conn()?;
        with_op(
            "get cursor",
            conn.query_row(
                "SELECT last_commit_hash FROM branch_cursors
                 WHERE codebase_id = ?1 AND branch_name = ?2",
                params![codebase_id, branch],
                |row| row.get(0),
            )
            .optional(),
        )
    }

    pub fn set_cursor(&self, codebase_id: i64, branch: &str, hash: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        with_op(
            "set cursor",
            conn.execute(
                "INSERT INTO branch_cursors (codebase_id, branch_name, last_commit_hash, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(codebase_id, branch_name) DO UPDATE SET
                    last_commit_hash = excluded.last_commit_hash,
                    updated_at = excluded.updated_at",
                params![codebase_id, branch, hash, now_secs()],
            ),
        )?;
        Ok(())
    }

    // ============================================
    // WORKLOG ENTRIES
    // ============================================

    pub fn get_worklog_entry(&self, key: &WorklogKey) -> StoreResult<Option<WorklogEntry>> {
        let conn = self.conn()?;
        with_op(
            "get worklog entry",
            conn.query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM worklog_entries
                     WHERE codebase_id = ?1 AND profile = ?2 AND entry_date = ?3
                       AND branch_id = ?4 AND entry_type = ?5 AND group_by = ?6"
                ),
                params![
                    key.codebase_id,
                    key.profile,
                    key.entry_date.to_string(),
                    key.branch_id.unwrap_or(0),
                    key.entry_type.as_str(),
                    key.group_by.as_str(),
                ],
                entry_from_row,
            )
            .optional(),
        )
    }

    /// Replace content, signature and stats of an entry, keeping its identity
    pub fn upsert_worklog_entry(&self, entry: &WorklogEntry) -> StoreResult<()> {
        let conn = self.conn()?;
        let key = &entry.key;
        with_op(
            "upsert worklog entry",
            conn.execute(
                &format!(
                    "INSERT INTO worklog_entries ({ENTRY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                     ON CONFLICT(codebase_id, profile, entry_date, branch_id, entry_type, group_by)
                     DO UPDATE SET
                        content = excluded.content,
                        signature = excluded.signature,
                        commit_count = excluded.commit_count,
                        additions = excluded.additions,
                        deletions = excluded.deletions,
                        created_at = excluded.created_at"
                ),
                params![
                    key.codebase_id,
                    key.profile,
                    key.entry_date.to_string(),
                    key.branch_id.unwrap_or(0),
                    key.entry_type.as_str(),
                    key.group_by.as_str(),
                    entry.content,
                    entry.signature,
                    entry.commit_count,
                    entry.additions,
                    entry.deletions,
                    entry.created_at,
                ],
            ),
        )?;
        Ok(())
    }

    /// Cached entries with `start <= entry_date <= end`, for read-only consumers
    pub fn list_worklog_entries(
        &self,
        codebase_id: i64,
        profile: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<Vec<WorklogEntry>> {
        let conn = self.conn()?;
        let mut stmt = with_op(
            "list worklog entries",
            conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM worklog_entries
                 WHERE codebase_id = ?1 AND profile = ?2 AND entry_date >= ?3 AND entry_date <= ?4
                 ORDER BY entry_date ASC, entry_type ASC, branch_id ASC"
            )),
        )?;
        with_op(
            "list worklog entries",
            stmt.query_map(
                params![codebase_id, profile, start.to_string(), end.to_string()],
                entry_from_row,
            )
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>()),
        )
    }

    /// Run raw SQL, used by tests to drop tables or install failing triggers
    #[cfg(test)]
    pub(crate) fn execute_for_tests(&self, sql: &str) {
        if let Ok(conn) = self.conn() {
            conn.execute_batch(sql).unwrap();
        }
    }
}
