//! SQLite schema definition
//!
//! Ingestion owns codebases, developers, branches, commits, file_changes and
//! branch_cursors; the worklog cache owns worklog_entries. All statements are
//! idempotent so the schema can be applied on every open.

pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- ============================================
-- REPOSITORIES & PEOPLE
-- ============================================

CREATE TABLE IF NOT EXISTS codebases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,             -- Canonical repository root
    name TEXT NOT NULL,
    default_branch TEXT NOT NULL DEFAULT '',
    summary TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS developers (
    email TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    first_seen INTEGER NOT NULL,           -- Earliest author time seen
    last_seen INTEGER NOT NULL             -- Latest author time seen
);

-- ============================================
-- BRANCHES & HISTORY
-- ============================================

CREATE TABLE IF NOT EXISTS branches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    codebase_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    base_branch TEXT NOT NULL DEFAULT '',  -- Empty for the default branch
    status TEXT NOT NULL DEFAULT 'active', -- 'active', 'deleted'
    commit_count INTEGER NOT NULL DEFAULT 0,
    first_commit_hash TEXT,
    last_commit_hash TEXT,
    updated_at INTEGER NOT NULL,
    UNIQUE(codebase_id, name),
    FOREIGN KEY(codebase_id) REFERENCES codebases(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS commits (
    codebase_id INTEGER NOT NULL,
    hash TEXT NOT NULL,
    branch_id INTEGER,
    author_name TEXT NOT NULL,
    author_email TEXT NOT NULL,
    message TEXT NOT NULL,
    summary TEXT,                          -- Only mutable column (backfill)
    committed_at INTEGER NOT NULL,         -- Author time, Unix seconds
    stats TEXT NOT NULL,                   -- JSON: {additions, deletions, files_changed}
    is_user_commit INTEGER NOT NULL DEFAULT 0,
    is_on_default_branch INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (codebase_id, hash),
    FOREIGN KEY(codebase_id) REFERENCES codebases(id) ON DELETE CASCADE,
    FOREIGN KEY(branch_id) REFERENCES branches(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS file_changes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    codebase_id INTEGER NOT NULL,
    commit_hash TEXT NOT NULL,
    path TEXT NOT NULL,
    change_type TEXT NOT NULL,             -- 'add', 'modify', 'delete', 'rename'
    additions INTEGER NOT NULL DEFAULT 0,
    deletions INTEGER NOT NULL DEFAULT 0,
    diff TEXT,                             -- Truncated unified diff
    UNIQUE(codebase_id, commit_hash, path),
    FOREIGN KEY(codebase_id, commit_hash) REFERENCES commits(codebase_id, hash) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS branch_cursors (
    codebase_id INTEGER NOT NULL,
    branch_name TEXT NOT NULL,
    last_commit_hash TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (codebase_id, branch_name),
    FOREIGN KEY(codebase_id) REFERENCES codebases(id) ON DELETE CASCADE
);

-- ============================================
-- WORKLOG CACHE
-- ============================================

CREATE TABLE IF NOT EXISTS worklog_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    codebase_id INTEGER NOT NULL,
    profile TEXT NOT NULL,
    entry_date TEXT NOT NULL,              -- YYYY-MM-DD
    branch_id INTEGER NOT NULL DEFAULT 0,  -- 0 when not tied to a branch
    entry_type TEXT NOT NULL,              -- 'day_updates', 'branch_summary', 'week_summary', 'month_summary'
    group_by TEXT NOT NULL,                -- 'date', 'branch'
    content TEXT NOT NULL,
    signature TEXT NOT NULL,
    commit_count INTEGER NOT NULL DEFAULT 0,
    additions INTEGER NOT NULL DEFAULT 0,
    deletions INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    UNIQUE(codebase_id, profile, entry_date, branch_id, entry_type, group_by),
    FOREIGN KEY(codebase_id) REFERENCES codebases(id) ON DELETE CASCADE
);

-- ============================================
-- INDEXES
-- ============================================

CREATE INDEX IF NOT EXISTS idx_commits_time ON commits(codebase_id, committed_at);
CREATE INDEX IF NOT EXISTS idx_commits_branch ON commits(branch_id);
CREATE INDEX IF NOT EXISTS idx_file_changes_commit ON file_changes(codebase_id, commit_hash);
CREATE INDEX IF NOT EXISTS idx_worklog_lookup ON worklog_entries(codebase_id, profile, entry_date);
"#;
