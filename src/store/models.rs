//! Typed rows for every table in the store

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codebase {
    pub id: i64,
    /// Canonical repository root path
    pub path: String,
    /// Display name, usually the directory name
    pub name: String,
    /// Authoritative branch name, empty until detected
    pub default_branch: String,
    /// Optional free-text description used as context for summaries
    pub summary: Option<String>,
}

/// A commit author seen during ingestion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Developer {
    pub email: String,
    pub name: String,
    /// Earliest author time seen, Unix seconds
    pub first_seen: i64,
    /// Latest author time seen, Unix seconds
    pub last_seen: i64,
}

/// Lifecycle status of a tracked branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    Active,
    /// The branch head no longer exists in the repository
    Deleted,
}

impl BranchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BranchStatus::Active => "active",
            BranchStatus::Deleted => "deleted",
        }
    }
}

impl FromStr for BranchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(BranchStatus::Active),
            "deleted" => Ok(BranchStatus::Deleted),
            other => Err(format!("unknown branch status '{}'", other)),
        }
    }
}

/// Per-codebase branch record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRecord {
    pub id: i64,
    pub codebase_id: i64,
    pub name: String,
    pub is_default: bool,
    /// Branch this one was forked from; empty for the default branch
    pub base_branch: String,
    pub status: BranchStatus,
    pub commit_count: i64,
    pub first_commit_hash: Option<String>,
    pub last_commit_hash: Option<String>,
    /// Unix seconds
    pub updated_at: i64,
}

/// Aggregate line statistics of one commit
///
/// Serialized as JSON only at the store boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStats {
    pub additions: u64,
    pub deletions: u64,
    pub files_changed: u64,
}

impl CommitStats {
    /// Fold file-level counts into commit totals
    pub fn from_changes<'a>(changes: impl IntoIterator<Item = &'a FileChangeRecord>) -> Self {
        changes
            .into_iter()
            .fold(CommitStats::default(), |mut acc, change| {
                acc.additions += change.additions;
                acc.deletions += change.deletions;
                acc.files_changed += 1;
                acc
            })
    }
}

/// An ingested commit
///
/// Immutable once inserted except for `summary`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub codebase_id: i64,
    pub hash: String,
    pub branch_id: Option<i64>,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    pub summary: Option<String>,
    /// Author time, Unix seconds
    pub timestamp: i64,
    pub stats: CommitStats,
    pub is_user_commit: bool,
    pub is_on_default_branch: bool,
}

impl CommitRecord {
    /// First line of the commit message
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }

    /// Abbreviated hash for display and log context
    pub fn short_hash(&self) -> &str {
        short_hash(&self.hash)
    }
}

/// First seven characters of a hash (or the whole string if shorter)
pub fn short_hash(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}

/// Kind of change applied to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
    Rename,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Add => "add",
            ChangeType::Modify => "modify",
            ChangeType::Delete => "delete",
            ChangeType::Rename => "rename",
        }
    }
}

impl FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(ChangeType::Add),
            "modify" => Ok(ChangeType::Modify),
            "delete" => Ok(ChangeType::Delete),
            "rename" => Ok(ChangeType::Rename),
            other => Err(format!("unknown change type '{}'", other)),
        }
    }
}

/// One file touched by a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeRecord {
    pub path: String,
    pub change_type: ChangeType,
    pub additions: u64,
    pub deletions: u64,
    /// Unified diff, truncated to the configured cap
    pub diff: Option<String>,
}

/// Granularity of a cached worklog unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    DayUpdates,
    BranchSummary,
    WeekSummary,
    MonthSummary,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::DayUpdates => "day_updates",
            EntryType::BranchSummary => "branch_summary",
            EntryType::WeekSummary => "week_summary",
            EntryType::MonthSummary => "month_summary",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day_updates" => Ok(EntryType::DayUpdates),
            "branch_summary" => Ok(EntryType::BranchSummary),
            "week_summary" => Ok(EntryType::WeekSummary),
            "month_summary" => Ok(EntryType::MonthSummary),
            other => Err(format!("unknown entry type '{}'", other)),
        }
    }
}

/// Whether commits are organised primarily by date or by branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    Date,
    Branch,
}

impl GroupBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::Date => "date",
            GroupBy::Branch => "branch",
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(GroupBy::Date),
            "branch" => Ok(GroupBy::Branch),
            other => Err(format!("unknown group-by mode '{}'", other)),
        }
    }
}

/// Identity of a cached worklog entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorklogKey {
    pub codebase_id: i64,
    pub profile: String,
    pub entry_date: NaiveDate,
    /// `None` for entries not tied to a branch
    pub branch_id: Option<i64>,
    pub entry_type: EntryType,
    pub group_by: GroupBy,
}

/// A cached, rendered worklog unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorklogEntry {
    pub key: WorklogKey,
    pub content: String,
    pub signature: String,
    pub commit_count: i64,
    pub additions: i64,
    pub deletions: i64,
    /// Unix seconds
    pub created_at: i64,
}
