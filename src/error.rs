/// Centralized error types for worklog using thiserror
///
/// Low-level collaborators (git, store, language model) report through their own
/// enums; `WorklogError::severity` classifies any of them into the run/branch/recoverable
/// taxonomy the ingestion engine and worklog cache act on.
use thiserror::Error;

/// Main error type for ingestion and worklog generation
#[derive(Error, Debug)]
pub enum WorklogError {
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Language model error: {0}")]
    Llm(#[from] LlmError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Branch selection error: {0}")]
    Selection(#[from] SelectionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// How far an error reaches: the whole run, one branch, or a single item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Abort the operation entirely
    FatalToRun,
    /// Abort the current branch; other branches continue
    FatalToBranch,
    /// Log and keep going
    Recoverable,
}

/// Errors related to git operations
#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git repository not found at: {0}")]
    RepoNotFound(String),

    #[error("Failed to open git repository: {0}")]
    OpenFailed(String),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("Failed to resolve head of branch '{branch}': {reason}")]
    HeadUnresolved { branch: String, reason: String },

    #[error("Failed to read object {oid}: {reason}")]
    UnreadableObject { oid: String, reason: String },

    #[error("Failed to walk history from {start}: {reason}")]
    WalkFailed { start: String, reason: String },

    #[error("Failed to diff commit {commit}: {reason}")]
    DiffFailed { commit: String, reason: String },

    #[error("Diff worker pool failed: {0}")]
    PoolFailed(String),
}

/// Errors related to the relational store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open store at '{path}': {reason}")]
    Connection { path: String, reason: String },

    #[error("Constraint violation during {operation}: {reason}")]
    Constraint { operation: String, reason: String },

    #[error("Query failed during {operation}: {reason}")]
    Query { operation: String, reason: String },

    #[error("Failed to decode column '{column}': {reason}")]
    Decode { column: String, reason: String },

    #[error("Codebase not found: {0}")]
    CodebaseNotFound(String),

    #[error("Store lock was poisoned")]
    LockPoisoned,
}

/// Errors related to language model calls
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Language model client is not configured but summaries were requested")]
    NotConfigured,

    #[error("Language model request failed: {0}")]
    RequestFailed(String),

    #[error("Language model call for {target} timed out after {secs} seconds")]
    Timeout { target: String, secs: u64 },

    #[error("Language model returned an empty response for {0}")]
    EmptyResponse(String),
}

/// Errors related to configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
}

/// Errors related to branch selection
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Repository has no local branches")]
    NoBranches,

    #[error("Requested branches do not exist: {0}")]
    UnknownBranches(String),

    #[error("Selection is empty")]
    Empty,

    #[error("Failed to persist branch selection to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },

    #[error("Failed to load branch selections from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Branch prompt failed: {0}")]
    PromptFailed(String),
}

// Conversion from anyhow::Error to WorklogError
impl From<anyhow::Error> for WorklogError {
    fn from(err: anyhow::Error) -> Self {
        // Keep typed errors typed when they were only wrapped for context
        match err.downcast::<WorklogError>() {
            Ok(typed) => typed,
            Err(err) => WorklogError::Other(format!("{:#}", err)),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::from_sqlite("query", err)
    }
}

impl From<rusqlite::Error> for WorklogError {
    fn from(err: rusqlite::Error) -> Self {
        WorklogError::Store(err.into())
    }
}

impl StoreError {
    /// Classify a SQLite error, tagging it with the operation that produced it
    pub fn from_sqlite(operation: &str, err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint {
                    operation: operation.to_string(),
                    reason: err.to_string(),
                }
            }
            rusqlite::Error::SqliteFailure(code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::NotADatabase
                        | rusqlite::ErrorCode::DatabaseCorrupt
                ) =>
            {
                StoreError::Connection {
                    path: String::new(),
                    reason: err.to_string(),
                }
            }
            _ => StoreError::Query {
                operation: operation.to_string(),
                reason: err.to_string(),
            },
        }
    }
}

// Helper methods for WorklogError
impl WorklogError {
    /// Create a new error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        WorklogError::Other(msg.into())
    }

    /// Classify this error into the run/branch/recoverable taxonomy
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WorklogError::Git(GitError::RepoNotFound(_) | GitError::OpenFailed(_)) => {
                ErrorSeverity::FatalToRun
            }
            WorklogError::Git(_) => ErrorSeverity::FatalToBranch,
            WorklogError::Store(StoreError::Constraint { .. }) => ErrorSeverity::Recoverable,
            WorklogError::Store(_) => ErrorSeverity::FatalToRun,
            WorklogError::Llm(_) => ErrorSeverity::FatalToRun,
            WorklogError::Config(_) => ErrorSeverity::FatalToRun,
            WorklogError::Selection(
                SelectionError::SaveFailed { .. } | SelectionError::LoadFailed { .. },
            ) => ErrorSeverity::Recoverable,
            WorklogError::Selection(_) => ErrorSeverity::FatalToRun,
            WorklogError::Io(_) => ErrorSeverity::FatalToRun,
            WorklogError::Other(_) => ErrorSeverity::FatalToBranch,
        }
    }

    /// Whether the caller should abort the whole run
    pub fn is_fatal_to_run(&self) -> bool {
        self.severity() == ErrorSeverity::FatalToRun
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorklogError::Git(GitError::BranchNotFound("feature/x".to_string()));
        assert_eq!(err.to_string(), "Git error: Branch not found: feature/x");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WorklogError = io_err.into();
        assert!(matches!(err, WorklogError::Io(_)));
    }

    #[test]
    fn test_error_from_anyhow_keeps_context() {
        let anyhow_err = anyhow::anyhow!("inner").context("outer");
        let err: WorklogError = anyhow_err.into();
        match err {
            WorklogError::Other(msg) => assert_eq!(msg, "outer: inner"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_error_from_anyhow_recovers_typed_error() {
        let typed = WorklogError::Llm(LlmError::NotConfigured);
        let wrapped: anyhow::Error = typed.into();
        let err: WorklogError = wrapped.into();
        assert!(matches!(err, WorklogError::Llm(LlmError::NotConfigured)));
    }

    #[test]
    fn test_severity_taxonomy() {
        let open = WorklogError::Git(GitError::OpenFailed("/nope".into()));
        assert_eq!(open.severity(), ErrorSeverity::FatalToRun);

        let head = WorklogError::Git(GitError::HeadUnresolved {
            branch: "gone".into(),
            reason: "missing".into(),
        });
        assert_eq!(head.severity(), ErrorSeverity::FatalToBranch);

        let constraint = WorklogError::Store(StoreError::Constraint {
            operation: "insert commit".into(),
            reason: "UNIQUE".into(),
        });
        assert_eq!(constraint.severity(), ErrorSeverity::Recoverable);

        let conn = WorklogError::Store(StoreError::Connection {
            path: "/tmp/x.db".into(),
            reason: "denied".into(),
        });
        assert!(conn.is_fatal_to_run());

        let timeout = WorklogError::Llm(LlmError::Timeout {
            target: "commit abc1234".into(),
            secs: 30,
        });
        assert!(timeout.is_fatal_to_run());

        let unreadable = WorklogError::Selection(SelectionError::LoadFailed {
            path: "/tmp/selections.json".into(),
            reason: "expected value".into(),
        });
        assert_eq!(unreadable.severity(), ErrorSeverity::Recoverable);
    }

    #[test]
    fn test_llm_timeout_display() {
        let err = LlmError::Timeout {
            target: "week 2024-01-01".to_string(),
            secs: 120,
        };
        assert_eq!(
            err.to_string(),
            "Language model call for week 2024-01-01 timed out after 120 seconds"
        );
    }

    #[test]
    fn test_config_error_invalid_value() {
        let err = ConfigError::InvalidValue {
            key: "ingest.max_file_diff_chars".to_string(),
            reason: "must be greater than 0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for 'ingest.max_file_diff_chars': must be greater than 0"
        );
    }

    #[test]
    fn test_sqlite_constraint_classification() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t VALUES (1);")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err();
        let store_err = StoreError::from_sqlite("insert t", err);
        assert!(matches!(store_err, StoreError::Constraint { .. }));
    }
}
