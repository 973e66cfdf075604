/// Configuration system for worklog
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, WorklogError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Relational store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Local developer identity used to flag user commits
    #[serde(default)]
    pub identity: IdentityConfig,

    /// History ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Worklog generation configuration
    #[serde(default)]
    pub worklog: WorklogConfig,

    /// Branch selection persistence
    #[serde(default)]
    pub selection: SelectionConfig,
}

/// Relational store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

/// Local developer identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Email matched exactly against commit author emails
    #[serde(default)]
    pub email: Option<String>,

    /// GitHub handle matched against `users.noreply.github.com` author emails
    #[serde(default)]
    pub github_handle: Option<String>,

    /// Worklog profile name; cache entries are partitioned by it
    #[serde(default = "default_profile")]
    pub profile: String,
}

/// History ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Diff worker threads; 0 sizes the pool to available parallelism
    #[serde(default)]
    pub workers: usize,

    /// Maximum characters of unified diff kept per file change
    #[serde(default = "default_max_file_diff_chars")]
    pub max_file_diff_chars: usize,

    /// Byte budget of the combined patch excerpt handed to the summarizer
    #[serde(default = "default_patch_budget_bytes")]
    pub patch_budget_bytes: usize,

    /// Generate a one-paragraph summary for each new user commit
    #[serde(default = "default_generate_summaries")]
    pub generate_summaries: bool,

    /// Timeout for a single commit summary call
    #[serde(default = "default_commit_summary_timeout")]
    pub commit_summary_timeout_secs: u64,
}

/// Worklog generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorklogConfig {
    /// Only include commits authored by the configured identity
    #[serde(default = "default_only_user_commits")]
    pub only_user_commits: bool,

    /// Timeout for day sections, week and month summaries
    #[serde(default = "default_summary_timeout")]
    pub summary_timeout_secs: u64,

    /// Timeout for per-branch summaries
    #[serde(default = "default_branch_summary_timeout")]
    pub branch_summary_timeout_secs: u64,

    /// Identifier of the summarizer folded into cache signatures
    #[serde(default)]
    pub summarizer: Option<String>,
}

/// Branch selection persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// JSON file holding saved per-repository selections
    #[serde(default = "default_selection_path")]
    pub path: PathBuf,
}

// Default value functions
fn default_db_path() -> PathBuf {
    crate::paths::PlatformPaths::default_db_path()
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_max_file_diff_chars() -> usize {
    10_000
}

fn default_patch_budget_bytes() -> usize {
    8_000
}

fn default_generate_summaries() -> bool {
    true
}

fn default_commit_summary_timeout() -> u64 {
    30
}

fn default_only_user_commits() -> bool {
    true
}

fn default_summary_timeout() -> u64 {
    120
}

fn default_branch_summary_timeout() -> u64 {
    30
}

fn default_selection_path() -> PathBuf {
    crate::paths::PlatformPaths::default_selection_path()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            email: None,
            github_handle: None,
            profile: default_profile(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_file_diff_chars: default_max_file_diff_chars(),
            patch_budget_bytes: default_patch_budget_bytes(),
            generate_summaries: default_generate_summaries(),
            commit_summary_timeout_secs: default_commit_summary_timeout(),
        }
    }
}

impl Default for WorklogConfig {
    fn default() -> Self {
        Self {
            only_user_commits: default_only_user_commits(),
            summary_timeout_secs: default_summary_timeout(),
            branch_summary_timeout_secs: default_branch_summary_timeout(),
            summarizer: None,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            path: default_selection_path(),
        }
    }
}

impl IngestConfig {
    /// Worker count with 0 resolved to the machine's available parallelism
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, WorklogError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, WorklogError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), WorklogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), WorklogError> {
        fn positive(key: &str, value: u64) -> Result<(), WorklogError> {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    reason: "must be greater than 0".to_string(),
                }
                .into());
            }
            Ok(())
        }

        positive(
            "ingest.max_file_diff_chars",
            self.ingest.max_file_diff_chars as u64,
        )?;
        positive(
            "ingest.patch_budget_bytes",
            self.ingest.patch_budget_bytes as u64,
        )?;
        positive(
            "ingest.commit_summary_timeout_secs",
            self.ingest.commit_summary_timeout_secs,
        )?;
        positive(
            "worklog.summary_timeout_secs",
            self.worklog.summary_timeout_secs,
        )?;
        positive(
            "worklog.branch_summary_timeout_secs",
            self.worklog.branch_summary_timeout_secs,
        )?;

        if self.identity.profile.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "identity.profile".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        if let Some(email) = &self.identity.email
            && !email.contains('@')
        {
            return Err(ConfigError::InvalidValue {
                key: "identity.email".to_string(),
                reason: format!("'{}' is not an email address", email),
            }
            .into());
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("WORKLOG_DB_PATH") {
            self.store.db_path = PathBuf::from(path);
        }

        if let Some(email) = lookup("WORKLOG_USER_EMAIL") {
            self.identity.email = Some(email);
        }

        if let Some(handle) = lookup("WORKLOG_GITHUB_HANDLE") {
            self.identity.github_handle = Some(handle);
        }

        if let Some(profile) = lookup("WORKLOG_PROFILE") {
            self.identity.profile = profile;
        }

        if let Some(workers) = lookup("WORKLOG_WORKERS")
            && let Ok(n) = workers.parse()
        {
            self.ingest.workers = n;
        }

        if let Some(flag) = lookup("WORKLOG_SUMMARIES") {
            match flag.to_ascii_lowercase().as_str() {
                "0" | "false" | "off" | "no" => self.ingest.generate_summaries = false,
                "1" | "true" | "on" | "yes" => self.ingest.generate_summaries = true,
                other => tracing::warn!("Ignoring WORKLOG_SUMMARIES={}", other),
            }
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, WorklogError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests;
