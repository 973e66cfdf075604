/// Platform-specific locations for the store, configuration and saved selections
///
/// Follows the XDG Base Directory specification on Linux, the Library folders on macOS
/// and the AppData folders on Windows.
use std::path::PathBuf;

/// Directory name shared by every worklog location
const APP_DIR: &str = "worklog";

/// Which base directory family to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseDir {
    Data,
    Config,
}

/// Platform-agnostic path utilities
pub struct PlatformPaths;

impl PlatformPaths {
    /// Resolve a base directory from an environment lookup
    ///
    /// Kept separate from `std::env` so the resolution order can be tested without
    /// mutating process state.
    fn resolve(kind: BaseDir, lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
        let home = || lookup("HOME").map(PathBuf::from);

        let resolved = if cfg!(target_os = "windows") {
            match kind {
                BaseDir::Data => lookup("LOCALAPPDATA"),
                BaseDir::Config => lookup("APPDATA"),
            }
            .map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            home().map(|h| h.join("Library/Application Support"))
        } else {
            match kind {
                BaseDir::Data => lookup("XDG_DATA_HOME")
                    .map(PathBuf::from)
                    .or_else(|| home().map(|h| h.join(".local/share"))),
                BaseDir::Config => lookup("XDG_CONFIG_HOME")
                    .map(PathBuf::from)
                    .or_else(|| home().map(|h| h.join(".config"))),
            }
        };

        resolved.unwrap_or_else(|| PathBuf::from("."))
    }

    fn from_env(kind: BaseDir) -> PathBuf {
        Self::resolve(kind, |key| {
            std::env::var(key).ok().filter(|value| !value.is_empty())
        })
    }

    /// Base data directory for the current platform
    pub fn data_dir() -> PathBuf {
        Self::from_env(BaseDir::Data)
    }

    /// Base config directory for the current platform
    pub fn config_dir() -> PathBuf {
        Self::from_env(BaseDir::Config)
    }

    /// `{data_dir}/worklog`
    pub fn app_data_dir() -> PathBuf {
        Self::data_dir().join(APP_DIR)
    }

    /// `{config_dir}/worklog`
    pub fn app_config_dir() -> PathBuf {
        Self::config_dir().join(APP_DIR)
    }

    /// Default SQLite store location: `{data_dir}/worklog/worklog.db`
    pub fn default_db_path() -> PathBuf {
        Self::app_data_dir().join("worklog.db")
    }

    /// Default config file: `{config_dir}/worklog/config.toml`
    pub fn default_config_path() -> PathBuf {
        Self::app_config_dir().join("config.toml")
    }

    /// Saved per-repository branch selections: `{config_dir}/worklog/branch_selections.json`
    pub fn default_selection_path() -> PathBuf {
        Self::app_config_dir().join("branch_selections.json")
    }
}
