use super::*;
use std::collections::HashMap;
use tempfile::NamedTempFile;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.ingest.max_file_diff_chars, 10_000);
    assert_eq!(config.ingest.commit_summary_timeout_secs, 30);
    assert_eq!(config.worklog.summary_timeout_secs, 120);
    assert_eq!(config.identity.profile, "default");
    assert!(config.ingest.generate_summaries);
    assert!(config.worklog.only_user_commits);
}

#[test]
fn test_validate_valid_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_zero_diff_cap() {
    let mut config = Config::default();
    config.ingest.max_file_diff_chars = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_bad_email() {
    let mut config = Config::default();
    config.identity.email = Some("not-an-email".to_string());
    let err = config.validate().unwrap_err();
    assert!(matches!(
        err,
        WorklogError::Config(ConfigError::InvalidValue { ref key, .. }) if key == "identity.email"
    ));
}

#[test]
fn test_validate_empty_profile() {
    let mut config = Config::default();
    config.identity.profile = "  ".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_save_and_load() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path();

    let mut config = Config::default();
    config.identity.email = Some("dev@example.com".to_string());
    config.ingest.workers = 3;

    config.save(path).unwrap();
    let loaded = Config::from_file(path).unwrap();

    assert_eq!(loaded.identity.email.as_deref(), Some("dev@example.com"));
    assert_eq!(loaded.ingest.workers, 3);
}

#[test]
fn test_partial_file_uses_defaults() {
    let temp_file = NamedTempFile::new().unwrap();
    std::fs::write(
        temp_file.path(),
        "[identity]\nemail = \"me@example.com\"\ngithub_handle = \"octo\"\n",
    )
    .unwrap();

    let loaded = Config::from_file(temp_file.path()).unwrap();
    assert_eq!(loaded.identity.github_handle.as_deref(), Some("octo"));
    assert_eq!(loaded.identity.profile, "default");
    assert_eq!(loaded.ingest.patch_budget_bytes, 8_000);
}

#[test]
fn test_load_nonexistent_file() {
    let result = Config::from_file(Path::new("/nonexistent/config.toml"));
    assert!(matches!(
        result.unwrap_err(),
        WorklogError::Config(ConfigError::FileNotFound(_))
    ));
}

#[test]
fn test_invalid_toml() {
    let temp_file = NamedTempFile::new().unwrap();
    std::fs::write(temp_file.path(), "[ingest\nworkers = ").unwrap();
    let result = Config::from_file(temp_file.path());
    assert!(matches!(
        result.unwrap_err(),
        WorklogError::Config(ConfigError::ParseFailed(_))
    ));
}

#[test]
fn test_overrides() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("WORKLOG_DB_PATH", "/tmp/custom.db"),
        ("WORKLOG_USER_EMAIL", "env@example.com"),
        ("WORKLOG_WORKERS", "6"),
        ("WORKLOG_SUMMARIES", "off"),
    ]);

    let mut config = Config::default();
    config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

    assert_eq!(config.store.db_path, PathBuf::from("/tmp/custom.db"));
    assert_eq!(config.identity.email.as_deref(), Some("env@example.com"));
    assert_eq!(config.ingest.workers, 6);
    assert!(!config.ingest.generate_summaries);
}

#[test]
fn test_unparseable_worker_override_is_ignored() {
    let mut config = Config::default();
    config.apply_overrides_from(|key| (key == "WORKLOG_WORKERS").then(|| "many".to_string()));
    assert_eq!(config.ingest.workers, 0);
}

#[test]
fn test_effective_workers() {
    let mut ingest = IngestConfig::default();
    assert!(ingest.effective_workers() >= 1);
    ingest.workers = 2;
    assert_eq!(ingest.effective_workers(), 2);
}
