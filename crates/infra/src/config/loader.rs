//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. `.env` is applied first if present (`dotenvy`)
//! 2. Environment variables override everything they name
//! 3. A config file fills the rest, probed from multiple paths
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `JOBFEED_DB_PATH`: Database file path
//! - `JOBFEED_DB_POOL_SIZE`: Connection pool size
//! - `JOBFEED_FEED_BASE_URL`: Feed API base URL
//! - `JOBFEED_FEED_TIMEOUT`: Feed request timeout in seconds
//! - `JOBFEED_FEED_PAGE_SIZE`: Units requested per batch
//! - `JOBFEED_SCHEDULER_ENABLED`: Whether the retry scheduler runs (true/false)
//! - `JOBFEED_SCHEDULER_INTERVAL`: Sweep interval in seconds
//! - `JOBFEED_SCHEDULER_CONCURRENCY`: Parallel retries per sweep
//! - `JOBFEED_DLQ_RETENTION_DAYS`: Terminal DLQ rows older than this are purged
//! - `JOBFEED_INLINE_RETRY_ATTEMPTS`: In-run persist attempts per unit
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./jobfeed.json` or `./jobfeed.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. Relative to executable location

use std::path::{Path, PathBuf};

use jobfeed_domain::{Config, JobFeedError, Result};

/// Load configuration with automatic fallback strategy
///
/// Starts from the config file when one exists (defaults otherwise), then
/// applies environment variable overrides and validates the result.
///
/// # Errors
/// Returns `JobFeedError::Config` if:
/// - A present config file cannot be parsed
/// - An environment variable has an invalid value
/// - The resulting configuration fails validation
pub fn load() -> Result<Config> {
    // Best-effort: a missing .env file is not an error
    dotenvy::dotenv().ok();

    let mut config = match probe_config_paths() {
        Some(path) => load_from_file(Some(path))?,
        None => {
            tracing::debug!("No config file found, starting from defaults");
            Config::default()
        }
    };

    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables on top of defaults.
///
/// # Errors
/// Returns `JobFeedError::Config` if a variable has an invalid value or the
/// result fails validation.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Ok(path) = std::env::var("JOBFEED_DB_PATH") {
        config.database.path = path;
    }
    if let Some(pool_size) = env_parse::<u32>("JOBFEED_DB_POOL_SIZE")? {
        config.database.pool_size = pool_size;
    }

    if let Ok(base_url) = std::env::var("JOBFEED_FEED_BASE_URL") {
        config.feed.base_url = base_url;
    }
    if let Some(timeout) = env_parse::<u64>("JOBFEED_FEED_TIMEOUT")? {
        config.feed.timeout_seconds = timeout;
    }
    if let Some(page_size) = env_parse::<usize>("JOBFEED_FEED_PAGE_SIZE")? {
        config.feed.page_size = page_size;
    }

    config.scheduler.enabled = env_bool("JOBFEED_SCHEDULER_ENABLED", config.scheduler.enabled);
    if let Some(interval) = env_parse::<u64>("JOBFEED_SCHEDULER_INTERVAL")? {
        config.scheduler.interval_seconds = interval;
    }
    if let Some(concurrency) = env_parse::<usize>("JOBFEED_SCHEDULER_CONCURRENCY")? {
        config.scheduler.concurrency = concurrency;
    }
    if let Some(retention) = env_parse::<i64>("JOBFEED_DLQ_RETENTION_DAYS")? {
        config.scheduler.dlq_retention_days = retention;
    }

    if let Some(attempts) = env_parse::<u32>("JOBFEED_INLINE_RETRY_ATTEMPTS")? {
        config.sync.inline_retry_attempts = attempts;
    }

    Ok(())
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `JobFeedError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(JobFeedError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            JobFeedError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| JobFeedError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content, format detected by extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| JobFeedError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| JobFeedError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(JobFeedError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("jobfeed.json"),
            cwd.join("jobfeed.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("config.json"),
                exe_dir.join("config.toml"),
                exe_dir.join("jobfeed.json"),
                exe_dir.join("jobfeed.toml"),
            ]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

/// Parse an optional numeric environment variable.
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| JobFeedError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    #[test]
    fn env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("TEST_FEED_BOOL_ONE", "1");
        std::env::set_var("TEST_FEED_BOOL_TRUE", "true");
        std::env::set_var("TEST_FEED_BOOL_UPPER", "TRUE");
        std::env::set_var("TEST_FEED_BOOL_OFF", "off");

        assert!(env_bool("TEST_FEED_BOOL_ONE", false));
        assert!(env_bool("TEST_FEED_BOOL_TRUE", false));
        assert!(env_bool("TEST_FEED_BOOL_UPPER", false));
        assert!(!env_bool("TEST_FEED_BOOL_OFF", true));

        std::env::remove_var("TEST_FEED_BOOL_MISSING");
        assert!(env_bool("TEST_FEED_BOOL_MISSING", true));
        assert!(!env_bool("TEST_FEED_BOOL_MISSING", false));

        std::env::remove_var("TEST_FEED_BOOL_ONE");
        std::env::remove_var("TEST_FEED_BOOL_TRUE");
        std::env::remove_var("TEST_FEED_BOOL_UPPER");
        std::env::remove_var("TEST_FEED_BOOL_OFF");
    }

    #[test]
    fn env_overrides_apply_on_top_of_defaults() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("JOBFEED_DB_PATH", "/tmp/feed-test.db");
        std::env::set_var("JOBFEED_DB_POOL_SIZE", "8");
        std::env::set_var("JOBFEED_FEED_BASE_URL", "https://feed.test/v1");
        std::env::set_var("JOBFEED_SCHEDULER_INTERVAL", "60");
        std::env::set_var("JOBFEED_SCHEDULER_ENABLED", "false");

        let config = load_from_env().expect("config loads from env");
        assert_eq!(config.database.path, "/tmp/feed-test.db");
        assert_eq!(config.database.pool_size, 8);
        assert_eq!(config.feed.base_url, "https://feed.test/v1");
        assert_eq!(config.scheduler.interval_seconds, 60);
        assert!(!config.scheduler.enabled);
        // Untouched fields keep their defaults
        assert_eq!(config.sync.inline_retry_attempts, 2);

        std::env::remove_var("JOBFEED_DB_PATH");
        std::env::remove_var("JOBFEED_DB_POOL_SIZE");
        std::env::remove_var("JOBFEED_FEED_BASE_URL");
        std::env::remove_var("JOBFEED_SCHEDULER_INTERVAL");
        std::env::remove_var("JOBFEED_SCHEDULER_ENABLED");
    }

    #[test]
    fn invalid_numeric_env_is_rejected() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("JOBFEED_DB_POOL_SIZE", "not-a-number");

        let result = load_from_env();
        assert!(matches!(result, Err(JobFeedError::Config(_))));

        std::env::remove_var("JOBFEED_DB_POOL_SIZE");
    }

    #[test]
    fn load_from_file_toml() {
        let toml_content = r#"
[database]
path = "feed.db"
pool_size = 6

[feed]
base_url = "https://feed.test/v1"
timeout_seconds = 10
page_size = 50

[scheduler]
interval_seconds = 120
concurrency = 2

[retry.api]
max_retries = 7
"#;

        let mut temp_file = NamedTempFile::new().expect("temp file");
        temp_file.write_all(toml_content.as_bytes()).expect("write");
        let path = temp_file.path().with_extension("toml");
        std::fs::copy(temp_file.path(), &path).expect("copy");

        let config = load_from_file(Some(path.clone())).expect("config loads from TOML");
        assert_eq!(config.database.path, "feed.db");
        assert_eq!(config.database.pool_size, 6);
        assert_eq!(config.feed.page_size, 50);
        assert_eq!(config.scheduler.interval_seconds, 120);
        assert_eq!(config.retry.api.max_retries, 7);
        // Unspecified sections fall back to defaults
        assert_eq!(config.retry.database.max_retries, 5);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn load_from_file_json() {
        let json_content = r#"{
            "database": { "path": "feed.db", "pool_size": 4 },
            "scheduler": { "dlq_retention_days": 7 }
        }"#;

        let mut temp_file = NamedTempFile::new().expect("temp file");
        temp_file.write_all(json_content.as_bytes()).expect("write");
        let path = temp_file.path().with_extension("json");
        std::fs::copy(temp_file.path(), &path).expect("copy");

        let config = load_from_file(Some(path.clone())).expect("config loads from JSON");
        assert_eq!(config.database.path, "feed.db");
        assert_eq!(config.scheduler.dlq_retention_days, 7);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn load_from_file_not_found() {
        let result = load_from_file(Some(PathBuf::from("/nonexistent/config.json")));
        assert!(matches!(result, Err(JobFeedError::Config(_))));
    }

    #[test]
    fn load_from_file_invalid_json() {
        let invalid_json = r#"{ "this is": "not valid json" "#;

        let mut temp_file = NamedTempFile::new().expect("temp file");
        temp_file.write_all(invalid_json.as_bytes()).expect("write");
        let path = temp_file.path().with_extension("json");
        std::fs::copy(temp_file.path(), &path).expect("copy");

        let result = load_from_file(Some(path.clone()));
        assert!(result.is_err(), "Should fail with invalid JSON");

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn parse_config_unsupported_format() {
        let path = PathBuf::from("test.yaml");
        let result = parse_config("some content", &path);
        assert!(result.is_err(), "Should fail with unsupported format");
    }
}
