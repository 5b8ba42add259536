//! User settings for StackFlow
//!
//! Settings come from `~/.config/stackflow/config.yaml` (or the file named by
//! `STACKFLOW_CONFIG_PATH`), then from `STACKFLOW_*` environment variables.
//! Command line flags are applied on top by the CLI.
//!
//! ```yaml
//! workers: 8
//! call-timeout-secs: 120
//! archive: true
//! retry:
//!   max-attempts: 6
//!   initial-delay-ms: 250
//! ```

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "STACKFLOW_CONFIG_PATH";
pub const WORKERS_ENV: &str = "STACKFLOW_WORKERS";
pub const MAX_ATTEMPTS_ENV: &str = "STACKFLOW_MAX_ATTEMPTS";
pub const CALL_TIMEOUT_ENV: &str = "STACKFLOW_CALL_TIMEOUT_SECS";

const CONFIG_FILE: &str = "config.yaml";

/// Retry policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Settings for plan execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    /// Maximum number of steps in flight
    pub workers: usize,

    pub retry: RetrySettings,

    /// Per-call limit in seconds, 0 disables it
    pub call_timeout_secs: u64,

    /// Keep run reports under `.stackflow/runs`
    pub archive: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: 4,
            retry: RetrySettings::default(),
            call_timeout_secs: 60,
            archive: true,
        }
    }
}

impl Settings {
    /// Load the settings file if there is one, then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut settings = match config_file_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse a settings file without looking at the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    /// Apply `STACKFLOW_*` overrides
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(workers) = env_number(WORKERS_ENV)? {
            self.workers = workers;
        }
        if let Some(attempts) = env_number(MAX_ATTEMPTS_ENV)? {
            self.retry.max_attempts = attempts;
        }
        if let Some(secs) = env_number(CALL_TIMEOUT_ENV)? {
            self.call_timeout_secs = secs;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(invalid("workers", "0", "at least one worker is required"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max-attempts", "0", "at least one attempt is required"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(invalid(
                "retry.backoff-multiplier",
                &self.retry.backoff_multiplier.to_string(),
                "must be at least 1.0",
            ));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_secs > 0).then(|| Duration::from_secs(self.call_timeout_secs))
    }
}

/// `~/.config/stackflow`
pub fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("stackflow"))
}

/// Settings file location, `STACKFLOW_CONFIG_PATH` first
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }
    config_dir().ok().map(|dir| dir.join(CONFIG_FILE))
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(key, &value, "expected a non-negative integer")),
        Err(_) => Ok(None),
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.workers, 4);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.initial_delay(), Duration::from_millis(500));
        assert_eq!(settings.retry.max_delay(), Duration::from_secs(30));
        assert_eq!(settings.call_timeout(), Some(Duration::from_secs(60)));
        assert!(settings.archive);
    }

    #[test]
    fn test_config_dir() {
        if let Ok(dir) = config_dir() {
            assert!(dir.ends_with("stackflow"));
        }
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "workers: 8\nretry:\n  max-attempts: 2\n").unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.workers, 8);
        assert_eq!(settings.retry.max_attempts, 2);
        assert_eq!(settings.retry.initial_delay_ms, 500);
        assert_eq!(settings.call_timeout_secs, 60);
    }

    #[test]
    fn test_parse_error_names_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "workers: [not a number]\n").unwrap();

        match Settings::load_from(&path) {
            Err(ConfigError::Parse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("Expected Parse error, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_load_with_env_overrides() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("settings.yaml");
        fs::write(&path, "workers: 8\ncall-timeout-secs: 10\n").unwrap();

        temp_env::with_vars(
            [
                (CONFIG_PATH_ENV, Some(path.to_str().unwrap())),
                (WORKERS_ENV, Some("2")),
                (MAX_ATTEMPTS_ENV, Some("7")),
                (CALL_TIMEOUT_ENV, None),
            ],
            || {
                let settings = Settings::load().unwrap();
                assert_eq!(settings.workers, 2);
                assert_eq!(settings.retry.max_attempts, 7);
                assert_eq!(settings.call_timeout_secs, 10);
            },
        );
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("absent.yaml");

        temp_env::with_vars(
            [
                (CONFIG_PATH_ENV, Some(path.to_str().unwrap())),
                (WORKERS_ENV, None),
                (MAX_ATTEMPTS_ENV, None),
                (CALL_TIMEOUT_ENV, Some("0")),
            ],
            || {
                let settings = Settings::load().unwrap();
                assert_eq!(settings.workers, 4);
                assert_eq!(settings.call_timeout(), None);
            },
        );
    }

    #[test]
    #[serial]
    fn test_invalid_env_value() {
        temp_env::with_var(WORKERS_ENV, Some("many"), || {
            let mut settings = Settings::default();
            assert!(matches!(
                settings.apply_env(),
                Err(ConfigError::InvalidValue { ref key, .. }) if key == WORKERS_ENV
            ));
        });
    }

    #[test]
    fn test_zero_workers_rejected() {
        let settings = Settings {
            workers: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
