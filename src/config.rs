//! Runtime configuration.
//!
//! Values come from, in priority order: environment variables, an optional
//! TOML file, and the compiled-in defaults. A missing file is not an error;
//! every key is optional.
//!
//! ```toml
//! [limits]
//! max_file_size = 104857600
//! max_dimension = 10000
//! max_dimensions_per_job = 20
//! max_concurrent_jobs = 3
//!
//! [worker]
//! isolation = "process"
//! timeout_secs = 15
//! # executable = "/usr/local/bin/grumpy-image"
//! ```
//!
//! The loaded [`AppConfig`] is turned into a [`Limits`] value with
//! [`AppConfig::limits`] and passed by reference from there on.

use crate::security::Limits;
use confique::Config;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config load error: {0}")]
    Load(#[from] confique::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// How a job's transform work is isolated from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    /// A child `grumpy-image worker` process per job.
    Process,
    /// A dedicated OS thread per job inside this process.
    Thread,
}

#[derive(Config, Debug, Clone)]
pub struct AppConfig {
    /// Input limits enforced before any work is spawned.
    #[config(nested)]
    pub limits: LimitsConfig,

    /// Isolated worker settings.
    #[config(nested)]
    pub worker: WorkerConfig,
}

#[derive(Config, Debug, Clone)]
pub struct LimitsConfig {
    /// Largest accepted source image, in bytes.
    #[config(default = 104857600, env = "GRUMPY_MAX_FILE_SIZE")]
    pub max_file_size: u64,

    /// Largest accepted width or height, in pixels.
    #[config(default = 10000, env = "GRUMPY_MAX_DIMENSION")]
    pub max_dimension: u32,

    /// Most target dimensions a single job may request (origin not counted).
    #[config(default = 20, env = "GRUMPY_MAX_DIMENSIONS_PER_JOB")]
    pub max_dimensions_per_job: usize,

    /// Jobs admitted at once; further submissions are rejected, not queued.
    #[config(default = 3, env = "GRUMPY_MAX_CONCURRENT_JOBS")]
    pub max_concurrent_jobs: usize,
}

#[derive(Config, Debug, Clone)]
pub struct WorkerConfig {
    /// "process" or "thread".
    #[config(default = "process", env = "GRUMPY_WORKER_ISOLATION")]
    pub isolation: Isolation,

    /// Seconds a job may run before its worker is terminated.
    #[config(default = 15, env = "GRUMPY_WORKER_TIMEOUT_SECS")]
    pub timeout_secs: u64,

    /// Worker binary to try before the locations next to this executable.
    #[config(env = "GRUMPY_WORKER_EXECUTABLE")]
    pub executable: Option<PathBuf>,
}

impl AppConfig {
    /// Load from the environment and `path`, then validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::builder().env().file(path).load()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every job fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;
        if limits.max_file_size == 0 {
            return Err(ConfigError::Validation(
                "limits.max_file_size must be non-zero".into(),
            ));
        }
        if limits.max_dimension == 0 {
            return Err(ConfigError::Validation(
                "limits.max_dimension must be non-zero".into(),
            ));
        }
        if limits.max_dimensions_per_job == 0 {
            return Err(ConfigError::Validation(
                "limits.max_dimensions_per_job must be non-zero".into(),
            ));
        }
        if limits.max_concurrent_jobs == 0 {
            return Err(ConfigError::Validation(
                "limits.max_concurrent_jobs must be non-zero".into(),
            ));
        }
        if self.worker.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "worker.timeout_secs must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn limits(&self) -> Limits {
        Limits {
            max_file_size: self.limits.max_file_size,
            max_dimension: self.limits.max_dimension,
            max_dimensions_per_job: self.limits.max_dimensions_per_job,
            max_concurrent_jobs: self.limits.max_concurrent_jobs,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.worker.timeout_secs)
    }
}

/// Returns a fully-commented config file with every key at its default.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> String {
    confique::toml::template::<AppConfig>(confique::toml::FormatOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn defaults() -> AppConfig {
        AppConfig::builder().load().unwrap()
    }

    fn from_toml(content: &str) -> Result<AppConfig, confique::Error> {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("grumpy-image.toml");
        fs::write(&path, content).unwrap();
        AppConfig::builder().file(&path).load()
    }

    #[test]
    fn defaults_match_documented_limits() {
        let config = defaults();
        assert_eq!(config.limits.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.limits.max_dimension, 10000);
        assert_eq!(config.limits.max_dimensions_per_job, 20);
        assert_eq!(config.limits.max_concurrent_jobs, 3);
        assert_eq!(config.worker.isolation, Isolation::Process);
        assert_eq!(config.timeout(), Duration::from_secs(15));
        assert!(config.worker.executable.is_none());
    }

    #[test]
    fn default_limits_equal_runtime_defaults() {
        assert_eq!(defaults().limits(), Limits::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = from_toml(
            r#"
[limits]
max_concurrent_jobs = 5

[worker]
isolation = "thread"
"#,
        )
        .unwrap();
        assert_eq!(config.limits.max_concurrent_jobs, 5);
        assert_eq!(config.limits.max_dimension, 10000);
        assert_eq!(config.worker.isolation, Isolation::Thread);
        assert_eq!(config.worker.timeout_secs, 15);
    }

    #[test]
    fn executable_path_read_from_file() {
        let config = from_toml("[worker]\nexecutable = \"/opt/grumpy/bin/grumpy-image\"\n").unwrap();
        assert_eq!(
            config.worker.executable.as_deref(),
            Some(Path::new("/opt/grumpy/bin/grumpy-image"))
        );
    }

    #[test]
    fn unknown_isolation_rejected() {
        assert!(from_toml("[worker]\nisolation = \"container\"\n").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = AppConfig::builder()
            .file(tmp.path().join("absent.toml"))
            .load()
            .unwrap();
        assert_eq!(config.limits.max_concurrent_jobs, 3);
    }

    // =========================================================================
    // validate tests
    // =========================================================================

    #[test]
    fn defaults_validate() {
        assert!(defaults().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = defaults();
        config.limits.max_concurrent_jobs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent_jobs"));
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = defaults();
        config.worker.timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn zero_max_dimension_rejected() {
        let mut config = defaults();
        config.limits.max_dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn limits_carry_configured_values() {
        let mut config = defaults();
        config.limits.max_file_size = 42;
        config.limits.max_dimensions_per_job = 2;
        let limits = config.limits();
        assert_eq!(limits.max_file_size, 42);
        assert_eq!(limits.max_dimensions_per_job, 2);
    }

    // =========================================================================
    // stock_config_toml tests
    // =========================================================================

    #[test]
    fn stock_template_mentions_every_section() {
        let template = stock_config_toml();
        assert!(template.contains("[limits]"));
        assert!(template.contains("[worker]"));
        assert!(template.contains("max_concurrent_jobs"));
        assert!(template.contains("GRUMPY_WORKER_ISOLATION"));
    }
}
