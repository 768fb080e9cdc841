//! Settings for the coordinator binary
//!
//! Layered, later sources win:
//! 1. `tpc.yaml` in the working directory (optional)
//! 2. A file passed on the command line
//! 3. The file named by `TPC_CONFIG`
//! 4. `TPC__*` environment variables, `__` separating nested keys
//!    (e.g. `TPC__COORDINATOR__MAX_RETRIES=5`)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tpc_coordinator::CoordinatorConfig;

/// Environment variable naming an extra settings file
pub const CONFIG_ENV_VAR: &str = "TPC_CONFIG";

/// Prefix for settings passed through the environment
pub const CONFIG_ENV_PREFIX: &str = "TPC";

const DEFAULT_CONFIG_FILE: &str = "tpc";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
}

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the transaction log
    pub log_dir: PathBuf,

    pub coordinator: CoordinatorSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("data"),
            coordinator: CoordinatorSettings::default(),
        }
    }
}

/// Coordinator tuning, durations in milliseconds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    pub prepare_timeout_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub completed_cache_capacity: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        let defaults = CoordinatorConfig::default();
        Self {
            prepare_timeout_ms: defaults.prepare_timeout.as_millis() as u64,
            max_retries: defaults.max_retries,
            initial_backoff_ms: defaults.initial_backoff.as_millis() as u64,
            max_backoff_ms: defaults.max_backoff.as_millis() as u64,
            completed_cache_capacity: defaults.completed_cache_capacity,
        }
    }
}

impl CoordinatorSettings {
    pub fn to_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_prepare_timeout(Duration::from_millis(self.prepare_timeout_ms))
            .with_max_retries(self.max_retries)
            .with_initial_backoff(Duration::from_millis(self.initial_backoff_ms))
            .with_max_backoff(Duration::from_millis(self.max_backoff_ms))
            .with_completed_cache_capacity(self.completed_cache_capacity)
    }
}

impl Settings {
    /// Load settings from files and the environment
    pub fn load(path: Option<&str>) -> Result<Self, SettingsError> {
        use config::{Config, Environment, File, FileFormat};

        let mut builder = Config::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Yaml).required(true));
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&path, FileFormat::Yaml).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Full path of the transaction log file
    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(tpc_log_file::LOG_FILE_NAME)
    }
}
