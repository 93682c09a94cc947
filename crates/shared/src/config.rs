//! Configuration management for the acquisition engine.
//!
//! Settings come from a TOML file; anything missing falls back to the
//! defaults below.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default allowed drift between a target's length and a candidate's duration
pub const DEFAULT_TOLERANCE_SECONDS: u32 = 5;

/// Main configuration structure. Every section may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    /// Matching and scheduling
    pub acquisition: AcquisitionConfig,
    /// External search
    pub search: SearchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Root for relative paths below
    pub root_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Task database file (relative to the data directory or absolute)
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log directory (relative to the data directory or absolute)
    pub log_dir: String,
    /// trace, debug, info, warn or error
    pub default_level: String,
    pub console: bool,
    pub file: bool,
    /// JSON lines in the log file instead of plain text
    pub json_format: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Accepted |target length - candidate duration| in seconds
    pub tolerance_seconds: u32,
    /// Page size requested from the search provider
    pub max_candidates_per_task: usize,
    /// Longest a worker waits on the search provider before failing the task
    pub claim_timeout_secs: u64,
    /// Worker pool size
    pub max_concurrent_tasks: usize,
    /// Idle poll interval when watching the queue
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// yt-dlp executable
    pub yt_dlp_path: String,
    pub rate_limit: RateLimitConfig,
}

/// Client-side throttle for search calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
    pub requests_per_minute: u32,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root_dir: "data".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "acquisition.db".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            default_level: "info".to_string(),
            console: true,
            file: true,
            json_format: false,
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
            max_candidates_per_task: 10,
            claim_timeout_secs: 30,
            max_concurrent_tasks: 4,
            poll_interval_secs: 5,
        }
    }
}

impl AcquisitionConfig {
    pub fn claim_timeout(&self) -> Duration {
        Duration::from_secs(self.claim_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            rate_limit: RateLimitConfig {
                requests_per_second: 1.0,
                requests_per_minute: 30,
            },
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// A missing file gives the defaults; a present one must parse and validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        tracing::info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Write the configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let acquisition = &self.acquisition;
        if acquisition.max_candidates_per_task == 0 {
            bail!("acquisition.max_candidates_per_task must be at least 1");
        }
        if acquisition.claim_timeout_secs == 0 {
            bail!("acquisition.claim_timeout_secs must be at least 1");
        }
        if acquisition.max_concurrent_tasks == 0 {
            bail!("acquisition.max_concurrent_tasks must be at least 1");
        }

        let rate = &self.search.rate_limit;
        if rate.requests_per_second.is_nan()
            || rate.requests_per_second <= 0.0
            || rate.requests_per_minute == 0
        {
            bail!("search.rate_limit values must be positive");
        }

        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.root_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database.path)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.logging.log_dir)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir().join(path)
        }
    }
}
