//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/swg-analytics/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/swg-analytics/` (~/.config/swg-analytics/)
//! - State/Logs: `$XDG_STATE_HOME/swg-analytics/` (~/.local/state/swg-analytics/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Host runtime settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Channel transport tuning
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Host runtime configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// Publication the widget is embedded for
    #[serde(default)]
    pub publication_id: String,

    /// Also forward events from publisher-side originators (AMP, propensity, publisher)
    #[serde(default)]
    pub enable_swg_analytics: bool,

    /// Comma-separated experiment flags that are on
    #[serde(default)]
    pub experiments: String,

    /// Base URL of the logging frontend
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            publication_id: String::new(),
            enable_swg_analytics: false,
            experiments: String::new(),
            frontend_url: default_frontend_url(),
        }
    }
}

impl RuntimeConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let url = self.frontend_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "runtime.frontend_url must be an http(s) URL, got {:?}",
                self.frontend_url
            )));
        }
        Ok(())
    }
}

fn default_frontend_url() -> String {
    "https://news.google.com".to_string()
}

/// Channel transport configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    /// HTTP request timeout in seconds
    #[serde(default = "default_channel_timeout")]
    pub timeout_secs: u64,

    /// Max retry attempts for transient send failures
    #[serde(default = "default_channel_max_retries")]
    pub max_retries: usize,

    /// How many times to probe the frontend before giving up on readiness
    #[serde(default = "default_channel_ready_attempts")]
    pub ready_attempts: usize,

    /// First retry delay in milliseconds; doubles per attempt
    #[serde(default = "default_channel_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_channel_timeout(),
            max_retries: default_channel_max_retries(),
            ready_attempts: default_channel_ready_attempts(),
            retry_base_ms: default_channel_retry_base_ms(),
        }
    }
}

impl ChannelConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.ready_attempts == 0 {
            return Err(Error::Config("channel.ready_attempts must be at least 1".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("channel.timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn default_channel_timeout() -> u64 {
    30
}

fn default_channel_max_retries() -> usize {
    3
}

fn default_channel_ready_attempts() -> usize {
    5
}

fn default_channel_retry_base_ms() -> u64 {
    500
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.runtime.validate()?;
        self.channel.validate()
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/swg-analytics/config.toml` (~/.config/swg-analytics/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("swg-analytics").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/swg-analytics/` (~/.local/state/swg-analytics/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("swg-analytics")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/swg-analytics/swg-analytics.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("swg-analytics.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.runtime.enable_swg_analytics);
        assert!(config.runtime.experiments.is_empty());
        assert_eq!(config.runtime.frontend_url, "https://news.google.com");
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[runtime]
publication_id = "pub1"
enable_swg_analytics = true
experiments = "experiment-A,experiment-B"

[channel]
max_retries = 1

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.runtime.publication_id, "pub1");
        assert!(config.runtime.enable_swg_analytics);
        assert_eq!(config.runtime.experiments, "experiment-A,experiment-B");
        assert_eq!(config.channel.max_retries, 1);
        assert_eq!(config.channel.timeout_secs, 30);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_channel_config_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.ready_attempts, 5);
        assert_eq!(config.retry_base_ms, 500);
    }

    #[test]
    fn test_config_validation() {
        let config = ChannelConfig {
            ready_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ChannelConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let runtime = RuntimeConfig {
            frontend_url: "ftp://example.com".to_string(),
            ..Default::default()
        };
        assert!(runtime.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[runtime]\npublication_id = \"scenic\"").unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.runtime.publication_id, "scenic");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[runtime]\nfrontend_url = \"nope\"").unwrap();
        assert!(Config::load_from(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not = [valid").unwrap();
        assert!(Config::load_from(file.path()).is_err());
    }
}
