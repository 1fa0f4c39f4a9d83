//! Configuration management for agilewatch
//!
//! Configuration is a YAML key-value file holding the tariff API credential,
//! its base URL, the region code and the device serial, plus logging and
//! scheduler tuning. Unlike most settings files, a missing file is fatal.

use crate::error::{AgileWatchError, Result};
use crate::octopus::Region;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file path
pub const CONFIG_ENV: &str = "AGILEWATCH_CONFIG";

/// Paths searched when `AGILEWATCH_CONFIG` is not set
pub const DEFAULT_PATHS: [&str; 2] = ["agilewatch.yaml", "/etc/agilewatch/config.yaml"];

fn default_timezone() -> String {
    "Europe/London".to_string()
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tariff API access
    pub octopus: OctopusConfig,

    /// Civil time zone of the tariff market
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Polling loop tuning
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Octopus Energy API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OctopusConfig {
    /// API key, sent as the basic-auth user name
    pub api_key: String,

    /// Base URL of the versioned REST API
    pub api_url: String,

    /// Region (GSP) code, e.g. "C" or "_C"
    pub region: String,

    /// Serial number of the controlled device
    pub serial_no: String,

    /// Agile product code
    pub product_code: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Polling loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Sleep granularity while waiting for the next window boundary
    pub check_interval_ms: u64,

    /// Extra attempts for a tick that fails
    pub tick_retries: u32,

    /// Delay between tick attempts
    pub retry_delay_ms: u64,

    /// Log and wait for the next boundary instead of stopping when a tick
    /// still fails after its retries
    pub skip_failed_ticks: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for OctopusConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: "https://api.octopus.energy/v1".to_string(),
            region: "C".to_string(),
            serial_no: String::new(),
            product_code: "AGILE-18-02-21".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 1000,
            tick_retries: 0,
            retry_delay_ms: 5000,
            skip_failed_ticks: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/agilewatch.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            octopus: OctopusConfig::default(),
            timezone: default_timezone(),
            scheduler: SchedulerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AgileWatchError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&contents).map_err(|e| {
            AgileWatchError::config(format!("malformed {}: {}", path.display(), e))
        })
    }

    /// Locate, load and validate the configuration file.
    ///
    /// Fails with a `Config` error when no file exists or it cannot be used.
    pub fn load() -> Result<Self> {
        let path = Self::locate()?;
        Self::load_from(&path)
    }

    /// Load and validate a specific file, reporting any problem as `Config`
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::from_file(path)?;
        config.validate().map_err(|e| match e {
            AgileWatchError::Validation { field, message } => AgileWatchError::config(format!(
                "invalid {} in {}: {}",
                field,
                path.display(),
                message
            )),
            other => other,
        })?;
        Ok(config)
    }

    /// Path of the configuration file to use
    pub fn locate() -> Result<PathBuf> {
        if let Some(explicit) = std::env::var_os(CONFIG_ENV) {
            let p = PathBuf::from(explicit);
            if p.exists() {
                return Ok(p);
            }
            return Err(AgileWatchError::config(format!(
                "No config file found at {} ({})",
                p.display(),
                CONFIG_ENV
            )));
        }

        DEFAULT_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .ok_or_else(|| {
                AgileWatchError::config(format!(
                    "No config file found! Looked in {}",
                    DEFAULT_PATHS.join(", ")
                ))
            })
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parsed market time zone
    pub fn tz(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|_| {
            AgileWatchError::validation(
                "timezone".to_string(),
                format!("unknown time zone '{}'", self.timezone),
            )
        })
    }

    /// Parsed region code
    pub fn region(&self) -> Result<Region> {
        Region::parse(&self.octopus.region)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.octopus.api_key.trim().is_empty() {
            return Err(AgileWatchError::validation(
                "octopus.api_key",
                "API key cannot be empty",
            ));
        }

        if self.octopus.api_url.trim().is_empty() {
            return Err(AgileWatchError::validation(
                "octopus.api_url",
                "API URL cannot be empty",
            ));
        }

        if self.octopus.product_code.trim().is_empty() {
            return Err(AgileWatchError::validation(
                "octopus.product_code",
                "Product code cannot be empty",
            ));
        }

        self.region()?;
        self.tz()?;

        if self.scheduler.check_interval_ms == 0 {
            return Err(AgileWatchError::validation(
                "scheduler.check_interval_ms",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut config = Config::default();
        config.octopus.api_key = "sk_live_abc".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.timezone, "Europe/London");
        assert_eq!(config.scheduler.check_interval_ms, 1000);
        assert_eq!(config.scheduler.tick_retries, 0);
        assert!(!config.scheduler.skip_failed_ticks);
        assert_eq!(config.octopus.product_code, "AGILE-18-02-21");
    }

    #[test]
    fn test_config_validation() {
        let mut config = valid();
        assert!(config.validate().is_ok());

        // Default has no credential
        assert!(Config::default().validate().is_err());

        config.octopus.region = "Z".to_string();
        assert!(config.validate().is_err());

        config = valid();
        config.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());

        config = valid();
        config.scheduler.check_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = "octopus:\n  api_key: k\n  region: _h\n  serial_no: SN1\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.octopus.api_url, "https://api.octopus.energy/v1");
        assert_eq!(config.region().unwrap(), Region::H);
        assert_eq!(config.tz().unwrap(), chrono_tz::Europe::London);
        assert!(config.validate().is_ok());
    }
}
