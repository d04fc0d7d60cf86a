// Configuration File Support
//
// This module provides configuration file parsing for the quota governor.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from XDG config directory: ~/.config/quota-governor/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::governor::directory::TenantEntry;
use crate::governor::plans;
use crate::governor::GovernorConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Governor limits and timers
    pub governor: GovernorConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Static tenant directory, keyed by tenant id
    pub tenants: HashMap<String, TenantEntry>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to expose Prometheus metrics on /metrics
    pub enabled: bool,

    /// Port for the HTTP endpoint
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
        }
    }
}

impl Config {
    /// Load configuration from the default XDG config directory
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// A missing file yields the defaults. Environment overrides are applied
    /// in both cases and the result is validated.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;

            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/quota-governor/config.toml` on Linux
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) =
            directories::ProjectDirs::from("com", "quota-governor", "QuotaGovernor")
        {
            proj_dirs.config_dir().join("config.toml")
        } else {
            // Fallback if XDG dirs cannot be determined
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("quota-governor")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - QUOTA_GOVERNOR_LOG_LEVEL
    /// - QUOTA_GOVERNOR_LOG_FORMAT
    /// - QUOTA_GOVERNOR_METRICS_ENABLED
    /// - QUOTA_GOVERNOR_METRICS_PORT
    /// - the governor overrides (see [`GovernorConfig::apply_env_overrides`])
    fn apply_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("QUOTA_GOVERNOR_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("QUOTA_GOVERNOR_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Ok(enabled) = std::env::var("QUOTA_GOVERNOR_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }
        if let Ok(port) = std::env::var("QUOTA_GOVERNOR_METRICS_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                if port > 0 {
                    self.metrics.port = port;
                }
            }
        }

        self.governor = self.governor.apply_env_overrides();
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        self.governor
            .validate()
            .context("Invalid governor configuration")?;

        if self.metrics.port == 0 {
            anyhow::bail!("Metrics port must be > 0");
        }

        for (tenant_id, entry) in &self.tenants {
            if plans::plan(&entry.plan).is_none() {
                anyhow::bail!("Tenant '{}' has unknown plan: {}", tenant_id, entry.plan);
            }
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Tests that read or write QUOTA_GOVERNOR_* variables hold this lock
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_VARS: [&str; 9] = [
        "QUOTA_GOVERNOR_LOG_LEVEL",
        "QUOTA_GOVERNOR_LOG_FORMAT",
        "QUOTA_GOVERNOR_METRICS_ENABLED",
        "QUOTA_GOVERNOR_METRICS_PORT",
        "QUOTA_GOVERNOR_RATE_WINDOW_SECS",
        "QUOTA_GOVERNOR_AUTH_MAX_REQUESTS",
        "QUOTA_GOVERNOR_API_MAX_REQUESTS",
        "QUOTA_GOVERNOR_IDEMPOTENCY_TTL_SECS",
        "QUOTA_GOVERNOR_SWEEP_INTERVAL_SECS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "compact");
        assert_eq!(config.governor.rate_window_secs, 60);
        assert_eq!(config.governor.auth_max_requests, 10);
        assert_eq!(config.governor.api_max_requests, 100);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9090);
        assert!(config.tenants.is_empty());
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_governor() {
        let mut config = Config::default();
        config.governor.warning_thresholds = vec![80, 120];
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("Warning threshold 120"));
    }

    #[test]
    fn test_config_validation_unknown_plan() {
        let mut config = Config::default();
        config.tenants.insert(
            "acme".to_string(),
            TenantEntry {
                plan: "platinum".to_string(),
                fleets: vec![],
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_metrics_port() {
        let mut config = Config::default();
        config.metrics.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_nonexistent_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().with_extension("nonexistent");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_valid_toml_config() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[logging]
level = "debug"
format = "json"

[governor]
rate_window_secs = 30
api_max_requests = 500
warning_thresholds = [50, 90]

[metrics]
enabled = false
port = 8080

[tenants.acme]
plan = "team"
fleets = ["edge", "core"]

[tenants.globex]
plan = "enterprise"
"#;

        fs::write(temp_file.path(), toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.governor.rate_window_secs, 30);
        assert_eq!(config.governor.api_max_requests, 500);
        // Unset keys keep their defaults
        assert_eq!(config.governor.auth_max_requests, 10);
        assert_eq!(config.governor.warning_thresholds, vec![50, 90]);
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.port, 8080);
        assert_eq!(config.tenants["acme"].plan, "team");
        assert_eq!(config.tenants["acme"].fleets, vec!["edge", "core"]);
        assert!(config.tenants["globex"].fleets.is_empty());
    }

    #[test]
    fn test_load_invalid_toml_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let toml_content = r#"
[logging
level = "debug"
"#;

        fs::write(temp_file.path(), toml_content).unwrap();

        assert!(Config::load_from_path(temp_file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        std::env::set_var("QUOTA_GOVERNOR_LOG_LEVEL", "debug");
        std::env::set_var("QUOTA_GOVERNOR_LOG_FORMAT", "json");
        std::env::set_var("QUOTA_GOVERNOR_METRICS_ENABLED", "false");
        std::env::set_var("QUOTA_GOVERNOR_METRICS_PORT", "9100");
        std::env::set_var("QUOTA_GOVERNOR_API_MAX_REQUESTS", "250");
        std::env::set_var("QUOTA_GOVERNOR_SWEEP_INTERVAL_SECS", "30");

        let config = Config::default().apply_env_overrides();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.port, 9100);
        assert_eq!(config.governor.api_max_requests, 250);
        assert_eq!(config.governor.sweep_interval_secs, 30);

        clear_env();
    }

    #[test]
    fn test_env_overrides_invalid_values() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        std::env::set_var("QUOTA_GOVERNOR_METRICS_PORT", "0");
        std::env::set_var("QUOTA_GOVERNOR_RATE_WINDOW_SECS", "soon");
        std::env::set_var("QUOTA_GOVERNOR_AUTH_MAX_REQUESTS", "0");

        let config = Config::default().apply_env_overrides();

        // Should keep defaults for invalid values
        assert_eq!(config.metrics.port, 9090);
        assert_eq!(config.governor.rate_window_secs, 60);
        assert_eq!(config.governor.auth_max_requests, 10);

        clear_env();
    }

    #[test]
    fn test_log_level() {
        let mut config = Config::default();
        config.logging.level = "WARN".to_string();
        assert_eq!(config.log_level().unwrap(), tracing::Level::WARN);
    }
}
