//! Governor Configuration
//!
//! Window sizes, per-scope admission limits, idempotency TTL and warning
//! thresholds for the governor.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default governor limits
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;
pub const DEFAULT_AUTH_MAX_REQUESTS: usize = 10; // per window
pub const DEFAULT_API_MAX_REQUESTS: usize = 100; // per window
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 300;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Governor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Sliding window length in seconds
    pub rate_window_secs: u64,

    /// Admissions per window for the auth scope
    pub auth_max_requests: usize,

    /// Admissions per window for the api scope
    pub api_max_requests: usize,

    /// Lifetime of a stored idempotent response in seconds
    pub idempotency_ttl_secs: u64,

    /// Interval between idempotency sweeps in seconds
    pub sweep_interval_secs: u64,

    /// Usage percentages that trigger a quota warning when crossed upward
    pub warning_thresholds: Vec<u8>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            rate_window_secs: DEFAULT_RATE_WINDOW_SECS,
            auth_max_requests: DEFAULT_AUTH_MAX_REQUESTS,
            api_max_requests: DEFAULT_API_MAX_REQUESTS,
            idempotency_ttl_secs: DEFAULT_IDEMPOTENCY_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            warning_thresholds: vec![80, 95],
        }
    }
}

impl GovernorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `QUOTA_GOVERNOR_*` environment overrides.
    ///
    /// Values that do not parse or are zero are ignored.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(secs) = env_positive("QUOTA_GOVERNOR_RATE_WINDOW_SECS") {
            self.rate_window_secs = secs;
        }
        if let Some(max) = env_positive("QUOTA_GOVERNOR_AUTH_MAX_REQUESTS") {
            self.auth_max_requests = max as usize;
        }
        if let Some(max) = env_positive("QUOTA_GOVERNOR_API_MAX_REQUESTS") {
            self.api_max_requests = max as usize;
        }
        if let Some(secs) = env_positive("QUOTA_GOVERNOR_IDEMPOTENCY_TTL_SECS") {
            self.idempotency_ttl_secs = secs;
        }
        if let Some(secs) = env_positive("QUOTA_GOVERNOR_SWEEP_INTERVAL_SECS") {
            self.sweep_interval_secs = secs;
        }
        self
    }

    /// Check the configuration for values the governor cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rate_window_secs == 0 {
            anyhow::bail!("Rate window must be > 0 seconds");
        }
        if self.auth_max_requests == 0 || self.api_max_requests == 0 {
            anyhow::bail!("Scope request limits must be > 0");
        }
        if self.idempotency_ttl_secs == 0 {
            anyhow::bail!("Idempotency TTL must be > 0 seconds");
        }
        if self.sweep_interval_secs == 0 {
            anyhow::bail!("Sweep interval must be > 0 seconds");
        }
        if let Some(t) = self
            .warning_thresholds
            .iter()
            .find(|t| **t == 0 || **t > 100)
        {
            anyhow::bail!("Warning threshold {} must be within 1..=100", t);
        }
        Ok(())
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Thresholds sorted ascending without duplicates
    pub fn thresholds(&self) -> Vec<u8> {
        let mut thresholds = self.warning_thresholds.clone();
        thresholds.sort_unstable();
        thresholds.dedup();
        thresholds
    }
}

fn env_positive(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GovernorConfig::default();
        assert_eq!(config.rate_window(), Duration::from_secs(60));
        assert_eq!(config.auth_max_requests, DEFAULT_AUTH_MAX_REQUESTS);
        assert_eq!(config.api_max_requests, DEFAULT_API_MAX_REQUESTS);
        assert_eq!(config.idempotency_ttl(), Duration::from_secs(300));
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auth_scope_is_stricter() {
        let config = GovernorConfig::default();
        assert!(config.auth_max_requests < config.api_max_requests);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = GovernorConfig::default();
        config.rate_window_secs = 0;
        assert!(config.validate().is_err());

        let mut config = GovernorConfig::default();
        config.api_max_requests = 0;
        assert!(config.validate().is_err());

        let mut config = GovernorConfig::default();
        config.warning_thresholds = vec![80, 101];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_thresholds_sorted() {
        let config = GovernorConfig {
            warning_thresholds: vec![95, 80, 95],
            ..GovernorConfig::default()
        };
        assert_eq!(config.thresholds(), vec![80, 95]);
    }

    #[test]
    fn test_config_serialization() {
        let config = GovernorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: GovernorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
