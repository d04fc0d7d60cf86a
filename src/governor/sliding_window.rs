//! Sliding-Window Rate Limiter
//!
//! Admits a caller only if fewer than `max_requests` of its requests were
//! accepted during the trailing window. Each [`RateScope`] keeps its own
//! threshold and its own counters.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::GovernorConfig;
use super::error::GovernorError;
use crate::metrics;

/// Independent rate-limit scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateScope {
    /// Unauthenticated and auth-adjacent endpoints
    Auth,
    /// Authenticated API endpoints
    Api,
}

impl RateScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateScope::Auth => "auth",
            RateScope::Api => "api",
        }
    }
}

impl fmt::Display for RateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity a caller is rate limited by
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateKey(String);

impl RateKey {
    /// Prefer the stable credential identity, fall back to the network address
    pub fn for_caller(credential_id: Option<&str>, addr: IpAddr) -> Self {
        match credential_id {
            Some(id) if !id.is_empty() => Self(format!("key:{}", id)),
            _ => Self(format!("ip:{}", addr)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-scope sliding window limiter
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter {
    windows: Arc<DashMap<(RateScope, RateKey), Vec<Instant>>>,
    window: Duration,
    auth_max_requests: usize,
    api_max_requests: usize,
}

impl SlidingWindowLimiter {
    /// Create a limiter with explicit limits
    pub fn new(window: Duration, auth_max_requests: usize, api_max_requests: usize) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            window,
            auth_max_requests,
            api_max_requests,
        }
    }

    /// Create a limiter from governor configuration
    pub fn from_config(config: &GovernorConfig) -> Self {
        Self::new(
            config.rate_window(),
            config.auth_max_requests,
            config.api_max_requests,
        )
    }

    /// Maximum admissions per window for a scope
    pub fn max_requests(&self, scope: RateScope) -> usize {
        match scope {
            RateScope::Auth => self.auth_max_requests,
            RateScope::Api => self.api_max_requests,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admit or reject a request from `key` in `scope`
    pub fn check(&self, scope: RateScope, key: &RateKey) -> Result<(), GovernorError> {
        self.check_at(scope, key, Instant::now())
    }

    /// Admit or reject a request observed at `now`
    pub fn check_at(
        &self,
        scope: RateScope,
        key: &RateKey,
        now: Instant,
    ) -> Result<(), GovernorError> {
        let max_requests = self.max_requests(scope);
        let window = self.window;

        let mut entry = self.windows.entry((scope, key.clone())).or_default();
        let timestamps = entry.value_mut();

        timestamps.retain(|t| now.saturating_duration_since(*t) <= window);

        if timestamps.len() >= max_requests {
            let oldest = timestamps.iter().min().copied().unwrap_or(now);
            let retry_after_secs = retry_after_secs(window, now.saturating_duration_since(oldest));

            tracing::debug!(
                scope = scope.as_str(),
                key = key.as_str(),
                retry_after_secs,
                "Rate limit exceeded"
            );
            metrics::RATE_LIMITED_TOTAL
                .with_label_values(&[scope.as_str()])
                .inc();

            return Err(GovernorError::RateLimited {
                scope,
                retry_after_secs,
            });
        }

        timestamps.push(now);
        metrics::RATE_ADMITTED_TOTAL
            .with_label_values(&[scope.as_str()])
            .inc();
        Ok(())
    }

    /// Accepted requests still inside the window for `key`
    pub fn in_window(&self, scope: RateScope, key: &RateKey) -> usize {
        let now = Instant::now();
        self.windows
            .get(&(scope, key.clone()))
            .map(|ts| {
                ts.iter()
                    .filter(|t| now.saturating_duration_since(**t) <= self.window)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Number of (scope, key) windows currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Drop every window with no accepted request left in it
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let window = self.window;
        let mut removed = 0usize;
        self.windows.retain(|_, timestamps| {
            timestamps.retain(|t| now.saturating_duration_since(*t) <= window);
            if timestamps.is_empty() {
                removed += 1;
                false
            } else {
                true
            }
        });

        metrics::RATE_WINDOWS_SWEPT_TOTAL.inc_by(removed as u64);
        removed
    }
}

/// Whole seconds until the oldest accepted request leaves the window, at least 1
fn retry_after_secs(window: Duration, elapsed: Duration) -> u64 {
    let remaining_ms = window.saturating_sub(elapsed).as_millis() as u64;
    remaining_ms.div_ceil(1000).max(1)
}
