//! Governor Error Types
//!
//! Every variant here is an expected, frequent outcome on the request path.
//! They are cheap to build and are never logged above `debug`.

use super::plans::Resource;
use super::sliding_window::RateScope;

/// Error types for governor operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GovernorError {
    /// Resource is at or above its plan limit
    #[error("Quota exceeded for {resource} on tenant {tenant_id}: {used}/{limit}")]
    QuotaExceeded {
        tenant_id: String,
        resource: Resource,
        used: u64,
        limit: u64,
    },

    /// Sliding window is saturated for this caller
    #[error("Rate limit exceeded for {scope} scope, retry after {retry_after_secs}s")]
    RateLimited {
        scope: RateScope,
        retry_after_secs: u64,
    },

    /// Counter was never seeded for this tenant
    #[error("No counter for {resource} on tenant {tenant_id}")]
    CounterMissing {
        tenant_id: String,
        resource: Resource,
    },
}

impl GovernorError {
    /// HTTP status an upstream layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            GovernorError::QuotaExceeded { .. } => 403,
            GovernorError::RateLimited { .. } => 429,
            GovernorError::CounterMissing { .. } => 500,
        }
    }

    /// `Retry-After` value in whole seconds, only for rate limiting
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            GovernorError::RateLimited {
                retry_after_secs, ..
            } => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, GovernorError::QuotaExceeded { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GovernorError::RateLimited { .. })
    }
}

/// Failure of a request run through the governor
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Rejected by rate limiting or quota
    #[error(transparent)]
    Governor(#[from] GovernorError),

    /// The wrapped operation itself failed
    #[error(transparent)]
    Handler(anyhow::Error),
}

impl RequestError {
    pub fn status_code(&self) -> u16 {
        match self {
            RequestError::Governor(e) => e.status_code(),
            RequestError::Handler(_) => 500,
        }
    }
}
