//! Governor
//!
//! Owns the quota tracker, the sliding window limiter and the idempotency
//! cache, and runs a request through them in order.

use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;

use super::config::GovernorConfig;
use super::directory::TenantDirectory;
use super::error::{GovernorError, RequestError};
use super::events::EventPublisher;
use super::idempotency::{IdempotencyCache, IdempotencyLookup};
use super::plans::Resource;
use super::quota::QuotaTracker;
use super::scheduler::{self, SchedulerHandle};
use super::sliding_window::{RateKey, RateScope, SlidingWindowLimiter};
use super::store::CounterStore;

/// What the governor needs to know about an inbound request
#[derive(Debug, Clone)]
pub struct GovernedRequest<'a> {
    /// Rate-limit scope of the endpoint
    pub scope: RateScope,

    /// Caller identity for rate limiting
    pub rate_key: RateKey,

    /// Caller-supplied idempotency key, if any
    pub idempotency_key: Option<&'a str>,

    /// Tenant and resource charged when the operation succeeds
    pub metered: Option<(&'a str, Resource)>,
}

impl<'a> GovernedRequest<'a> {
    pub fn new(scope: RateScope, rate_key: RateKey) -> Self {
        Self {
            scope,
            rate_key,
            idempotency_key: None,
            metered: None,
        }
    }

    pub fn idempotency_key(mut self, key: &'a str) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    pub fn metered(mut self, tenant_id: &'a str, resource: Resource) -> Self {
        self.metered = Some((tenant_id, resource));
        self
    }
}

/// Multi-tenant request governor
#[derive(Clone)]
pub struct Governor {
    config: GovernorConfig,
    quota: QuotaTracker,
    limiter: SlidingWindowLimiter,
    idempotency: IdempotencyCache,
}

impl Governor {
    /// Create a governor wired to the given collaborators
    pub fn new(
        config: GovernorConfig,
        directory: Arc<dyn TenantDirectory>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let quota = QuotaTracker::new(
            CounterStore::new(),
            directory,
            publisher,
            config.thresholds(),
        );
        Self {
            limiter: SlidingWindowLimiter::from_config(&config),
            idempotency: IdempotencyCache::from_config(&config),
            quota,
            config,
        }
    }

    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    pub fn idempotency(&self) -> &IdempotencyCache {
        &self.idempotency
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Start the daily reset and the idempotency and rate window sweep
    pub fn start_scheduler(&self) -> SchedulerHandle {
        scheduler::start(
            self.quota.clone(),
            self.idempotency.clone(),
            self.limiter.clone(),
            self.config.sweep_interval(),
        )
    }

    /// Run a request through rate limiting, idempotent replay and metering.
    ///
    /// A replayed response skips `handler` entirely. For a metered request the
    /// quota unit is reserved before `handler` runs, committed if it succeeds
    /// and released if it fails, so only successful operations stay counted
    /// and only they send threshold warnings. Only successful responses are
    /// stored for replay.
    pub async fn govern<F, Fut>(
        &self,
        request: &GovernedRequest<'_>,
        handler: F,
    ) -> Result<Bytes, RequestError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Bytes>>,
    {
        self.limiter.check(request.scope, &request.rate_key)?;

        if let Some(key) = request.idempotency_key {
            if let IdempotencyLookup::Hit(response) = self.idempotency.check(key) {
                tracing::debug!(key, "Replaying idempotent response");
                return Ok(response);
            }
        }

        let reservation = match request.metered {
            Some((tenant_id, resource)) => Some(self.quota.reserve(tenant_id, resource).await?),
            None => None,
        };

        let response = match handler().await {
            Ok(response) => response,
            Err(e) => {
                if let Some(reservation) = reservation {
                    self.quota.release(reservation);
                }
                return Err(RequestError::Handler(e));
            }
        };

        if let Some(reservation) = reservation {
            self.quota.commit(reservation);
        }

        if let Some(key) = request.idempotency_key {
            self.idempotency.store(key, response.clone());
        }

        Ok(response)
    }

    /// Rate-limit a caller without running the rest of the pipeline
    pub fn admit(&self, scope: RateScope, key: &RateKey) -> Result<(), GovernorError> {
        self.limiter.check(scope, key)
    }
}
