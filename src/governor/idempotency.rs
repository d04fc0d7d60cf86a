//! Idempotency Cache
//!
//! Replays a previously computed response for a retried request carrying the
//! same idempotency key. Entries expire lazily on access and are swept
//! periodically by the scheduler.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::GovernorConfig;
use crate::metrics;

/// Result of an idempotency lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyLookup {
    /// The stored response, byte for byte
    Hit(Bytes),
    /// No live entry; the caller should execute the request
    Miss,
}

impl IdempotencyLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, IdempotencyLookup::Hit(_))
    }
}

#[derive(Debug, Clone)]
struct IdempotencyEntry {
    response: Bytes,
    expires_at: Instant,
}

/// TTL-keyed response cache
#[derive(Debug, Clone)]
pub struct IdempotencyCache {
    entries: Arc<DashMap<String, IdempotencyEntry>>,
    ttl: Duration,
}

impl IdempotencyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn from_config(config: &GovernorConfig) -> Self {
        Self::new(config.idempotency_ttl())
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a stored response
    pub fn check(&self, key: &str) -> IdempotencyLookup {
        self.check_at(key, Instant::now())
    }

    /// Look up a stored response as of `now`.
    ///
    /// An expired entry is removed on the spot. Removal is conditional on the
    /// entry still being expired, so a concurrent `store` is never dropped.
    pub fn check_at(&self, key: &str, now: Instant) -> IdempotencyLookup {
        let live = self.entries.get(key).map(|entry| {
            if now < entry.expires_at {
                Some(entry.response.clone())
            } else {
                None
            }
        });

        match live {
            Some(Some(response)) => {
                metrics::IDEMPOTENCY_HITS_TOTAL.inc();
                IdempotencyLookup::Hit(response)
            }
            Some(None) => {
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.expires_at <= now)
                    .is_some()
                {
                    metrics::IDEMPOTENCY_ENTRIES.dec();
                }
                tracing::debug!(key, "Idempotency entry expired");
                metrics::IDEMPOTENCY_MISSES_TOTAL.inc();
                IdempotencyLookup::Miss
            }
            None => {
                metrics::IDEMPOTENCY_MISSES_TOTAL.inc();
                IdempotencyLookup::Miss
            }
        }
    }

    /// Store a response, replacing any previous one for the key
    pub fn store(&self, key: &str, response: impl Into<Bytes>) {
        self.store_at(key, response, Instant::now());
    }

    pub fn store_at(&self, key: &str, response: impl Into<Bytes>, now: Instant) {
        let entry = IdempotencyEntry {
            response: response.into(),
            expires_at: now + self.ttl,
        };
        if self.entries.insert(key.to_string(), entry).is_none() {
            metrics::IDEMPOTENCY_ENTRIES.inc();
        }
    }

    /// Remove every expired entry, returning how many were removed
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut removed = 0usize;
        self.entries.retain(|_, entry| {
            let live = entry.expires_at > now;
            if !live {
                removed += 1;
            }
            live
        });

        metrics::IDEMPOTENCY_ENTRIES.sub(removed as i64);
        metrics::IDEMPOTENCY_SWEPT_TOTAL.inc_by(removed as u64);
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
