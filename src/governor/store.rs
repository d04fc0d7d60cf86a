//! Resource Counter Store
//!
//! Ground truth for quota state. Counters live in a sharded map so that
//! request handlers touching different tenants never contend on one lock,
//! and every per-key mutation runs under that key's shard lock.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::GovernorError;
use super::plans::{Limit, Resource};

/// Key for a single counter
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CounterKey {
    /// Owning tenant
    pub tenant_id: String,

    /// Metered resource
    pub resource: Resource,
}

impl CounterKey {
    pub fn new(tenant_id: &str, resource: Resource) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            resource,
        }
    }
}

/// Stored usage and limit for one (tenant, resource)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCounter {
    pub count: u64,
    pub limit: Limit,
}

/// Outcome of a successful increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment {
    /// Count before this increment
    pub previous: u64,

    /// Count after this increment
    pub current: u64,

    /// Limit in force when the increment was applied
    pub limit: Limit,
}

/// In-memory counter store
#[derive(Debug, Clone, Default)]
pub struct CounterStore {
    counters: Arc<DashMap<CounterKey, ResourceCounter>>,
}

impl CounterStore {
    /// Create a new counter store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a counter if it exists
    pub fn get(&self, tenant_id: &str, resource: Resource) -> Option<ResourceCounter> {
        self.counters
            .get(&CounterKey::new(tenant_id, resource))
            .map(|c| *c)
    }

    /// Upsert a counter
    pub fn set(&self, tenant_id: &str, resource: Resource, count: u64, limit: Limit) {
        self.counters.insert(
            CounterKey::new(tenant_id, resource),
            ResourceCounter { count, limit },
        );
    }

    /// Insert an empty counter unless one already exists.
    ///
    /// Returns true if the counter was created.
    pub fn seed(&self, tenant_id: &str, resource: Resource, limit: Limit) -> bool {
        let mut created = false;
        self.counters
            .entry(CounterKey::new(tenant_id, resource))
            .or_insert_with(|| {
                created = true;
                ResourceCounter { count: 0, limit }
            });
        created
    }

    /// Replace the limit of a counter, keeping its count
    pub fn set_limit(&self, tenant_id: &str, resource: Resource, limit: Limit) {
        self.counters
            .entry(CounterKey::new(tenant_id, resource))
            .and_modify(|c| c.limit = limit)
            .or_insert(ResourceCounter { count: 0, limit });
    }

    /// Increment the counter if its limit admits one more unit.
    ///
    /// The read, the limit check and the write happen under the key's
    /// shard lock, so concurrent callers can neither lose nor double count
    /// an increment. A rejected increment leaves the counter untouched.
    pub fn compare_and_increment(
        &self,
        tenant_id: &str,
        resource: Resource,
    ) -> Result<Increment, GovernorError> {
        let key = CounterKey::new(tenant_id, resource);
        let Some(mut counter) = self.counters.get_mut(&key) else {
            return Err(GovernorError::CounterMissing {
                tenant_id: key.tenant_id,
                resource,
            });
        };

        if !counter.limit.admits(counter.count) {
            return Err(GovernorError::QuotaExceeded {
                tenant_id: key.tenant_id,
                resource,
                used: counter.count,
                limit: counter.limit.finite().unwrap_or(0),
            });
        }

        let previous = counter.count;
        counter.count = previous.saturating_add(1);

        Ok(Increment {
            previous,
            current: counter.count,
            limit: counter.limit,
        })
    }

    /// Decrement a counter, never going below zero.
    ///
    /// Returns the new count, or `None` if the counter does not exist.
    pub fn decrement(&self, tenant_id: &str, resource: Resource) -> Option<u64> {
        let mut counter = self
            .counters
            .get_mut(&CounterKey::new(tenant_id, resource))?;
        counter.count = counter.count.saturating_sub(1);
        Some(counter.count)
    }

    /// Zero every counter whose key matches, keeping limits.
    ///
    /// Returns the number of counters reset.
    pub fn reset_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CounterKey) -> bool,
    {
        let mut reset = 0;
        for mut entry in self.counters.iter_mut() {
            if predicate(entry.key()) {
                entry.value_mut().count = 0;
                reset += 1;
            }
        }
        reset
    }

    /// Whether the tenant has any counter at all
    pub fn has_tenant(&self, tenant_id: &str) -> bool {
        Resource::ALL
            .iter()
            .any(|r| self.counters.contains_key(&CounterKey::new(tenant_id, *r)))
    }

    /// Tenants with at least one counter, sorted
    pub fn tenants(&self) -> Vec<String> {
        let mut tenants: Vec<String> = self
            .counters
            .iter()
            .map(|e| e.key().tenant_id.clone())
            .collect();
        tenants.sort();
        tenants.dedup();
        tenants
    }

    /// All counters of a tenant
    pub fn tenant_counters(&self, tenant_id: &str) -> Vec<(Resource, ResourceCounter)> {
        Resource::ALL
            .iter()
            .filter_map(|r| self.get(tenant_id, *r).map(|c| (*r, c)))
            .collect()
    }

    /// Number of stored counters
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}
