//! Quota Tracker
//!
//! Plan-aware metering on top of the [`CounterStore`]. A tenant's counters
//! are seeded from its plan the first time the tenant is touched; after that
//! the tracker never calls the tenant directory on the hot path again,
//! except to address a quota warning.
//!
//! A metered operation that may still fail takes its unit with
//! [`QuotaTracker::reserve`] and then either commits or releases it.
//! Threshold warnings are only sent on commit.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::directory::TenantDirectory;
use super::error::GovernorError;
use super::events::{fleet_topic, EventPublisher, GovernorEvent};
use super::plans::{self, Limit, Resource, DEFAULT_PLAN};
use super::store::{CounterStore, Increment, ResourceCounter};
use crate::metrics;

/// Point-in-time usage of one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UsageSnapshot {
    Limited { used: u64, limit: u64, remaining: u64 },
    Unlimited { used: u64 },
}

impl UsageSnapshot {
    /// Snapshot for a resource that has no counter yet
    pub fn uninitialized() -> Self {
        UsageSnapshot::Limited {
            used: 0,
            limit: 0,
            remaining: 0,
        }
    }

    pub fn used(&self) -> u64 {
        match self {
            UsageSnapshot::Limited { used, .. } | UsageSnapshot::Unlimited { used } => *used,
        }
    }
}

impl From<ResourceCounter> for UsageSnapshot {
    fn from(counter: ResourceCounter) -> Self {
        match counter.limit {
            Limit::Finite(limit) => UsageSnapshot::Limited {
                used: counter.count,
                limit,
                remaining: limit.saturating_sub(counter.count),
            },
            Limit::Unlimited => UsageSnapshot::Unlimited {
                used: counter.count,
            },
        }
    }
}

/// Thresholds crossed upward by a single increment.
///
/// A threshold `t` is crossed when the usage before the increment was below
/// `t` percent of the limit and the usage after it is at or above. Only
/// finite, positive limits can cross.
pub fn crossed_thresholds(thresholds: &[u8], increment: &Increment) -> Vec<u8> {
    let Some(limit) = increment.limit.finite().filter(|l| *l > 0) else {
        return Vec::new();
    };
    let before = increment.previous as u128 * 100;
    let after = increment.current as u128 * 100;

    thresholds
        .iter()
        .copied()
        .filter(|t| {
            let bound = *t as u128 * limit as u128;
            before < bound && after >= bound
        })
        .collect()
}

/// A quota unit taken ahead of the operation it pays for
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a reservation must be committed or released"]
pub struct Reservation {
    tenant_id: String,
    resource: Resource,
    increment: Increment,
}

impl Reservation {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }

    /// Count including the reserved unit
    pub fn count(&self) -> u64 {
        self.increment.current
    }
}

/// Plan-aware quota tracker
#[derive(Clone)]
pub struct QuotaTracker {
    store: CounterStore,
    directory: Arc<dyn TenantDirectory>,
    publisher: Arc<dyn EventPublisher>,
    thresholds: Vec<u8>,
    seeding: Arc<DashMap<String, Arc<OnceCell<()>>>>,
}

impl QuotaTracker {
    pub fn new(
        store: CounterStore,
        directory: Arc<dyn TenantDirectory>,
        publisher: Arc<dyn EventPublisher>,
        thresholds: Vec<u8>,
    ) -> Self {
        Self {
            store,
            directory,
            publisher,
            thresholds,
            seeding: Arc::new(DashMap::new()),
        }
    }

    /// Count one unit of `resource` for the tenant.
    ///
    /// Seeds the tenant from its plan on first touch and retries exactly
    /// once. Returns the new count, or `QuotaExceeded` without changing the
    /// stored count.
    pub async fn increment(&self, tenant_id: &str, resource: Resource) -> Result<u64, GovernorError> {
        let reservation = self.reserve(tenant_id, resource).await?;
        Ok(self.commit(reservation))
    }

    /// Take one unit of `resource` without sending any warning yet.
    ///
    /// The unit counts against the limit right away. Pass the reservation
    /// to [`commit`](Self::commit) once the operation succeeded, or to
    /// [`release`](Self::release) to give the unit back.
    pub async fn reserve(&self, tenant_id: &str, resource: Resource) -> Result<Reservation, GovernorError> {
        let outcome = match self.store.compare_and_increment(tenant_id, resource) {
            Err(GovernorError::CounterMissing { .. }) => {
                self.seed_tenant(tenant_id).await;
                self.store.compare_and_increment(tenant_id, resource)
            }
            other => other,
        };

        match outcome {
            Ok(increment) => Ok(Reservation {
                tenant_id: tenant_id.to_string(),
                resource,
                increment,
            }),
            Err(err) => {
                if let GovernorError::QuotaExceeded { used, limit, .. } = &err {
                    tracing::debug!(tenant_id, %resource, used, limit, "Quota exceeded");
                    metrics::QUOTA_EXCEEDED_TOTAL
                        .with_label_values(&[resource.as_str()])
                        .inc();
                }
                Err(err)
            }
        }
    }

    /// Keep a reserved unit and warn for every threshold it crossed
    pub fn commit(&self, reservation: Reservation) -> u64 {
        self.notify_crossings(
            &reservation.tenant_id,
            reservation.resource,
            &reservation.increment,
        );
        reservation.increment.current
    }

    /// Give a reserved unit back without warning
    pub fn release(&self, reservation: Reservation) {
        self.decrement(&reservation.tenant_id, reservation.resource);
    }

    /// Release one unit of `resource`; never fails and never goes below zero
    pub fn decrement(&self, tenant_id: &str, resource: Resource) {
        if self.store.decrement(tenant_id, resource).is_none() {
            tracing::debug!(tenant_id, %resource, "Decrement on untracked counter ignored");
        }
    }

    /// Current usage of one resource, seeding the tenant if needed
    pub async fn check(&self, tenant_id: &str, resource: Resource) -> UsageSnapshot {
        if let Some(counter) = self.store.get(tenant_id, resource) {
            return counter.into();
        }

        self.seed_tenant(tenant_id).await;
        self.store
            .get(tenant_id, resource)
            .map(UsageSnapshot::from)
            .unwrap_or_else(UsageSnapshot::uninitialized)
    }

    /// Usage of every metered resource without seeding
    pub fn get_usage(&self, tenant_id: &str) -> BTreeMap<Resource, UsageSnapshot> {
        Resource::ALL
            .iter()
            .map(|r| {
                let snapshot = self
                    .store
                    .get(tenant_id, *r)
                    .map(UsageSnapshot::from)
                    .unwrap_or_else(UsageSnapshot::uninitialized);
                (*r, snapshot)
            })
            .collect()
    }

    /// Apply a plan's limits to the tenant, keeping current counts
    pub fn set_plan_limits(&self, tenant_id: &str, plan: &str) {
        let limits = plans::plan_or_default(plan);
        for (resource, limit) in &limits.limits {
            self.store.set_limit(tenant_id, *resource, *limit);
        }
        tracing::info!(tenant_id, plan = limits.name, "Applied plan limits");
    }

    /// Zero the time-windowed resources of one tenant
    pub fn reset_daily(&self, tenant_id: &str) -> usize {
        self.store
            .reset_where(|k| k.tenant_id == tenant_id && k.resource.is_daily())
    }

    /// Zero the time-windowed resources of every tracked tenant
    pub fn reset_all(&self) -> usize {
        let reset = self.store.reset_where(|k| k.resource.is_daily());
        metrics::DAILY_RESETS_TOTAL.inc();
        tracing::info!(counters = reset, "Daily quota reset");
        reset
    }

    /// Tenants the tracker has counters for
    pub fn tracked_tenants(&self) -> Vec<String> {
        self.store.tenants()
    }

    pub fn store(&self) -> &CounterStore {
        &self.store
    }

    /// Seed the tenant's counters from its plan.
    ///
    /// Concurrent first touches of one tenant share a single directory
    /// lookup.
    async fn seed_tenant(&self, tenant_id: &str) {
        let cell = self.seeding.entry(tenant_id.to_string()).or_default().clone();
        cell.get_or_init(|| self.lookup_and_seed(tenant_id)).await;
        self.seeding
            .remove_if(tenant_id, |_, current| Arc::ptr_eq(current, &cell));
    }

    async fn lookup_and_seed(&self, tenant_id: &str) {
        if Resource::ALL
            .iter()
            .all(|r| self.store.get(tenant_id, *r).is_some())
        {
            return;
        }

        let plan_name = match self.directory.plan_for(tenant_id).await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(tenant_id, error = %e, "Tenant lookup failed, applying {}", DEFAULT_PLAN);
                metrics::PLAN_FALLBACKS_TOTAL.inc();
                DEFAULT_PLAN.to_string()
            }
        };

        let limits = plans::plan_or_default(&plan_name);
        let mut created = 0usize;
        for (resource, limit) in &limits.limits {
            if self.store.seed(tenant_id, *resource, *limit) {
                created += 1;
            }
        }

        if created > 0 {
            metrics::TENANT_SEEDS_TOTAL.inc();
            tracing::debug!(tenant_id, plan = limits.name, created, "Seeded tenant counters");
        }
    }

    /// Publish a warning for every threshold this increment crossed.
    ///
    /// Delivery runs on a separate task so the caller never waits on the
    /// directory or the event channel.
    fn notify_crossings(&self, tenant_id: &str, resource: Resource, increment: &Increment) {
        let crossed = crossed_thresholds(&self.thresholds, increment);
        if crossed.is_empty() {
            return;
        }
        let Some(limit) = increment.limit.finite() else {
            return;
        };

        for threshold in &crossed {
            let threshold = threshold.to_string();
            metrics::QUOTA_WARNINGS_TOTAL
                .with_label_values(&[resource.as_str(), threshold.as_str()])
                .inc();
        }

        let directory = Arc::clone(&self.directory);
        let publisher = Arc::clone(&self.publisher);
        let tenant_id = tenant_id.to_string();
        let used = increment.current;

        tokio::spawn(async move {
            let fleets = match directory.fleets_for(&tenant_id).await {
                Ok(fleets) => fleets,
                Err(e) => {
                    tracing::warn!(tenant_id = %tenant_id, error = %e, "Fleet lookup failed, quota warning dropped");
                    return;
                }
            };
            if fleets.is_empty() {
                tracing::debug!(tenant_id = %tenant_id, "No fleets to notify of quota warning");
            }

            for threshold in crossed {
                let event = GovernorEvent::QuotaWarning {
                    tenant_id: tenant_id.clone(),
                    resource,
                    used,
                    limit,
                    threshold,
                };
                for fleet in &fleets {
                    if let Err(e) = publisher.publish(&fleet_topic(fleet), event.clone()).await {
                        tracing::warn!(
                            tenant_id = %tenant_id,
                            fleet = %fleet,
                            error = %e,
                            "Failed to publish quota warning"
                        );
                    }
                }
            }
        });
    }
}
