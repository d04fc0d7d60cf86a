//! Governor Dashboard
//!
//! Read-only snapshot of the governor's state for operators.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::config::GovernorConfig;
use super::manager::Governor;
use super::plans::{self, Limit, Resource};
use super::quota::UsageSnapshot;

/// Dashboard data for the admin endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardData {
    /// Timestamp of data generation
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Summary statistics
    pub summary: GovernorSummary,

    /// Per-tenant usage, sorted by tenant id
    pub tenants: Vec<TenantUsage>,

    /// Plan table
    pub plans: Vec<PlanView>,

    /// Current configuration
    pub config: GovernorConfig,
}

/// Totals across the three stores
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorSummary {
    /// Tenants with seeded counters
    pub tracked_tenants: usize,

    /// Resource counters in the store
    pub counters: usize,

    /// Counters at or above their finite limit
    pub counters_at_limit: usize,

    /// Caller windows tracked by the rate limiter
    pub rate_windows: usize,

    /// Idempotency entries, including expired ones not yet swept
    pub idempotency_entries: usize,
}

/// Usage of one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUsage {
    pub tenant_id: String,
    pub usage: BTreeMap<Resource, UsageSnapshot>,
}

/// Serializable view of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanView {
    pub name: String,
    pub limits: BTreeMap<Resource, Limit>,
}

/// Dashboard builder for constructing dashboard data
pub struct DashboardBuilder<'a> {
    governor: &'a Governor,
}

impl<'a> DashboardBuilder<'a> {
    pub fn new(governor: &'a Governor) -> Self {
        Self { governor }
    }

    /// Build dashboard data
    pub fn build(&self) -> DashboardData {
        let tenants: Vec<TenantUsage> = self
            .governor
            .quota()
            .tracked_tenants()
            .into_iter()
            .map(|tenant_id| TenantUsage {
                usage: self.governor.quota().get_usage(&tenant_id),
                tenant_id,
            })
            .collect();

        let summary = self.build_summary(&tenants);

        DashboardData {
            timestamp: chrono::Utc::now(),
            summary,
            tenants,
            plans: plans::all_plans()
                .into_iter()
                .map(|p| PlanView {
                    name: p.name.to_string(),
                    limits: p.limits.clone(),
                })
                .collect(),
            config: self.governor.config().clone(),
        }
    }

    fn build_summary(&self, tenants: &[TenantUsage]) -> GovernorSummary {
        let counters_at_limit = tenants
            .iter()
            .flat_map(|t| t.usage.values())
            .filter(|u| matches!(u, UsageSnapshot::Limited { limit, remaining: 0, .. } if *limit > 0))
            .count();

        GovernorSummary {
            tracked_tenants: tenants.len(),
            counters: self.governor.quota().store().len(),
            counters_at_limit,
            rate_windows: self.governor.limiter().tracked_keys(),
            idempotency_entries: self.governor.idempotency().len(),
        }
    }
}
