//! Plan Limits
//!
//! The plan table is compiled in and never mutated at runtime. Every plan
//! names a limit for every [`Resource`].

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Plan applied when a tenant's plan is unknown or cannot be looked up
pub const DEFAULT_PLAN: &str = "free";

/// Metered resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    /// Connected agents
    Agents,
    /// Fleets (agent groups)
    Fleets,
    /// Team members
    Members,
    /// Messages sent since the last UTC midnight
    MessagesToday,
}

impl Resource {
    pub const ALL: [Resource; 4] = [
        Resource::Agents,
        Resource::Fleets,
        Resource::Members,
        Resource::MessagesToday,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Agents => "agents",
            Resource::Fleets => "fleets",
            Resource::Members => "members",
            Resource::MessagesToday => "messages_today",
        }
    }

    /// Whether the daily reset zeroes this resource
    pub fn is_daily(&self) -> bool {
        matches!(self, Resource::MessagesToday)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resource limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limit {
    Finite(u64),
    Unlimited,
}

impl Limit {
    /// Whether one more unit fits on top of `count`
    pub fn admits(&self, count: u64) -> bool {
        match self {
            Limit::Finite(limit) => count < *limit,
            Limit::Unlimited => true,
        }
    }

    pub fn finite(&self) -> Option<u64> {
        match self {
            Limit::Finite(limit) => Some(*limit),
            Limit::Unlimited => None,
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limit::Finite(limit) => write!(f, "{}", limit),
            Limit::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Limits for a single plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanLimits {
    pub name: &'static str,
    pub limits: BTreeMap<Resource, Limit>,
}

impl PlanLimits {
    fn new(name: &'static str, agents: Limit, fleets: Limit, members: Limit, messages: Limit) -> Self {
        let limits = BTreeMap::from([
            (Resource::Agents, agents),
            (Resource::Fleets, fleets),
            (Resource::Members, members),
            (Resource::MessagesToday, messages),
        ]);
        Self { name, limits }
    }

    /// Limit for a resource (every plan lists every resource)
    pub fn limit(&self, resource: Resource) -> Limit {
        self.limits
            .get(&resource)
            .copied()
            .unwrap_or(Limit::Finite(0))
    }
}

lazy_static! {
    static ref PLANS: HashMap<&'static str, PlanLimits> = {
        use Limit::{Finite, Unlimited};
        HashMap::from([
            ("free", PlanLimits::new("free", Finite(3), Finite(1), Finite(3), Finite(1_000))),
            ("team", PlanLimits::new("team", Finite(50), Finite(10), Finite(25), Finite(100_000))),
            (
                "enterprise",
                PlanLimits::new("enterprise", Unlimited, Unlimited, Unlimited, Unlimited),
            ),
        ])
    };
}

/// Look up a plan by name
pub fn plan(name: &str) -> Option<&'static PlanLimits> {
    PLANS.get(name)
}

/// Look up a plan by name, falling back to [`DEFAULT_PLAN`]
pub fn plan_or_default(name: &str) -> &'static PlanLimits {
    match plan(name) {
        Some(limits) => limits,
        None => {
            tracing::warn!(plan = name, "Unknown plan, applying {}", DEFAULT_PLAN);
            &PLANS[DEFAULT_PLAN]
        }
    }
}

/// All plans ordered by name
pub fn all_plans() -> Vec<&'static PlanLimits> {
    let mut plans: Vec<_> = PLANS.values().collect();
    plans.sort_by_key(|p| p.name);
    plans
}
