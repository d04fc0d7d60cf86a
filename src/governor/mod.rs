//! Multi-Tenant Request Governor
//!
//! Decides, per request, whether the caller may proceed: plan quotas per
//! tenant, sliding-window rate limits per caller, and idempotent replay of
//! responses for retried requests.
//!
//! # Features
//!
//! - Plan-based resource quotas with lazy tenant seeding
//! - One-shot warnings when usage crosses 80% and 95% of a limit
//! - Sliding-window rate limiting for the auth and api scopes
//! - Idempotency cache with TTL, lazy expiry and periodic sweep
//! - Idle rate limit windows dropped by the same sweep
//! - Daily reset of `messages_today` at UTC midnight
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Governor                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ Sliding      │  │ Idempotency  │  │ Quota        │       │
//! │  │ Window       │  │ Cache        │  │ Tracker      │       │
//! │  └──────────────┘  └──────────────┘  └──────┬───────┘       │
//! │                                             │               │
//! │                                      ┌──────┴───────┐       │
//! │                                      │ Counter Store│       │
//! │                                      └──────────────┘       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scheduler: daily reset ─── idempotency + window sweep      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod dashboard;
pub mod directory;
pub mod error;
pub mod events;
pub mod idempotency;
pub mod manager;
pub mod plans;
pub mod quota;
pub mod scheduler;
pub mod sliding_window;
pub mod store;

pub use config::GovernorConfig;
pub use dashboard::{DashboardBuilder, DashboardData};
pub use directory::{StaticTenantDirectory, TenantDirectory, TenantEntry};
pub use error::{GovernorError, RequestError};
pub use events::{BroadcastPublisher, EventPublisher, GovernorEvent};
pub use idempotency::{IdempotencyCache, IdempotencyLookup};
pub use manager::{GovernedRequest, Governor};
pub use plans::{Limit, PlanLimits, Resource};
pub use quota::{QuotaTracker, Reservation, UsageSnapshot};
pub use scheduler::SchedulerHandle;
pub use sliding_window::{RateKey, RateScope, SlidingWindowLimiter};
pub use store::CounterStore;
