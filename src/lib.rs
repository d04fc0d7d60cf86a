//! Quota Governor Library
//!
//! Multi-tenant request governor: plan-based resource quotas, sliding-window
//! rate limiting and idempotent response replay, plus the configuration,
//! metrics and HTTP surface the `quota-governor` binary runs with.

pub mod config;
pub mod governor;
pub mod metrics;
pub mod metrics_server;
