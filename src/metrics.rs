// Prometheus metrics for the quota governor
//
// Exposes metrics on /metrics HTTP endpoint:
// - Quota rejections and threshold warnings (counters)
// - Rate limit admissions, rejections and window sweeps (counters)
// - Idempotency hits, misses and sweeps (counters)
// - Live idempotency entries (gauge)
// - Daily resets, tenant seeds and plan fallbacks (counters)

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Quota metrics
    pub static ref QUOTA_EXCEEDED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("governor_quota_exceeded_total", "Increments rejected because the resource was at its limit"),
        &["resource"]
    ).expect("Failed to create quota exceeded metric");

    pub static ref QUOTA_WARNINGS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("governor_quota_warnings_total", "Upward threshold crossings that produced a quota warning"),
        &["resource", "threshold"]
    ).expect("Failed to create quota warnings metric");

    pub static ref TENANT_SEEDS_TOTAL: IntCounter = IntCounter::new(
        "governor_tenant_seeds_total",
        "Tenants whose counters were seeded from their plan"
    ).expect("Failed to create tenant seeds metric");

    pub static ref PLAN_FALLBACKS_TOTAL: IntCounter = IntCounter::new(
        "governor_plan_fallbacks_total",
        "Tenant lookups that failed and fell back to the default plan"
    ).expect("Failed to create plan fallbacks metric");

    pub static ref DAILY_RESETS_TOTAL: IntCounter = IntCounter::new(
        "governor_daily_resets_total",
        "Daily resets of time-windowed resources"
    ).expect("Failed to create daily resets metric");

    // Rate limit metrics
    pub static ref RATE_ADMITTED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("governor_rate_admitted_total", "Requests admitted by the sliding window limiter"),
        &["scope"]
    ).expect("Failed to create rate admitted metric");

    pub static ref RATE_LIMITED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("governor_rate_limited_total", "Requests rejected by the sliding window limiter"),
        &["scope"]
    ).expect("Failed to create rate limited metric");

    pub static ref RATE_WINDOWS_SWEPT_TOTAL: IntCounter = IntCounter::new(
        "governor_rate_windows_swept_total",
        "Idle rate limit windows removed by the periodic sweep"
    ).expect("Failed to create rate windows swept metric");

    // Idempotency metrics
    pub static ref IDEMPOTENCY_HITS_TOTAL: IntCounter = IntCounter::new(
        "governor_idempotency_hits_total",
        "Idempotency lookups that replayed a stored response"
    ).expect("Failed to create idempotency hits metric");

    pub static ref IDEMPOTENCY_MISSES_TOTAL: IntCounter = IntCounter::new(
        "governor_idempotency_misses_total",
        "Idempotency lookups with no live entry"
    ).expect("Failed to create idempotency misses metric");

    pub static ref IDEMPOTENCY_SWEPT_TOTAL: IntCounter = IntCounter::new(
        "governor_idempotency_swept_total",
        "Expired idempotency entries removed by the periodic sweep"
    ).expect("Failed to create idempotency swept metric");

    pub static ref IDEMPOTENCY_ENTRIES: IntGauge = IntGauge::new(
        "governor_idempotency_entries",
        "Idempotency entries currently stored"
    ).expect("Failed to create idempotency entries metric");
}

/// Initialize metrics registry - must be called once at startup
pub fn init() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(QUOTA_EXCEEDED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUOTA_WARNINGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TENANT_SEEDS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PLAN_FALLBACKS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DAILY_RESETS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_ADMITTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_LIMITED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RATE_WINDOWS_SWEPT_TOTAL.clone()))?;
    REGISTRY.register(Box::new(IDEMPOTENCY_HITS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(IDEMPOTENCY_MISSES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(IDEMPOTENCY_SWEPT_TOTAL.clone()))?;
    REGISTRY.register(Box::new(IDEMPOTENCY_ENTRIES.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
