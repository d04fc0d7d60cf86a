//! Background Scheduler
//!
//! Owns exactly two timers: the daily quota reset and the periodic sweep of
//! expired idempotency entries and idle rate limit windows. Neither sits
//! between request handlers and the stores.
//!
//! The daily reset re-arms itself for the next UTC midnight after every
//! firing instead of ticking on a fixed period, so a restart never shifts it
//! away from midnight.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::idempotency::IdempotencyCache;
use super::quota::QuotaTracker;
use super::sliding_window::SlidingWindowLimiter;

/// Wall clock the daily reset is scheduled against
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// First UTC midnight strictly after `now`
pub fn next_midnight_after(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .unwrap_or_else(|| now + chrono::Duration::days(1))
}

/// Time left until `target`, zero if it already passed
pub fn duration_until(target: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

/// Handle to the running background tasks.
///
/// Dropping the handle stops both tasks.
#[derive(Debug)]
pub struct SchedulerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Stop both tasks and wait for them to finish
    pub async fn shutdown(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
            let _ = task.await;
        }
        tracing::info!("Governor scheduler stopped");
    }

    /// Whether every task is still running
    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| !t.is_finished())
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Start the daily reset and sweep tasks against the system clock
pub fn start(
    tracker: QuotaTracker,
    cache: IdempotencyCache,
    limiter: SlidingWindowLimiter,
    sweep_interval: Duration,
) -> SchedulerHandle {
    start_with_clock(tracker, cache, limiter, sweep_interval, Arc::new(Utc::now))
}

/// Start the daily reset and sweep tasks, scheduling midnight by `clock`
pub fn start_with_clock(
    tracker: QuotaTracker,
    cache: IdempotencyCache,
    limiter: SlidingWindowLimiter,
    sweep_interval: Duration,
    clock: Clock,
) -> SchedulerHandle {
    tracing::info!(
        sweep_interval_secs = sweep_interval.as_secs(),
        "Starting governor scheduler"
    );

    SchedulerHandle {
        tasks: vec![
            spawn_daily_reset(tracker, clock),
            spawn_sweep(cache, limiter, sweep_interval),
        ],
    }
}

fn spawn_daily_reset(tracker: QuotaTracker, clock: Clock) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut next = next_midnight_after(clock());

        loop {
            let delay = duration_until(next, clock());
            tracing::debug!(at = %next, delay_secs = delay.as_secs(), "Next daily reset scheduled");
            tokio::time::sleep(delay).await;

            tracker.reset_all();

            next = next_midnight_after(next.max(clock()));
        }
    })
}

fn spawn_sweep(
    cache: IdempotencyCache,
    limiter: SlidingWindowLimiter,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            let removed = cache.sweep();
            let windows = limiter.sweep();
            tracing::debug!(
                removed,
                remaining = cache.len(),
                windows,
                tracked_windows = limiter.tracked_keys(),
                "Governor sweep completed"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::directory::StaticTenantDirectory;
    use crate::governor::events::BroadcastPublisher;
    use crate::governor::plans::Resource;
    use crate::governor::sliding_window::{RateKey, RateScope};
    use crate::governor::store::CounterStore;
    use chrono::TimeZone;
    use std::net::{IpAddr, Ipv4Addr};

    fn tracker() -> QuotaTracker {
        QuotaTracker::new(
            CounterStore::new(),
            Arc::new(StaticTenantDirectory::new()),
            Arc::new(BroadcastPublisher::default()),
            vec![80, 95],
        )
    }

    #[test]
    fn test_next_midnight_mid_day() {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap();
        let next = next_midnight_after(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap());
        assert_eq!(duration_until(next, now), Duration::from_secs(8 * 3600 + 50 * 60 + 34));
    }

    #[test]
    fn test_next_midnight_at_midnight_is_next_day() {
        let midnight = Utc.with_ymd_and_hms(2026, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(
            next_midnight_after(midnight),
            Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_duration_until_past_target() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 1).unwrap();
        let target = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(duration_until(target, now), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_sweep_task_removes_expired_entries() {
        let cache = IdempotencyCache::new(Duration::from_millis(20));
        cache.store("a", "1");
        cache.store("b", "2");

        let limiter = SlidingWindowLimiter::new(Duration::from_millis(20), 5, 5);
        let caller = RateKey::for_caller(None, IpAddr::V4(Ipv4Addr::LOCALHOST));
        limiter.check(RateScope::Api, &caller).unwrap();

        let handle = start(tracker(), cache.clone(), limiter.clone(), Duration::from_millis(50));
        assert!(handle.is_running());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.is_empty());
        assert_eq!(limiter.tracked_keys(), 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_tasks() {
        let cache = IdempotencyCache::new(Duration::from_millis(10));
        let limiter = SlidingWindowLimiter::new(Duration::from_millis(10), 5, 5);
        let handle = start(tracker(), cache.clone(), limiter, Duration::from_millis(20));
        drop(handle);

        cache.store("late", "1");
        tokio::time::sleep(Duration::from_millis(80)).await;
        // No sweep ran, so the expired entry is still stored
        assert_eq!(cache.len(), 1);
        assert!(!cache.check("late").is_hit());
    }

    /// Wall clock that follows tokio's paused time from a fixed start
    fn paused_clock(start: DateTime<Utc>) -> Clock {
        let origin = Instant::now();
        Arc::new(move || {
            let elapsed = Instant::now().duration_since(origin);
            start + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
        })
    }

    async fn messages_used(tracker: &QuotaTracker) -> u64 {
        tracker.check("acme", Resource::MessagesToday).await.used()
    }

    #[tokio::test(start_paused = true)]
    async fn test_daily_reset_fires_at_midnight_and_rearms() {
        let tracker = tracker();
        for _ in 0..5 {
            tracker.increment("acme", Resource::MessagesToday).await.unwrap();
        }
        tracker.increment("acme", Resource::Agents).await.unwrap();

        // One hour before midnight UTC
        let clock = paused_clock(Utc.with_ymd_and_hms(2026, 3, 14, 23, 0, 0).unwrap());
        let handle = start_with_clock(
            tracker.clone(),
            IdempotencyCache::new(Duration::from_secs(300)),
            SlidingWindowLimiter::new(Duration::from_secs(60), 5, 5),
            Duration::from_secs(600),
            clock,
        );

        tokio::time::sleep(Duration::from_secs(3599)).await;
        assert_eq!(messages_used(&tracker).await, 5);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(messages_used(&tracker).await, 0);
        assert_eq!(tracker.check("acme", Resource::Agents).await.used(), 1);

        // Re-armed for the following midnight
        tracker.increment("acme", Resource::MessagesToday).await.unwrap();
        tokio::time::sleep(Duration::from_secs(23 * 3600)).await;
        assert_eq!(messages_used(&tracker).await, 1);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(messages_used(&tracker).await, 0);
        assert!(handle.is_running());

        handle.shutdown().await;
    }
}
