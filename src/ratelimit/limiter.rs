//! Core rate limiter implementation.

use std::fmt;
use std::hash::Hash;
use std::time::Duration;

use tracing::{debug, trace};

use super::bucket::BucketStore;
use super::caller::CallerId;
use super::clock::{Clock, SystemClock};
use super::decision::{Decision, LimiterStats};
use super::policy::AdmissionPolicy;
use super::quota::QuotaGuard;
use crate::config::LimiterConfig;
use crate::error::Result;

/// Per-caller rolling-window rate limiter with an optional quota ceiling.
///
/// This struct is thread-safe and meant to be shared behind an `Arc`.
/// Each caller's evict → quota → capacity → append sequence runs under the
/// lock of the shard the caller hashes to, so for one caller at most
/// `capacity` (or `quota`, if lower) admissions succeed in any window no
/// matter how calls interleave. Waiters are not served in any particular
/// order.
pub struct RateLimiter<K = CallerId, C = SystemClock> {
    store: BucketStore<K>,
    policy: AdmissionPolicy,
    quota: QuotaGuard,
    clock: C,
}

impl<K> RateLimiter<K, SystemClock>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Create a rate limiter on the wall clock.
    pub fn new(config: &LimiterConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<K, C> RateLimiter<K, C>
where
    K: Eq + Hash + Clone + fmt::Debug,
    C: Clock,
{
    /// Create a rate limiter on a caller-supplied clock.
    pub fn with_clock(config: &LimiterConfig, clock: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: BucketStore::with_shards(config.shards),
            policy: AdmissionPolicy::new(config.capacity, config.window()?),
            quota: QuotaGuard::new(config.quota),
            clock,
        })
    }

    /// Try to admit one request from `caller`.
    ///
    /// Creates the caller's bucket on first use. Records are appended only
    /// when the decision is [`Decision::Admitted`].
    pub fn attempt(&self, caller: &K) -> Decision {
        let now = self.clock.now();
        let mut bucket = self.store.entry(caller);

        let evicted = self.policy.evict(&mut bucket, now);
        let live = bucket.len();

        trace!(
            caller = ?caller,
            live = live,
            evicted = evicted,
            "Checking admission"
        );

        if let Err(exceeded) = self.quota.check(live) {
            debug!(
                caller = ?caller,
                live = live,
                quota = exceeded.quota,
                "Quota exceeded"
            );
            return Decision::QuotaExceeded(exceeded);
        }

        if !self.policy.has_capacity(&bucket) {
            debug!(
                caller = ?caller,
                live = live,
                capacity = self.policy.capacity(),
                "Window capacity exceeded"
            );
            return Decision::WindowExceeded;
        }

        bucket.record(now);
        Decision::Admitted
    }

    /// Live admission count for `caller`.
    ///
    /// Not a pure read: expired records are evicted before counting. An
    /// unseen caller reports 0 and no bucket is created for it.
    pub fn used(&self, caller: &K) -> u64 {
        let now = self.clock.now();
        match self.store.get_mut(caller) {
            Some(mut bucket) => {
                self.policy.evict(&mut bucket, now);
                bucket.len()
            }
            None => 0,
        }
    }

    /// Admissions left in the current window, `capacity - used`, floored at 0.
    ///
    /// Evicts like [`RateLimiter::used`].
    pub fn remaining(&self, caller: &K) -> u64 {
        self.policy.capacity().saturating_sub(self.used(caller))
    }

    /// Configuration and the number of callers with a bucket.
    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            capacity: self.policy.capacity(),
            window_seconds: self.policy.window().as_secs_f64(),
            quota: self.quota.quota(),
            distinct_callers_tracked: self.store.len(),
        }
    }

    /// Evict expired records from every bucket and release their memory.
    ///
    /// Buckets themselves are kept, so caller counts in [`RateLimiter::stats`]
    /// are unaffected, and so is every later decision. Returns the number of
    /// records evicted.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut evicted = 0;
        let mut callers = 0;

        self.store.for_each_mut(|_, bucket| {
            let removed = self.policy.evict(bucket, now);
            if removed > 0 {
                bucket.shrink();
            }
            evicted += removed;
            callers += 1;
        });

        debug!(callers = callers, evicted = evicted, "Swept expired records");
        evicted
    }

    pub fn capacity(&self) -> u64 {
        self.policy.capacity()
    }

    pub fn window(&self) -> Duration {
        self.policy.window()
    }

    pub fn quota(&self) -> Option<u64> {
        self.quota.quota()
    }

    /// Insert records directly, bypassing admission. Used to build states
    /// that `attempt` alone cannot reach, such as more live records than the
    /// capacity allows.
    #[cfg(test)]
    pub(crate) fn plant(&self, caller: &K, recorded: &[Duration]) {
        let mut bucket = self.store.entry(caller);
        for &at in recorded {
            bucket.record(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::quota::QuotaExceeded;
    use rand::seq::SliceRandom;
    use rand::Rng;
    use std::sync::{Arc, Barrier};

    const START: Duration = Duration::from_secs(1_700_000_000);

    fn limiter_config(capacity: u64, window_secs: f64, quota: Option<u64>) -> LimiterConfig {
        LimiterConfig {
            capacity,
            window_secs,
            quota,
            ..LimiterConfig::default()
        }
    }

    fn manual_limiter(
        capacity: u64,
        window_secs: f64,
        quota: Option<u64>,
    ) -> (RateLimiter<i64, ManualClock>, ManualClock) {
        let clock = ManualClock::new(START);
        let limiter =
            RateLimiter::with_clock(&limiter_config(capacity, window_secs, quota), clock.clone())
                .unwrap();
        (limiter, clock)
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter: RateLimiter = RateLimiter::new(&LimiterConfig::default()).unwrap();
        let stats = limiter.stats();

        assert_eq!(stats.capacity, 10);
        assert_eq!(stats.window_seconds, 60.0);
        assert_eq!(stats.quota, None);
        assert_eq!(stats.distinct_callers_tracked, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result: Result<RateLimiter> = RateLimiter::new(&limiter_config(10, -1.0, None));
        assert!(result.is_err());
    }

    #[test]
    fn test_admits_up_to_capacity_then_rejects() {
        for capacity in [1, 3, 10, 100] {
            let (limiter, _) = manual_limiter(capacity, 60.0, None);

            for i in 0..capacity {
                assert_eq!(limiter.attempt(&1), Decision::Admitted, "admission {}", i + 1);
            }
            assert_eq!(limiter.attempt(&1), Decision::WindowExceeded);
            assert_eq!(limiter.used(&1), capacity);
        }
    }

    #[test]
    fn test_zero_capacity_always_rejects() {
        let (limiter, _) = manual_limiter(0, 60.0, None);

        for caller in [1, 2, -1, 0] {
            assert_eq!(limiter.attempt(&caller), Decision::WindowExceeded);
            assert_eq!(limiter.used(&caller), 0);
        }
    }

    #[test]
    fn test_used_is_zero_for_unseen_caller() {
        let (limiter, _) = manual_limiter(10, 60.0, None);

        assert_eq!(limiter.used(&999), 0);
        assert_eq!(limiter.stats().distinct_callers_tracked, 0);
    }

    #[test]
    fn test_used_counts_admissions() {
        let (limiter, _) = manual_limiter(10, 60.0, None);
        for _ in 0..5 {
            let _ = limiter.attempt(&1);
        }

        assert_eq!(limiter.used(&1), 5);
        assert_eq!(limiter.remaining(&1), 5);
    }

    #[test]
    fn test_window_elapsing_readmits_caller() {
        let (limiter, clock) = manual_limiter(10, 60.0, None);

        for _ in 0..10 {
            assert!(limiter.attempt(&1).is_admitted());
        }
        assert_eq!(limiter.attempt(&1), Decision::WindowExceeded);

        clock.advance(Duration::from_secs(70));

        assert_eq!(limiter.attempt(&1), Decision::Admitted);
        assert_eq!(limiter.used(&1), 1);
    }

    #[test]
    fn test_window_rolls_record_by_record() {
        let (limiter, clock) = manual_limiter(2, 60.0, None);

        assert!(limiter.attempt(&1).is_admitted());
        clock.advance(Duration::from_secs(30));
        assert!(limiter.attempt(&1).is_admitted());
        assert_eq!(limiter.attempt(&1), Decision::WindowExceeded);

        // First record is now exactly one window old and has expired.
        clock.advance(Duration::from_secs(30));
        assert_eq!(limiter.used(&1), 1);
        assert!(limiter.attempt(&1).is_admitted());
        assert_eq!(limiter.attempt(&1), Decision::WindowExceeded);
    }

    #[test]
    fn test_used_evicts_expired_records() {
        let (limiter, _) = manual_limiter(10, 60.0, None);
        limiter.plant(
            &1,
            &[
                START - Duration::from_secs(100),
                START - Duration::from_secs(60),
                START - Duration::from_secs(50),
                START - Duration::from_secs(10),
            ],
        );

        // 100s and exactly 60s old are out; 50s and 10s old are live.
        assert_eq!(limiter.used(&1), 2);
        assert_eq!(limiter.remaining(&1), 8);
    }

    #[test]
    fn test_fractional_window() {
        let (limiter, clock) = manual_limiter(1, 0.5, None);

        assert!(limiter.attempt(&1).is_admitted());
        clock.advance(Duration::from_millis(499));
        assert_eq!(limiter.attempt(&1), Decision::WindowExceeded);
        clock.advance(Duration::from_millis(1));
        assert!(limiter.attempt(&1).is_admitted());
    }

    #[test]
    fn test_clock_stepping_back_keeps_records_fresh() {
        let (limiter, clock) = manual_limiter(1, 60.0, None);

        assert!(limiter.attempt(&1).is_admitted());
        clock.set(START - Duration::from_secs(3600));
        assert_eq!(limiter.attempt(&1), Decision::WindowExceeded);
    }

    #[test]
    fn test_quota_preempts_capacity() {
        let (limiter, _) = manual_limiter(10, 60.0, Some(3));

        for _ in 0..3 {
            assert!(limiter.attempt(&1).is_admitted());
        }
        assert_eq!(
            limiter.attempt(&1),
            Decision::QuotaExceeded(QuotaExceeded { quota: 3, used: 3 })
        );
        assert_eq!(limiter.used(&1), 3);
    }

    #[test]
    fn test_quota_equal_to_capacity_fires_first() {
        let (limiter, _) = manual_limiter(5, 60.0, Some(5));

        for _ in 0..5 {
            assert!(limiter.attempt(&1).is_admitted());
        }
        assert!(matches!(limiter.attempt(&1), Decision::QuotaExceeded(_)));
        assert_eq!(limiter.used(&1), 5);
    }

    #[test]
    fn test_quota_above_capacity() {
        let (limiter, _) = manual_limiter(10, 60.0, Some(15));

        for _ in 0..10 {
            assert_eq!(limiter.attempt(&1), Decision::Admitted);
        }
        // 10 < 15, so the window rejects before the quota applies.
        assert_eq!(limiter.attempt(&1), Decision::WindowExceeded);

        let fifteen: Vec<Duration> = (1..=15).map(|s| START - Duration::from_secs(s)).collect();
        limiter.plant(&2, &fifteen);

        assert_eq!(
            limiter.attempt(&2),
            Decision::QuotaExceeded(QuotaExceeded { quota: 15, used: 15 })
        );
    }

    #[test]
    fn test_quota_clears_as_records_expire() {
        let (limiter, clock) = manual_limiter(10, 60.0, Some(2));

        let _ = limiter.attempt(&1);
        let _ = limiter.attempt(&1);
        assert!(limiter.attempt(&1).into_result().is_err());

        clock.advance(Duration::from_secs(60));
        assert_eq!(limiter.attempt(&1).into_result(), Ok(true));
    }

    #[test]
    fn test_quota_propagates_as_error() {
        fn admit(limiter: &RateLimiter<i64, ManualClock>, caller: i64) -> Result<bool> {
            Ok(limiter.attempt(&caller).into_result()?)
        }

        let (limiter, _) = manual_limiter(10, 60.0, Some(1));

        assert!(admit(&limiter, 1).unwrap());
        let err = admit(&limiter, 1).unwrap_err();
        assert!(matches!(
            err,
            crate::error::TurnstileError::QuotaExceeded(QuotaExceeded { quota: 1, used: 1 })
        ));
    }

    #[test]
    fn test_unconventional_callers() {
        let clock = ManualClock::new(START);
        let limiter: RateLimiter<CallerId, ManualClock> =
            RateLimiter::with_clock(&limiter_config(2, 60.0, None), clock).unwrap();

        for caller in [CallerId::Id(-1), CallerId::from(""), CallerId::from("💥 spaces ")] {
            assert_eq!(limiter.attempt(&caller), Decision::Admitted);
            assert_eq!(limiter.attempt(&caller), Decision::Admitted);
            assert_eq!(limiter.attempt(&caller), Decision::WindowExceeded);
            assert_eq!(limiter.used(&caller), 2);
        }
        assert_eq!(limiter.stats().distinct_callers_tracked, 3);
    }

    #[test]
    fn test_callers_are_independent() {
        let (limiter, _) = manual_limiter(2, 60.0, None);

        let _ = limiter.attempt(&1);
        let _ = limiter.attempt(&1);
        assert_eq!(limiter.attempt(&1), Decision::WindowExceeded);

        assert_eq!(limiter.attempt(&2), Decision::Admitted);
        assert_eq!(limiter.used(&2), 1);
    }

    #[test]
    fn test_distinct_callers_never_decreases() {
        let (limiter, clock) = manual_limiter(10, 60.0, None);

        let _ = limiter.attempt(&1);
        assert_eq!(limiter.stats().distinct_callers_tracked, 1);
        let _ = limiter.attempt(&1);
        assert_eq!(limiter.stats().distinct_callers_tracked, 1);
        let _ = limiter.attempt(&2);
        assert_eq!(limiter.stats().distinct_callers_tracked, 2);

        clock.advance(Duration::from_secs(600));
        assert_eq!(limiter.used(&1), 0);
        assert_eq!(limiter.used(&2), 0);
        limiter.sweep();

        assert_eq!(limiter.stats().distinct_callers_tracked, 2);
    }

    #[test]
    fn test_sweep_evicts_without_changing_decisions() {
        let (limiter, clock) = manual_limiter(3, 60.0, None);

        for caller in 0..4 {
            for _ in 0..3 {
                let _ = limiter.attempt(&caller);
            }
        }
        clock.advance(Duration::from_secs(30));
        let _ = limiter.attempt(&10);

        // Nothing has expired yet.
        assert_eq!(limiter.sweep(), 0);
        assert_eq!(limiter.attempt(&0), Decision::WindowExceeded);

        clock.advance(Duration::from_secs(30));
        assert_eq!(limiter.sweep(), 12);
        assert_eq!(limiter.used(&10), 1);
        assert_eq!(limiter.stats().distinct_callers_tracked, 5);
        assert_eq!(limiter.attempt(&0), Decision::Admitted);
    }

    #[test]
    fn test_concurrent_threads_single_caller() {
        for _ in 0..20 {
            let (limiter, _) = manual_limiter(10, 60.0, None);
            let limiter = Arc::new(limiter);
            let barrier = Arc::new(Barrier::new(15));

            let handles: Vec<_> = (0..15)
                .map(|_| {
                    let limiter = Arc::clone(&limiter);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        limiter.attempt(&1)
                    })
                })
                .collect();

            let decisions: Vec<Decision> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();

            let admitted = decisions.iter().filter(|d| d.is_admitted()).count();
            let rejected = decisions
                .iter()
                .filter(|d| **d == Decision::WindowExceeded)
                .count();
            assert_eq!(admitted, 10);
            assert_eq!(rejected, 5);
            assert_eq!(limiter.used(&1), 10);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_tasks_randomized_interleavings() {
        for _ in 0..50 {
            let (limiter, _) = manual_limiter(10, 60.0, None);
            let limiter = Arc::new(limiter);

            let mut delays: Vec<u64> = {
                let mut rng = rand::thread_rng();
                (0..15).map(|_| rng.gen_range(0..200)).collect()
            };
            delays.shuffle(&mut rand::thread_rng());

            let tasks = delays.into_iter().map(|micros| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_micros(micros)).await;
                    limiter.attempt(&1)
                })
            });

            let decisions: Vec<Decision> = futures::future::join_all(tasks)
                .await
                .into_iter()
                .map(|joined| joined.unwrap())
                .collect();

            assert_eq!(decisions.iter().filter(|d| d.is_admitted()).count(), 10);
            assert_eq!(
                decisions
                    .iter()
                    .filter(|d| **d == Decision::WindowExceeded)
                    .count(),
                5
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_independent_callers() {
        let (limiter, _) = manual_limiter(10, 60.0, None);
        let limiter = Arc::new(limiter);

        let tasks = (1..=5).map(|caller| {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                let mut decisions = Vec::new();
                for _ in 0..5 {
                    decisions.push(limiter.attempt(&caller));
                    tokio::task::yield_now().await;
                }
                decisions
            })
        });

        for joined in futures::future::join_all(tasks).await {
            let decisions = joined.unwrap();
            assert!(decisions.iter().all(Decision::is_admitted));
        }
        assert_eq!(limiter.stats().distinct_callers_tracked, 5);
    }

    #[test]
    fn test_concurrent_quota_never_overshoots() {
        let (limiter, _) = manual_limiter(10, 60.0, Some(4));
        let limiter = Arc::new(limiter);
        let barrier = Arc::new(Barrier::new(12));

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    limiter.attempt(&7)
                })
            })
            .collect();

        let decisions: Vec<Decision> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(decisions.iter().filter(|d| d.is_admitted()).count(), 4);
        assert_eq!(
            decisions
                .iter()
                .filter(|d| matches!(d, Decision::QuotaExceeded(_)))
                .count(),
            8
        );
    }
}
