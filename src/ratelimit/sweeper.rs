//! Background sweep of expired records.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, trace};

use super::clock::Clock;
use super::limiter::RateLimiter;

/// Spawn a task that calls [`RateLimiter::sweep`] every `period`.
///
/// Only memory is affected; admission decisions are the same with or
/// without the sweeper. The task runs until aborted.
pub fn spawn_sweeper<K, C>(limiter: Arc<RateLimiter<K, C>>, period: Duration) -> JoinHandle<()>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static,
    C: Clock + 'static,
{
    info!(period_secs = period.as_secs_f64(), "Starting record sweeper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = limiter.sweep();
            trace!(evicted = evicted, "Sweep tick");
        }
    })
}
