//! Rolling-window admission policy.

use std::time::Duration;

use super::bucket::Bucket;

/// Evicts expired records and checks the rolling-window capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    capacity: u64,
    window: Duration,
}

impl AdmissionPolicy {
    pub fn new(capacity: u64, window: Duration) -> Self {
        Self { capacity, window }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a record taken at `recorded` is still inside the window at `now`.
    ///
    /// A record from the future (clock stepped back) counts as fresh.
    pub fn is_fresh(&self, recorded: Duration, now: Duration) -> bool {
        now.saturating_sub(recorded) < self.window
    }

    /// Drop every record that has left the window as of `now`.
    ///
    /// Returns the number of records evicted.
    pub fn evict(&self, bucket: &mut Bucket, now: Duration) -> usize {
        bucket.evict_while(|recorded| !self.is_fresh(recorded, now))
    }

    /// Whether one more admission fits. Call after [`AdmissionPolicy::evict`].
    pub fn has_capacity(&self, bucket: &Bucket) -> bool {
        bucket.len() < self.capacity
    }
}
