//! Admission backend trait for decoupling transports from the limiter.

use std::time::Duration;

use super::caller::CallerId;
use super::clock::Clock;
use super::decision::{Decision, LimiterStats};
use super::limiter::RateLimiter;

/// The operations a transport layer needs from an admission controller.
///
/// Object safe, so transports hold an `Arc<dyn AdmissionBackend>` and stay
/// independent of the limiter's clock type.
pub trait AdmissionBackend: Send + Sync {
    /// Try to admit one request from `caller`.
    fn attempt(&self, caller: &CallerId) -> Decision;

    /// Live admission count for `caller`. Evicts expired records first.
    fn used(&self, caller: &CallerId) -> u64;

    /// Admissions left for `caller` in the current window.
    fn remaining(&self, caller: &CallerId) -> u64;

    /// Global configuration and tracked-caller count.
    fn stats(&self) -> LimiterStats;

    /// Maximum live admissions per caller.
    fn capacity(&self) -> u64;

    /// Length of the rolling window, used for retry hints.
    fn window(&self) -> Duration;
}

impl<C: Clock> AdmissionBackend for RateLimiter<CallerId, C> {
    fn attempt(&self, caller: &CallerId) -> Decision {
        RateLimiter::attempt(self, caller)
    }

    fn used(&self, caller: &CallerId) -> u64 {
        RateLimiter::used(self, caller)
    }

    fn remaining(&self, caller: &CallerId) -> u64 {
        RateLimiter::remaining(self, caller)
    }

    fn stats(&self) -> LimiterStats {
        RateLimiter::stats(self)
    }

    fn capacity(&self) -> u64 {
        RateLimiter::capacity(self)
    }

    fn window(&self) -> Duration {
        RateLimiter::window(self)
    }
}
