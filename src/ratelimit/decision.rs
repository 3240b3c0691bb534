//! Admission outcomes.

use serde::Serialize;

use super::quota::QuotaExceeded;

/// The outcome of a single admission attempt.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed; one record was taken.
    Admitted,
    /// The rolling window is full. Clears as old records expire.
    WindowExceeded,
    /// The absolute quota was reached before the capacity check ran.
    QuotaExceeded(QuotaExceeded),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted)
    }

    /// Short machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            Decision::Admitted => "admitted",
            Decision::WindowExceeded => "window_exceeded",
            Decision::QuotaExceeded(_) => "quota_exceeded",
        }
    }

    /// Collapse to `Ok(admitted)`, surfacing the quota as an error.
    pub fn into_result(self) -> Result<bool, QuotaExceeded> {
        match self {
            Decision::Admitted => Ok(true),
            Decision::WindowExceeded => Ok(false),
            Decision::QuotaExceeded(err) => Err(err),
        }
    }
}

/// Global limiter configuration and bookkeeping, as reported by `stats()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimiterStats {
    pub capacity: u64,
    pub window_seconds: f64,
    pub quota: Option<u64>,
    /// Callers with a bucket. Never decreases: buckets are emptied, not removed.
    pub distinct_callers_tracked: usize,
}
