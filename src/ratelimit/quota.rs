//! Optional absolute ceiling on a caller's live admissions.

use thiserror::Error;

/// The caller's live admission count has reached the configured quota.
///
/// Checked against the same in-window count as the capacity, so it clears
/// on its own once enough records expire.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("quota of {quota} admissions reached ({used} live)")]
pub struct QuotaExceeded {
    /// The configured ceiling
    pub quota: u64,
    /// Live admissions at the time of the check
    pub used: u64,
}

/// Enforces the optional quota. A guard with no quota never fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaGuard {
    quota: Option<u64>,
}

impl QuotaGuard {
    pub fn new(quota: Option<u64>) -> Self {
        Self { quota }
    }

    pub fn quota(&self) -> Option<u64> {
        self.quota
    }

    /// Check the post-eviction live count against the quota.
    pub fn check(&self, live: u64) -> Result<(), QuotaExceeded> {
        match self.quota {
            Some(quota) if live >= quota => Err(QuotaExceeded { quota, used: live }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_quota_never_fires() {
        let guard = QuotaGuard::new(None);
        assert!(guard.check(0).is_ok());
        assert!(guard.check(u64::MAX).is_ok());
    }

    #[test]
    fn test_fires_at_quota() {
        let guard = QuotaGuard::new(Some(15));

        assert!(guard.check(14).is_ok());
        assert_eq!(
            guard.check(15),
            Err(QuotaExceeded { quota: 15, used: 15 })
        );
    }

    #[test]
    fn test_zero_quota_always_fires() {
        let guard = QuotaGuard::new(Some(0));
        assert!(guard.check(0).is_err());
    }

    #[test]
    fn test_error_message() {
        let err = QuotaExceeded { quota: 3, used: 3 };
        assert_eq!(err.to_string(), "quota of 3 admissions reached (3 live)");
    }
}
