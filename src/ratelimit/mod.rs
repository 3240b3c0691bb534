//! Admission control: per-caller rolling windows with an optional quota.

mod backend;
mod bucket;
mod caller;
mod clock;
mod decision;
mod limiter;
mod policy;
mod quota;
mod sweeper;

pub use backend::AdmissionBackend;
pub use bucket::{Bucket, BucketStore};
pub use caller::CallerId;
pub use clock::{Clock, ManualClock, SystemClock};
pub use decision::{Decision, LimiterStats};
pub use limiter::RateLimiter;
pub use policy::AdmissionPolicy;
pub use quota::{QuotaExceeded, QuotaGuard};
pub use sweeper::spawn_sweeper;
