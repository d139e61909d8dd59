//! The bounded worker pool (spec §4.3): admission, reuse, idle parking,
//! retirement, and graceful drain across all of an app's versions.

mod lease;
mod pool;

pub use lease::{Lease, LeaseOutcome};
pub use pool::{LaneMetrics, Pool, PoolMetrics};
