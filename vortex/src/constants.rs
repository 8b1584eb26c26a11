//! Vortex Constants
//!
//! Defaults shared by the ring buffer, the reference manager and the endpoint layer.

use std::time::Duration;

use static_assertions::const_assert;

/// Default ring buffer size (must be power of 2)
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Upper bound for `concurrent_consumers` on a single endpoint
pub const MAX_CONCURRENT_CONSUMERS: usize = 500;

/// Default time a waiting producer blocks for completion
pub const DEFAULT_TIMEOUT_MILLIS: u64 = 30_000;

/// Bounded wait for an event handler to confirm start or stop
pub const LIFECYCLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on a producer's spin-wait while the reference is reconfiguring
pub const RECONFIGURE_WAIT: Duration = Duration::from_secs(30);

/// Spins before a blocked claim starts yielding
pub const CLAIM_SPIN_TRIES: u32 = 100;

const_assert!(DEFAULT_BUFFER_SIZE.is_power_of_two());
const_assert!(MAX_CONCURRENT_CONSUMERS > 0);
