//! Exponential backoff delay schedule.

use std::time::Duration;

/// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped.
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    base.saturating_mul(factor).min(cap)
}
