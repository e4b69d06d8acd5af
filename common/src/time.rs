// A simple module to define the time types used across the crate
//
// These timestamps are wall-clock, non-deterministic values: they are only
// ever used for timeouts, sweeps and logging, never for anything that must
// agree between two nodes (that lives in the block headers themselves).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub type TimestampMillis = u64;

#[inline]
pub fn get_current_time() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before UNIX_EPOCH")
}

// We cast to u64 as we have plenty of time before it overflows.
pub fn get_current_time_in_millis() -> TimestampMillis {
    get_current_time().as_millis() as TimestampMillis
}
