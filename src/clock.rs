// src/clock.rs

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock time in epoch milliseconds (0 if the clock is before 1970).
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Wall-clock time in epoch seconds.
pub fn now_secs() -> u64 {
    now_ms() / 1000
}
