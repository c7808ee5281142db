//! Wall-clock helpers.
//!
//! Persisted timestamps and envelope stamps are epoch-milliseconds as
//! `u64`, matching what the store records and what clients receive.
//! Deadline *waiting* is done with `tokio::time` against monotonic
//! instants; these values are for recording and comparison only.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as epoch-milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(b >= a);
        // Sanity: we are past 2020-01-01 in epoch-ms.
        assert!(a > 1_577_836_800_000);
    }
}
