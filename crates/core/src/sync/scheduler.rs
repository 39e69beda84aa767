//! Scheduler constants/helpers for the background sync loop.

use chrono::Utc;

/// Background sync cadence in seconds.
pub const SYNC_INTERVAL_SECS: u64 = 300;

/// Maximum jitter (seconds) added to periodic sync intervals.
pub const SYNC_INTERVAL_JITTER_SECS: u64 = 15;

/// Delay before the next background cycle: the base interval plus a
/// clock-derived jitter so devices sharing one remote drift apart instead
/// of uploading in lockstep.
pub fn jittered_delay_ms() -> u64 {
    let jitter_bound = SYNC_INTERVAL_JITTER_SECS.saturating_mul(1000);
    let jitter_ms = if jitter_bound > 0 {
        Utc::now().timestamp_millis().unsigned_abs() % jitter_bound
    } else {
        0
    };
    SYNC_INTERVAL_SECS.saturating_mul(1000) + jitter_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jittered_delay_stays_within_bounds() {
        let base = SYNC_INTERVAL_SECS * 1000;
        let bound = SYNC_INTERVAL_JITTER_SECS * 1000;
        for _ in 0..50 {
            let delay = jittered_delay_ms();
            assert!(delay >= base);
            assert!(delay < base + bound);
        }
    }
}
