//! Time utilities.
//!
//! Provides wall-clock timestamps for request signing plus a strictly
//! increasing millisecond clock, so two requests signed in the same
//! millisecond still carry distinct, ordered timestamps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

#[inline]
fn clock_realtime() -> (u64, u64) {
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    (d.as_secs(), d.subsec_nanos() as u64)
}

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    let (sec, nsec) = clock_realtime();
    sec * 1_000 + nsec / 1_000_000
}

static LAST_MS: AtomicU64 = AtomicU64::new(0);

/// Strictly increasing milliseconds since Unix epoch.
///
/// Tracks wall-clock time but never returns a value less than or equal to a
/// previous one, even if the system clock steps backwards.
pub fn monotonic_ms() -> u64 {
    let now = now_ms();
    let mut prev = LAST_MS.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_MS.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => prev = actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_is_strictly_increasing() {
        let mut last = monotonic_ms();
        for _ in 0..10_000 {
            let t = monotonic_ms();
            assert!(t > last);
            last = t;
        }
    }

    #[test]
    fn monotonic_tracks_wall_clock() {
        let wall = now_ms();
        let mono = monotonic_ms();
        // Within a second of wall time unless thousands of calls raced ahead.
        assert!(mono + 1_000 >= wall);
    }
}
