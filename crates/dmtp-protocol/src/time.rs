//! Timestamp helpers.
//!
//! OpenDMTP timestamps are `uint32` seconds since the Unix epoch. This
//! module exists purely to give that convention a named type rather than
//! passing bare `u32`/`i64` around.

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, as carried on the wire.
pub type EpochSeconds = u32;

/// The current wall-clock time as wire-format epoch seconds.
///
/// Saturates rather than panics if the system clock is before the epoch
/// or past the `u32` rollover; both are operator-environment problems, not
/// protocol errors.
#[must_use]
pub fn now_epoch_seconds() -> EpochSeconds {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .min(u64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_nonzero_and_monotonic_enough() {
        let first = now_epoch_seconds();
        let second = now_epoch_seconds();
        assert!(first > 0);
        assert!(second >= first);
    }
}
