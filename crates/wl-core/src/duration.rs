//! Duration arithmetic shared by the splitter and the upload pipeline.

use std::time::Duration;

const MINUTE_NANOS: u128 = 60_000_000_000;

/// Divides a duration into `parts`, rounding to the nearest nanosecond.
///
/// Halves round away from zero. Returns the duration unchanged for zero parts.
pub fn divide_rounded(duration: Duration, parts: usize) -> Duration {
    if parts == 0 {
        return duration;
    }
    let parts = parts as u128;
    let nanos = (duration.as_nanos() + parts / 2) / parts;
    from_nanos(nanos)
}

/// Rounds a duration to the closest whole minute.
///
/// Thirty seconds or more rounds up. A value that rounds down to zero stays
/// zero.
pub fn round_to_minute(duration: Duration) -> Duration {
    let minutes = (duration.as_nanos() + MINUTE_NANOS / 2) / MINUTE_NANOS;
    from_nanos(minutes * MINUTE_NANOS)
}

fn from_nanos(nanos: u128) -> Duration {
    let secs = u64::try_from(nanos / 1_000_000_000).unwrap_or(u64::MAX);
    #[expect(
        clippy::cast_possible_truncation,
        reason = "remainder of a division by 1e9 always fits in u32"
    )]
    let subsec = (nanos % 1_000_000_000) as u32;
    Duration::new(secs, subsec)
}
