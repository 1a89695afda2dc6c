use std::time::{Duration, SystemTime};

/// Returns the current unix timestamp (seconds elapsed since 1970-01-01). Used for
/// connection-token expiry and housekeeping log fields; never for reactor-internal pacing,
/// which is always `Instant`-based.
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

/// Clamp a duration to a minimum, used for pacing timers that must never fire at zero delay.
#[inline]
pub fn at_least(duration: Duration, minimum: Duration) -> Duration {
    if duration < minimum {
        minimum
    } else {
        duration
    }
}
