/// Monotonic-enough wall-clock source shared by every relay instance.
///
/// Clock synchronization compares absolute readings taken by two independent
/// processes, so this must be a wall-clock reading (seconds since the Unix
/// epoch), not `Instant`, which has no cross-process meaning.
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in fractional seconds since the Unix epoch.
pub fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
