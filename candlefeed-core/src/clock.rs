use chrono::Utc;

/// Source of "now" in epoch seconds.
///
/// Everything that clips ranges or stamps ticks reads time through this
/// trait so tests can drive it deterministically.
pub trait Clock: Send + Sync {
    /// Current time in epoch seconds.
    fn now(&self) -> i64;
}

/// Wall clock backed by `chrono::Utc::now`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}
