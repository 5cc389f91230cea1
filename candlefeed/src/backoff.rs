use std::time::Duration;

use rand::Rng;

/// `base` moved by a random offset of at most `jitter_percent` percent in
/// either direction. Percentages above 100 are capped.
pub fn jittered(base: Duration, jitter_percent: u32) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let spread = base_ms.saturating_mul(u64::from(jitter_percent.min(100))) / 100;
    if spread == 0 {
        return base;
    }
    let low = base_ms - spread;
    let high = base_ms.saturating_add(spread);
    Duration::from_millis(rand::rng().random_range(low..=high))
}
