//! Scoped timing guard — every unit of work gets a duration on record.
//!
//! RULE: durations come from the monotonic clock, timestamps from the
//! wall clock. Mixing the two produces negative or garbage durations
//! whenever the wall clock is adjusted mid-flight.
//!
//! The guard writes its fields on drop, so a panicking workload still
//! leaves a complete sample behind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Recorded timing for one unit of work. Embedded in investigation
/// progress, keyed by domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingSample {
    pub started_at:  Option<DateTime<Utc>>,
    pub ended_at:    Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

/// Drop-guard that stamps a [`TimingSample`] on every exit path,
/// normal return or unwind. Duration is floored at 1ms so downstream
/// rate math never sees a zero.
pub struct TimingGuard<'a> {
    sample:  &'a mut TimingSample,
    started: Instant,
}

impl<'a> TimingGuard<'a> {
    pub fn start(sample: &'a mut TimingSample) -> Self {
        sample.started_at = Some(Utc::now());
        Self {
            sample,
            started: Instant::now(),
        }
    }
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        self.sample.ended_at = Some(Utc::now());
        self.sample.duration_ms = Some(elapsed_ms.max(1));
    }
}

/// Run `work` with timing recorded on `sample` regardless of how it exits.
pub fn timed<T>(sample: &mut TimingSample, work: impl FnOnce() -> T) -> T {
    let _guard = TimingGuard::start(sample);
    work()
}

/// Division that never raises: a zero or non-finite denominator yields
/// the caller-supplied default.
pub fn safe_divide(numerator: f64, denominator: f64, default: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() || !numerator.is_finite() {
        return default;
    }
    numerator / denominator
}

/// Convert an optional millisecond duration to seconds, or the default
/// when no duration was recorded.
pub fn safe_duration_seconds(duration_ms: Option<u64>, default: f64) -> f64 {
    match duration_ms {
        Some(ms) => ms as f64 / 1000.0,
        None => default,
    }
}
