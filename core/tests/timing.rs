//! Timing guard tests: every exit path leaves a complete sample.

use inquest_core::timing::{safe_divide, safe_duration_seconds, timed, TimingSample};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Normal exit records start, end, and a floored duration.
#[test]
fn records_on_normal_exit() {
    let mut sample = TimingSample::default();
    let value = timed(&mut sample, || 7);

    assert_eq!(value, 7);
    let started = sample.started_at.expect("started_at");
    let ended = sample.ended_at.expect("ended_at");
    assert!(ended >= started);
    assert!(sample.duration_ms.expect("duration_ms") >= 1);
}

/// A panicking workload still leaves a complete sample behind.
#[test]
fn records_on_panic() {
    let mut sample = TimingSample::default();
    let result = catch_unwind(AssertUnwindSafe(|| {
        timed(&mut sample, || -> u32 { panic!("analyzer blew up") })
    }));

    assert!(result.is_err());
    assert!(sample.started_at.is_some());
    assert!(sample.ended_at.is_some());
    assert!(sample.duration_ms.expect("duration_ms") >= 1);
}

/// Zero and non-finite denominators return the caller's default.
#[test]
fn safe_divide_never_raises() {
    assert_eq!(safe_divide(10.0, 2.0, -1.0), 5.0);
    assert_eq!(safe_divide(10.0, 0.0, -1.0), -1.0);
    assert_eq!(safe_divide(10.0, f64::NAN, -1.0), -1.0);
    assert_eq!(safe_divide(f64::INFINITY, 2.0, -1.0), -1.0);
}

/// Missing durations yield the default instead of raising downstream.
#[test]
fn safe_duration_defaults() {
    assert_eq!(safe_duration_seconds(Some(1_500), 0.0), 1.5);
    assert_eq!(safe_duration_seconds(None, -1.0), -1.0);
}
