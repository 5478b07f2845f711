//! State machine tests: transition ordering, version bumps, write-once
//! settings, terminal handling.

use inquest_core::error::EngineError;
use inquest_core::fusion;
use inquest_core::intel::ThreatIntelLevel;
use inquest_core::investigation::{
    DomainFinding, InvestigationSettings, InvestigationStatus, LifecycleStage, ProgressPatch,
};
use inquest_core::lifecycle;
use inquest_core::store::InvestigationStore;

fn store() -> InvestigationStore {
    let store = InvestigationStore::in_memory().expect("open in-memory store");
    store.migrate().expect("migrate");
    store
}

fn settings() -> InvestigationSettings {
    InvestigationSettings::new("acct-1", "account", vec!["network".into(), "device".into()])
}

fn verdict() -> inquest_core::investigation::FusedRiskResult {
    fusion::finalize(Some(0.5), 0.6, ThreatIntelLevel::Medium, 5, 0.9, 3)
}

/// A fresh investigation starts in CREATED at version 1.
#[test]
fn create_starts_at_version_one() {
    let store = store();
    let inv = lifecycle::create(&store, "inv-1", "desk-1").unwrap();

    assert_eq!(inv.version, 1);
    assert_eq!(inv.lifecycle_stage, LifecycleStage::Created);
    assert_eq!(inv.status, InvestigationStatus::Created);
    assert!(inv.settings.is_none());
}

/// A taken id cannot be reused.
#[test]
fn duplicate_id_rejected() {
    let store = store();
    lifecycle::create(&store, "inv-dup", "desk-1").unwrap();

    let err = lifecycle::create(&store, "inv-dup", "desk-2").unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists { .. }), "got {err}");
}

/// The happy path bumps the version once per transition.
#[test]
fn transitions_bump_version() {
    let store = store();
    let v1 = lifecycle::create(&store, "inv-2", "desk-1").unwrap();
    let v2 = lifecycle::attach_settings(&store, "inv-2", settings(), v1.version).unwrap();
    let v3 = lifecycle::advance_to_in_progress(&store, "inv-2", v2.version).unwrap();

    assert_eq!((v1.version, v2.version, v3.version), (1, 2, 3));
    assert_eq!(v3.lifecycle_stage, LifecycleStage::InProgress);
}

/// A stale observed version loses the write.
#[test]
fn stale_version_conflicts() {
    let store = store();
    lifecycle::create(&store, "inv-3", "desk-1").unwrap();

    let err = lifecycle::attach_settings(&store, "inv-3", settings(), 7).unwrap_err();
    assert!(
        matches!(err, EngineError::VersionConflict { expected: 7, actual: 1 }),
        "got {err}"
    );
}

/// Advancing before settings are attached is out of order.
#[test]
fn advance_requires_settings() {
    let store = store();
    let inv = lifecycle::create(&store, "inv-4", "desk-1").unwrap();

    let err = lifecycle::advance_to_in_progress(&store, "inv-4", inv.version).unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }), "got {err}");
}

/// Settings are write-once.
#[test]
fn settings_attach_only_once() {
    let store = store();
    let v1 = lifecycle::create(&store, "inv-5", "desk-1").unwrap();
    let v2 = lifecycle::attach_settings(&store, "inv-5", settings(), v1.version).unwrap();

    let err = lifecycle::attach_settings(&store, "inv-5", settings(), v2.version).unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }), "got {err}");
}

/// Progress merges upsert findings and never roll the percentage back.
#[test]
fn progress_grows_monotonically() {
    let store = store();
    let v1 = lifecycle::create(&store, "inv-6", "desk-1").unwrap();
    let v2 = lifecycle::attach_settings(&store, "inv-6", settings(), v1.version).unwrap();
    let v3 = lifecycle::advance_to_in_progress(&store, "inv-6", v2.version).unwrap();

    let mut patch = ProgressPatch {
        current_phase: Some("collecting_domain_findings".into()),
        progress_percentage: Some(50.0),
        ..ProgressPatch::default()
    };
    patch.findings.insert(
        "network".into(),
        DomainFinding::degraded("scanner offline"),
    );
    let v4 = lifecycle::update_progress(&store, "inv-6", &patch, v3.version).unwrap();
    assert_eq!(v4.version, 4);
    assert_eq!(v4.progress.progress_percentage, 50.0);
    assert!(v4.progress.findings.contains_key("network"));

    // A later patch with a smaller percentage must not revert it.
    let backslide = ProgressPatch {
        progress_percentage: Some(10.0),
        ..ProgressPatch::default()
    };
    let v5 = lifecycle::update_progress(&store, "inv-6", &backslide, v4.version).unwrap();
    assert_eq!(v5.progress.progress_percentage, 50.0);
}

/// Completing stamps the verdict and pins progress at 100%.
#[test]
fn complete_is_terminal() {
    let store = store();
    let v1 = lifecycle::create(&store, "inv-7", "desk-1").unwrap();
    let v2 = lifecycle::attach_settings(&store, "inv-7", settings(), v1.version).unwrap();
    let v3 = lifecycle::advance_to_in_progress(&store, "inv-7", v2.version).unwrap();

    let done = lifecycle::complete(&store, "inv-7", v3.version, verdict()).unwrap();
    assert_eq!(done.status, InvestigationStatus::Completed);
    assert_eq!(done.progress.progress_percentage, 100.0);
    assert!(done.progress.fused_risk.is_some());

    let err = lifecycle::update_progress(
        &store,
        "inv-7",
        &ProgressPatch::default(),
        done.version,
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::TerminalState { .. }), "got {err}");
}

/// Retrying the same terminal transition is a no-op; a different one is
/// a conflict.
#[test]
fn terminal_retry_is_idempotent() {
    let store = store();
    let v1 = lifecycle::create(&store, "inv-8", "desk-1").unwrap();
    let v2 = lifecycle::attach_settings(&store, "inv-8", settings(), v1.version).unwrap();
    let v3 = lifecycle::advance_to_in_progress(&store, "inv-8", v2.version).unwrap();
    let done = lifecycle::complete(&store, "inv-8", v3.version, verdict()).unwrap();

    // Same resulting status, stale version: no-op, no bump.
    let again = lifecycle::complete(&store, "inv-8", v3.version, verdict()).unwrap();
    assert_eq!(again.version, done.version);
    assert_eq!(again.status, InvestigationStatus::Completed);

    // Different terminal intent: conflict.
    let err = lifecycle::cancel(&store, "inv-8", done.version).unwrap_err();
    assert!(matches!(err, EngineError::TerminalState { .. }), "got {err}");
}

/// Cancellation is legal from any non-terminal phase.
#[test]
fn cancel_during_setup() {
    let store = store();
    let v1 = lifecycle::create(&store, "inv-9", "desk-1").unwrap();
    let v2 = lifecycle::attach_settings(&store, "inv-9", settings(), v1.version).unwrap();

    let cancelled = lifecycle::cancel(&store, "inv-9", v2.version).unwrap();
    assert_eq!(cancelled.status, InvestigationStatus::Cancelled);
    // Stage records where it got to; status records how it ended.
    assert_eq!(cancelled.lifecycle_stage, LifecycleStage::Settings);
}

/// Failing records the terminal error status.
#[test]
fn fail_is_terminal() {
    let store = store();
    let v1 = lifecycle::create(&store, "inv-10", "desk-1").unwrap();
    let v2 = lifecycle::attach_settings(&store, "inv-10", settings(), v1.version).unwrap();
    let v3 = lifecycle::advance_to_in_progress(&store, "inv-10", v2.version).unwrap();

    let failed = lifecycle::fail(&store, "inv-10", v3.version, "store unreachable").unwrap();
    assert_eq!(failed.status, InvestigationStatus::Error);

    let err = lifecycle::advance_to_in_progress(&store, "inv-10", failed.version).unwrap_err();
    assert!(matches!(err, EngineError::TerminalState { .. }), "got {err}");
}

/// Unknown ids surface as NotFound.
#[test]
fn unknown_id_not_found() {
    let store = store();
    let err = lifecycle::cancel(&store, "inv-missing", 1).unwrap_err();
    assert!(matches!(err, EngineError::NotFound), "got {err}");
}
