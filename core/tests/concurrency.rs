//! Version compare-and-swap under concurrent writers, analyzer
//! deadlines, and cooperative cancellation.

use inquest_core::analyzer::{AnalysisContext, AnalyzerOutcome, DomainAnalyzer};
use inquest_core::config::EngineConfig;
use inquest_core::coordinator;
use inquest_core::error::EngineError;
use inquest_core::investigation::{
    DomainFinding, FindingStatus, InvestigationSettings, ProgressPatch,
};
use inquest_core::lifecycle;
use inquest_core::sim_analyzers::ScriptedAnalyzer;
use inquest_core::store::InvestigationStore;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn shared_store(tag: &str) -> InvestigationStore {
    let store = InvestigationStore::in_memory_shared(tag).expect("open shared store");
    store.migrate().expect("migrate");
    store
}

fn to_in_progress(store: &InvestigationStore, id: &str) -> i64 {
    let v1 = lifecycle::create(store, id, "desk-1").unwrap();
    let settings =
        InvestigationSettings::new("acct-1", "account", vec!["network".into(), "device".into()]);
    let v2 = lifecycle::attach_settings(store, id, settings, v1.version).unwrap();
    let v3 = lifecycle::advance_to_in_progress(store, id, v2.version).unwrap();
    v3.version
}

fn finding_patch(domain: &str) -> ProgressPatch {
    let mut patch = ProgressPatch::default();
    patch.findings.insert(
        domain.to_string(),
        DomainFinding {
            risk_score: Some(0.5),
            confidence: 0.8,
            evidence:   Vec::new(),
            status:     FindingStatus::Ok,
            reason:     None,
        },
    );
    patch
}

/// Two writers with the same observed version: exactly one wins, the
/// loser conflicts, and the loser's retry against the new version lands.
#[test]
fn cas_single_winner() {
    let store = shared_store("cas-winner");
    let version = to_in_progress(&store, "inv-cas");

    let first = lifecycle::update_progress(&store, "inv-cas", &finding_patch("network"), version);
    let second = lifecycle::update_progress(&store, "inv-cas", &finding_patch("device"), version);

    let winner = first.expect("first writer holds the observed version");
    let err = second.expect_err("second writer lost the race");
    assert!(
        matches!(err, EngineError::VersionConflict { expected, actual }
            if expected == version && actual == winner.version),
        "got {err}"
    );

    // Retry with the new version succeeds.
    let retried =
        lifecycle::update_progress(&store, "inv-cas", &finding_patch("device"), winner.version)
            .expect("retry against the new version");
    assert_eq!(retried.version, winner.version + 1);
    assert!(retried.progress.findings.contains_key("network"));
    assert!(retried.progress.findings.contains_key("device"));
}

/// The same property under real threads on separate connections.
#[test]
fn cas_single_winner_threaded() {
    let store = shared_store("cas-threaded");
    let version = to_in_progress(&store, "inv-race");

    let mut handles = Vec::new();
    for domain in ["network", "device"] {
        let worker = store.reopen().expect("reopen");
        handles.push(thread::spawn(move || {
            lifecycle::update_progress(&worker, "inv-race", &finding_patch(domain), version)
        }));
    }

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(EngineError::VersionConflict { .. })))
        .count();
    assert_eq!((wins, conflicts), (1, 1), "outcomes: {outcomes:?}");
}

struct SleepyAnalyzer;

impl DomainAnalyzer for SleepyAnalyzer {
    fn domain(&self) -> &'static str {
        "location"
    }

    fn analyze(&self, _ctx: &AnalysisContext) -> AnalyzerOutcome {
        thread::sleep(Duration::from_millis(250));
        AnalyzerOutcome::Finding(DomainFinding {
            risk_score: Some(0.95),
            confidence: 0.95,
            evidence:   Vec::new(),
            status:     FindingStatus::Ok,
            reason:     None,
        })
    }
}

/// A late analyzer is recorded as degraded, and its straggling real
/// finding must not displace that record.
#[test]
fn deadline_miss_degrades_domain() {
    let store = shared_store("deadline-miss");
    to_in_progress(&store, "inv-slow");

    let config = EngineConfig {
        analyzer_timeout_ms: 30,
        ..EngineConfig::default()
    };
    let analyzers: Vec<Arc<dyn DomainAnalyzer>> = vec![
        Arc::new(ScriptedAnalyzer::scoring("network", 0.3, 0.8, 2)),
        Arc::new(SleepyAnalyzer),
    ];
    coordinator::run_domain_analyses(&store, "inv-slow", &analyzers, &config).unwrap();

    let inv = store.get_investigation("inv-slow").unwrap().unwrap();
    let slow = &inv.progress.findings["location"];
    assert_eq!(slow.status, FindingStatus::InsufficientEvidence);
    assert!(
        slow.reason.as_deref().unwrap_or_default().contains("timed out"),
        "reason: {:?}",
        slow.reason
    );

    // Give the straggler time to finish, then confirm first-write-wins.
    thread::sleep(Duration::from_millis(300));
    let inv = store.get_investigation("inv-slow").unwrap().unwrap();
    assert_eq!(
        inv.progress.findings["location"].status,
        FindingStatus::InsufficientEvidence,
        "straggler displaced the recorded timeout"
    );
}

/// Cancellation is observed at the next progress write: in-flight work
/// stops quietly instead of resurrecting a terminal investigation.
#[test]
fn cancellation_stops_merges() {
    let store = shared_store("cancel-merge");
    let version = to_in_progress(&store, "inv-cancel");
    let cancelled = lifecycle::cancel(&store, "inv-cancel", version).unwrap();

    let analyzers: Vec<Arc<dyn DomainAnalyzer>> =
        vec![Arc::new(ScriptedAnalyzer::scoring("network", 0.9, 0.9, 3))];
    coordinator::run_domain_analyses(&store, "inv-cancel", &analyzers, &EngineConfig::default())
        .unwrap();

    let inv = store.get_investigation("inv-cancel").unwrap().unwrap();
    assert!(inv.progress.findings.is_empty(), "merge landed after cancel");
    assert_eq!(inv.version, cancelled.version);
}
