//! Risk fusion tests: weighting, evidence gating, discordance, and the
//! publish-safe representation.

use inquest_core::engine::aggregate_internal;
use inquest_core::fusion::{
    agreement, evidence_strength, finalize, fuse, is_discordant, publish,
};
use inquest_core::intel::ThreatIntelLevel;
use inquest_core::investigation::{DomainFinding, FindingStatus, FusionStatus};

const TOL: f64 = 1e-9;

/// Fixed 0.7/0.3 weighting; the internal signal dominates.
#[test]
fn fuse_weighting() {
    assert!((fuse(1.0, 0.0) - 0.7).abs() < TOL);
    assert!((fuse(0.0, 1.0) - 0.3).abs() < TOL);
    assert!((fuse(0.5, 0.5) - 0.5).abs() < TOL);
}

/// Out-of-range inputs are clamped, never rejected.
#[test]
fn fuse_clamps_out_of_range() {
    assert!((fuse(2.0, -1.0) - 0.7).abs() < TOL);
    assert!((fuse(f64::NAN, 1.0) - 0.3).abs() < TOL);
}

/// Documented boundary cases for the evidence-strength curve.
#[test]
fn evidence_strength_boundaries() {
    let strong = evidence_strength(3, 10, 0.9);
    assert!(strong >= 0.7, "strong evidence scored {strong}");

    let weak = evidence_strength(1, 1, 0.1);
    assert!(weak <= 0.4, "weak evidence scored {weak}");
}

/// Strictly increasing in sources, events, and agreement (up to
/// saturation).
#[test]
fn evidence_strength_monotonic() {
    assert!(evidence_strength(2, 5, 0.5) > evidence_strength(1, 5, 0.5));
    assert!(evidence_strength(2, 6, 0.5) > evidence_strength(2, 5, 0.5));
    assert!(evidence_strength(2, 5, 0.6) > evidence_strength(2, 5, 0.5));
}

/// The discordance truth table: high internal + minimal intel + at most
/// one event, and nothing else.
#[test]
fn discordance_truth_table() {
    assert!(is_discordant(0.8, ThreatIntelLevel::Minimal, 1));
    assert!(!is_discordant(0.8, ThreatIntelLevel::High, 1));
    assert!(!is_discordant(0.3, ThreatIntelLevel::Minimal, 1));
    assert!(!is_discordant(0.8, ThreatIntelLevel::Minimal, 5));
}

/// Thin evidence always caps the verdict at 0.40.
#[test]
fn thin_evidence_caps() {
    let result = finalize(
        Some(0.9),
        0.1,
        ThreatIntelLevel::Minimal,
        1,
        agreement(0.9, 0.1),
        1,
    );
    let final_score = result.final_score.expect("capped verdict still has a score");
    assert!(
        final_score <= 0.40,
        "thin evidence produced {final_score}, expected cap at 0.40"
    );
    assert_eq!(result.status, FusionStatus::CappedForLowEvidence);
}

/// Low evidence strength caps even without discordance.
#[test]
fn low_strength_caps_without_discordance() {
    // Internal below the discordance floor, but almost no evidence.
    let result = finalize(Some(0.5), 0.1, ThreatIntelLevel::Minimal, 0, 0.1, 1);
    assert_eq!(result.status, FusionStatus::CappedForLowEvidence);
    assert!(result.final_score.expect("score") <= 0.40);
}

/// Well-corroborated verdicts pass through uncapped.
#[test]
fn corroborated_verdict_is_uncapped() {
    let internal = 0.8;
    let external = 0.85;
    let result = finalize(
        Some(internal),
        external,
        ThreatIntelLevel::High,
        12,
        agreement(internal, external),
        3,
    );
    assert_eq!(result.status, FusionStatus::Ok);
    let expected = fuse(internal, external);
    assert!((result.final_score.expect("score") - expected).abs() < TOL);
    assert!(result.evidence_strength >= 0.7);
}

/// Absent evidence is visibly unknown, never zero risk.
#[test]
fn no_evidence_is_not_zero() {
    let result = finalize(None, 0.6, ThreatIntelLevel::Medium, 4, 0.0, 0);
    assert_eq!(result.final_score, None);
    assert_eq!(result.display, "N/A");
    assert_eq!(result.status, FusionStatus::NeedsMoreEvidence);
}

/// Display formatting: two decimals for a value, "N/A" for nothing.
#[test]
fn publish_formatting() {
    assert_eq!(publish(None, FusionStatus::NeedsMoreEvidence).display, "N/A");
    assert_eq!(publish(Some(0.456), FusionStatus::Ok).display, "0.46");
    assert_eq!(publish(Some(0.4), FusionStatus::Ok).display, "0.40");
}

fn ok_finding(score: f64, confidence: f64) -> DomainFinding {
    DomainFinding {
        risk_score: Some(score),
        confidence,
        evidence: Vec::new(),
        status: FindingStatus::Ok,
        reason: None,
    }
}

/// The internal aggregate is a confidence-weighted mean over OK
/// findings only.
#[test]
fn aggregate_weights_by_confidence() {
    let findings = [ok_finding(1.0, 0.9), ok_finding(0.0, 0.1)];
    let (internal, sources) = aggregate_internal(findings.iter());
    assert_eq!(sources, 2);
    let internal = internal.expect("aggregate");
    assert!((internal - 0.9).abs() < TOL, "got {internal}");
}

/// Degraded findings never feed the aggregate.
#[test]
fn aggregate_skips_degraded() {
    let findings = [ok_finding(0.2, 0.8), DomainFinding::degraded("unreachable")];
    let (internal, sources) = aggregate_internal(findings.iter());
    assert_eq!(sources, 1);
    assert!((internal.expect("aggregate") - 0.2).abs() < TOL);
}

/// An all-degraded panel yields no internal signal at all.
#[test]
fn aggregate_of_nothing_is_none() {
    let findings = [
        DomainFinding::degraded("one"),
        DomainFinding::degraded("two"),
    ];
    let (internal, sources) = aggregate_internal(findings.iter());
    assert_eq!((internal, sources), (None, 0));
}
