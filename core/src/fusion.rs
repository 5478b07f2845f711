//! Evidence-gated risk fusion.
//!
//! Combines the internal domain-aggregate score with external
//! threat-intelligence corroboration into a single gated verdict:
//!   1. Weighted fusion — internal signal dominates (it is derived from
//!      richer, queryable evidence; external intel corroborates only).
//!   2. Evidence strength — how much independent data backs the number.
//!   3. Discordance — a high internal score with no external
//!      corroboration is suspect, not near-certain.
//!   4. Capping — discordant or thin-evidence verdicts are capped so a
//!      single weak signal never publishes as high confidence.
//!
//! RULES:
//!   - Pure and total: no I/O, never raises. Out-of-range inputs are
//!     clamped, not rejected.
//!   - Absent evidence publishes as "N/A", never as "0.00".
//!   - The internal aggregate is built from normalized domain findings
//!     only; a raw upstream classifier score must never drive the
//!     verdict or its rationale directly.

use crate::intel::ThreatIntelLevel;
use crate::investigation::{FusedRiskResult, FusionStatus};

// ── Constants ────────────────────────────────────────────────────────────────

const INTERNAL_WEIGHT: f64 = 0.7;
const EXTERNAL_WEIGHT: f64 = 0.3;

/// Ceiling applied to discordant or thin-evidence verdicts.
const LOW_EVIDENCE_CAP: f64 = 0.40;
/// Evidence strength below this triggers the cap.
const LOW_EVIDENCE_THRESHOLD: f64 = 0.45;
/// Internal score at or above this counts as "high" for discordance.
const DISCORDANT_INTERNAL_FLOOR: f64 = 0.70;

/// Independent sources at which the sources component saturates.
const SOURCES_SATURATION: f64 = 3.0;
/// Corroborating events at which the events component saturates.
const EVENTS_SATURATION: f64 = 10.0;

const SOURCES_WEIGHT:   f64 = 0.40;
const EVENTS_WEIGHT:    f64 = 0.35;
const AGREEMENT_WEIGHT: f64 = 0.25;

// ── Primitives ───────────────────────────────────────────────────────────────

fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Fixed-weight fusion of the internal aggregate and external signal.
pub fn fuse(internal: f64, external: f64) -> f64 {
    INTERNAL_WEIGHT * clamp01(internal) + EXTERNAL_WEIGHT * clamp01(external)
}

/// Numeric agreement between the internal and external signals.
pub fn agreement(internal: f64, external: f64) -> f64 {
    1.0 - (clamp01(internal) - clamp01(external)).abs()
}

/// How much independent, corroborating data backs the computation.
///
/// Weighted sum of saturating ramps: sources saturate at 3, events at
/// 10, agreement contributes linearly. Strictly increasing in each
/// input up to its saturation point.
pub fn evidence_strength(sources: u32, events: u32, agree: f64) -> f64 {
    let sources_part = (sources as f64 / SOURCES_SATURATION).min(1.0);
    let events_part = (events as f64 / EVENTS_SATURATION).min(1.0);
    SOURCES_WEIGHT * sources_part + EVENTS_WEIGHT * events_part + AGREEMENT_WEIGHT * clamp01(agree)
}

/// True iff the internal signal is high while external corroboration is
/// absent: minimal intel level and at most one corroborating event.
/// Multiple events or any non-minimal level clear discordance
/// regardless of internal magnitude.
pub fn is_discordant(internal: f64, ext_level: ThreatIntelLevel, events: u32) -> bool {
    clamp01(internal) >= DISCORDANT_INTERNAL_FLOOR
        && ext_level == ThreatIntelLevel::Minimal
        && events <= 1
}

// ── Verdict assembly ─────────────────────────────────────────────────────────

/// Publish-safe representation: absent values display as "N/A".
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRisk {
    pub display: String,
    pub status:  FusionStatus,
}

pub fn publish(final_score: Option<f64>, status: FusionStatus) -> PublishedRisk {
    let display = match final_score {
        Some(v) => format!("{v:.2}"),
        None => "N/A".to_string(),
    };
    PublishedRisk { display, status }
}

/// Compute the gated verdict.
///
/// `internal` is `None` when no domain produced usable evidence; the
/// verdict is then "needs more evidence", never a coerced zero.
pub fn finalize(
    internal: Option<f64>,
    external: f64,
    ext_level: ThreatIntelLevel,
    events: u32,
    agree: f64,
    sources: u32,
) -> FusedRiskResult {
    let strength = evidence_strength(sources, events, agree);

    let Some(internal) = internal else {
        let published = publish(None, FusionStatus::NeedsMoreEvidence);
        return FusedRiskResult {
            final_score:       None,
            display:           published.display,
            status:            published.status,
            evidence_strength: strength,
        };
    };

    let raw = fuse(internal, external);
    let (final_score, status) =
        if is_discordant(internal, ext_level, events) || strength < LOW_EVIDENCE_THRESHOLD {
            (raw.min(LOW_EVIDENCE_CAP), FusionStatus::CappedForLowEvidence)
        } else {
            (raw, FusionStatus::Ok)
        };

    let published = publish(Some(final_score), status);
    FusedRiskResult {
        final_score:       Some(final_score),
        display:           published.display,
        status:            published.status,
        evidence_strength: strength,
    }
}
