//! Simulated domain analyzers and threat intel.
//!
//! The real analyzers and intel feeds are external collaborators; these
//! stand-ins keep the engine exercisable end-to-end (runner, tests)
//! without them.
//!
//! RULE: nothing here calls a platform RNG. Every simulated signal
//! flows through a Pcg64Mcg stream derived from (master_seed, domain,
//! entity), so a run is fully reproducible from its seed.

use crate::{
    analyzer::{AnalysisContext, AnalyzerOutcome, DomainAnalyzer},
    intel::{ThreatIntelLevel, ThreatIntelProvider, ThreatIntelSummary},
    investigation::{DomainFinding, EvidenceItem, FindingStatus},
};
use chrono::Utc;
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::sync::Arc;

// ── Deterministic streams ────────────────────────────────────────────────────

/// Stable 64-bit hash of a string (FNV-1a). Used only to derive RNG
/// streams; never a security boundary.
fn stable_hash(s: &str) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for byte in s.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn stream_for(master_seed: u64, domain: &str, entity_id: &str) -> Pcg64Mcg {
    let derived = master_seed
        ^ stable_hash(domain).wrapping_mul(0x9e37_79b9_7f4a_7c15)
        ^ stable_hash(entity_id);
    Pcg64Mcg::seed_from_u64(derived)
}

fn next_f64(rng: &mut Pcg64Mcg) -> f64 {
    (rng.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

// ── Simulated analyzers ──────────────────────────────────────────────────────

/// A deterministic analyzer for one domain. Emits a plausible finding
/// whose score and evidence depend only on (seed, domain, entity).
pub struct SimulatedAnalyzer {
    domain:      &'static str,
    master_seed: u64,
}

impl SimulatedAnalyzer {
    pub fn new(domain: &'static str, master_seed: u64) -> Self {
        Self {
            domain,
            master_seed,
        }
    }
}

impl DomainAnalyzer for SimulatedAnalyzer {
    fn domain(&self) -> &'static str {
        self.domain
    }

    fn analyze(&self, ctx: &AnalysisContext) -> AnalyzerOutcome {
        let mut rng = stream_for(self.master_seed, self.domain, &ctx.entity_id);

        let risk_score = next_f64(&mut rng);
        let confidence = 0.60 + next_f64(&mut rng) * 0.35;
        let evidence_count = 1 + (rng.next_u64() % 4) as usize;

        let evidence = (0..evidence_count)
            .map(|i| EvidenceItem {
                kind:        format!("{}_signal", self.domain),
                detail:      format!(
                    "{} observation {} for {} {}",
                    self.domain, i, ctx.entity_type, ctx.entity_id
                ),
                observed_at: Utc::now(),
            })
            .collect();

        AnalyzerOutcome::Finding(DomainFinding {
            risk_score: Some(risk_score),
            confidence,
            evidence,
            status: FindingStatus::Ok,
            reason: None,
        })
    }
}

/// An analyzer that always returns exactly the finding it was built
/// with. Lets tests pin fusion inputs precisely.
pub struct ScriptedAnalyzer {
    domain:  &'static str,
    finding: DomainFinding,
}

impl ScriptedAnalyzer {
    pub fn new(domain: &'static str, finding: DomainFinding) -> Self {
        Self { domain, finding }
    }

    /// Shorthand for an OK finding with a given score, confidence, and
    /// number of evidence items.
    pub fn scoring(
        domain: &'static str,
        risk_score: f64,
        confidence: f64,
        evidence_count: usize,
    ) -> Self {
        let evidence = (0..evidence_count)
            .map(|i| EvidenceItem {
                kind:        format!("{domain}_signal"),
                detail:      format!("{domain} scripted observation {i}"),
                observed_at: Utc::now(),
            })
            .collect();
        Self::new(
            domain,
            DomainFinding {
                risk_score: Some(risk_score),
                confidence,
                evidence,
                status: FindingStatus::Ok,
                reason: None,
            },
        )
    }
}

impl DomainAnalyzer for ScriptedAnalyzer {
    fn domain(&self) -> &'static str {
        self.domain
    }

    fn analyze(&self, _ctx: &AnalysisContext) -> AnalyzerOutcome {
        AnalyzerOutcome::Finding(self.finding.clone())
    }
}

/// An analyzer whose invocation always degrades. Stands in for a broken
/// or unreachable collaborator.
pub struct FailingAnalyzer {
    domain: &'static str,
    reason: String,
}

impl FailingAnalyzer {
    pub fn new(domain: &'static str, reason: impl Into<String>) -> Self {
        Self {
            domain,
            reason: reason.into(),
        }
    }
}

impl DomainAnalyzer for FailingAnalyzer {
    fn domain(&self) -> &'static str {
        self.domain
    }

    fn analyze(&self, _ctx: &AnalysisContext) -> AnalyzerOutcome {
        AnalyzerOutcome::Degraded {
            reason: self.reason.clone(),
        }
    }
}

/// The standard four-domain panel the runner wires up.
pub fn standard_panel(master_seed: u64) -> Vec<Arc<dyn DomainAnalyzer>> {
    ["network", "device", "location", "activity_log"]
        .into_iter()
        .map(|domain| Arc::new(SimulatedAnalyzer::new(domain, master_seed)) as Arc<dyn DomainAnalyzer>)
        .collect()
}

// ── Simulated threat intel ───────────────────────────────────────────────────

/// Intel provider returning a fixed summary. The scripted counterpart
/// to [`ScriptedAnalyzer`].
pub struct ScriptedThreatIntel {
    summary: ThreatIntelSummary,
}

impl ScriptedThreatIntel {
    pub fn new(level: ThreatIntelLevel, event_count: u32) -> Self {
        Self {
            summary: ThreatIntelSummary { level, event_count },
        }
    }
}

impl ThreatIntelProvider for ScriptedThreatIntel {
    fn lookup(&self, _entity_id: &str, _entity_type: &str) -> ThreatIntelSummary {
        self.summary
    }
}

/// Deterministic intel keyed by (seed, entity), mirroring
/// [`SimulatedAnalyzer`].
pub struct SimulatedThreatIntel {
    master_seed: u64,
}

impl SimulatedThreatIntel {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }
}

impl ThreatIntelProvider for SimulatedThreatIntel {
    fn lookup(&self, entity_id: &str, _entity_type: &str) -> ThreatIntelSummary {
        let mut rng = stream_for(self.master_seed, "threat_intel", entity_id);
        let level = match rng.next_u64() % 4 {
            0 => ThreatIntelLevel::Minimal,
            1 => ThreatIntelLevel::Low,
            2 => ThreatIntelLevel::Medium,
            _ => ThreatIntelLevel::High,
        };
        let event_count = match level {
            ThreatIntelLevel::Minimal => (rng.next_u64() % 2) as u32,
            ThreatIntelLevel::Low => (rng.next_u64() % 5) as u32,
            ThreatIntelLevel::Medium => 3 + (rng.next_u64() % 8) as u32,
            ThreatIntelLevel::High => 8 + (rng.next_u64() % 20) as u32,
        };
        ThreatIntelSummary { level, event_count }
    }
}
