//! The investigation engine — orchestrates one investigation from
//! fan-out to fused verdict.
//!
//! PIPELINE (fixed order):
//!   1. Domain analyzers fan out through the coordination layer.
//!   2. Threat intel is looked up for the entity under investigation.
//!   3. The internal aggregate is computed from normalized findings.
//!   4. The fusion engine produces the gated verdict.
//!   5. The verdict is written back and the investigation completes.
//!
//! RULES:
//!   - The engine owns its registries (analyzers, intel provider, store);
//!     nothing lives in ambient module state.
//!   - Cancellation observed anywhere in the pipeline ends it quietly:
//!     a terminal investigation is a result, not a fault.

use crate::{
    analyzer::DomainAnalyzer,
    config::EngineConfig,
    coordinator,
    error::{EngineError, EngineResult},
    event::{EventLogEntry, InvestigationEvent},
    fusion,
    intel::ThreatIntelProvider,
    investigation::{
        DomainFinding, FindingStatus, FusedRiskResult, Investigation, InvestigationSettings,
        ProgressPatch,
    },
    lifecycle,
    store::InvestigationStore,
    timing::safe_divide,
    types::Version,
};
use std::sync::Arc;

pub struct InvestigationEngine {
    store:     InvestigationStore,
    analyzers: Vec<Arc<dyn DomainAnalyzer>>,
    intel:     Box<dyn ThreatIntelProvider>,
    config:    EngineConfig,
}

impl InvestigationEngine {
    pub fn new(
        store: InvestigationStore,
        intel: Box<dyn ThreatIntelProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            analyzers: Vec::new(),
            intel,
            config,
        }
    }

    /// Register a domain analyzer. Call once per domain before running.
    pub fn register(&mut self, analyzer: Arc<dyn DomainAnalyzer>) {
        self.analyzers.push(analyzer);
    }

    pub fn store(&self) -> &InvestigationStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Mutation entry points ──────────────────────────────────────

    pub fn create(&self, investigation_id: &str, owner_id: &str) -> EngineResult<Investigation> {
        lifecycle::create(&self.store, investigation_id, owner_id)
    }

    pub fn attach_settings(
        &self,
        investigation_id: &str,
        settings: InvestigationSettings,
        expected_version: Version,
    ) -> EngineResult<Investigation> {
        lifecycle::attach_settings(&self.store, investigation_id, settings, expected_version)
    }

    pub fn advance_to_in_progress(
        &self,
        investigation_id: &str,
        expected_version: Version,
    ) -> EngineResult<Investigation> {
        lifecycle::advance_to_in_progress(&self.store, investigation_id, expected_version)
    }

    pub fn update_progress(
        &self,
        investigation_id: &str,
        patch: &ProgressPatch,
        expected_version: Version,
    ) -> EngineResult<Investigation> {
        lifecycle::update_progress(&self.store, investigation_id, patch, expected_version)
    }

    pub fn complete(
        &self,
        investigation_id: &str,
        expected_version: Version,
        final_result: FusedRiskResult,
    ) -> EngineResult<Investigation> {
        lifecycle::complete(&self.store, investigation_id, expected_version, final_result)
    }

    pub fn fail(
        &self,
        investigation_id: &str,
        expected_version: Version,
        error: &str,
    ) -> EngineResult<Investigation> {
        lifecycle::fail(&self.store, investigation_id, expected_version, error)
    }

    pub fn cancel(
        &self,
        investigation_id: &str,
        expected_version: Version,
    ) -> EngineResult<Investigation> {
        lifecycle::cancel(&self.store, investigation_id, expected_version)
    }

    // ── Pipeline ───────────────────────────────────────────────────

    /// Drive an IN_PROGRESS investigation to its terminal verdict.
    ///
    /// Returns the terminal record. If the investigation was cancelled
    /// or failed mid-flight, that terminal record is returned as-is.
    pub fn run_analysis(&self, investigation_id: &str) -> EngineResult<Investigation> {
        let inv = self.load(investigation_id)?;
        if inv.status.is_terminal() {
            return Ok(inv);
        }
        if inv.lifecycle_stage != crate::investigation::LifecycleStage::InProgress {
            return Err(EngineError::InvalidTransition {
                from: inv.lifecycle_stage,
                to:   crate::investigation::LifecycleStage::Completed,
            });
        }

        log::info!(
            "running {} analyzers for investigation {investigation_id}",
            self.analyzers.len()
        );
        coordinator::run_domain_analyses(
            &self.store,
            investigation_id,
            &self.analyzers,
            &self.config,
        )?;

        match self.fuse_and_complete(investigation_id) {
            Ok(inv) => Ok(inv),
            // Cancelled/failed under us: surface the terminal record.
            Err(EngineError::TerminalState { .. }) => self.load(investigation_id),
            Err(e) => Err(e),
        }
    }

    fn fuse_and_complete(&self, investigation_id: &str) -> EngineResult<Investigation> {
        let current = self.patch_phase(investigation_id, "fusing_risk", 90.0)?;

        let settings = current.settings.as_ref().ok_or_else(|| {
            EngineError::Other(anyhow::anyhow!(
                "investigation {investigation_id} reached fusion without settings"
            ))
        })?;
        let intel = self.intel.lookup(&settings.entity_id, &settings.entity_type);
        let (internal, sources) = aggregate_internal(current.progress.findings.values());
        let external = intel.level.numeric();
        let agree = match internal {
            Some(i) => fusion::agreement(i, external),
            None => 0.0,
        };

        let fused = fusion::finalize(
            internal,
            external,
            intel.level,
            intel.event_count,
            agree,
            sources,
        );
        log::info!(
            "investigation {investigation_id} fused: display={} status={} strength={:.2}",
            fused.display,
            fused.status.as_str(),
            fused.evidence_strength
        );
        self.append(&InvestigationEvent::RiskFused {
            investigation_id:  investigation_id.to_string(),
            display:           fused.display.clone(),
            status:            fused.status,
            evidence_strength: fused.evidence_strength,
        })?;

        let mut patch = ProgressPatch {
            current_phase: Some("finalizing".to_string()),
            progress_percentage: Some(95.0),
            ..ProgressPatch::default()
        };
        patch.fused_risk = Some(fused.clone());
        let after = self.patch_retrying(investigation_id, &patch)?;

        lifecycle::complete(&self.store, investigation_id, after.version, fused)
    }

    /// CAS-retry a phase marker update. Conflicts re-read and retry;
    /// terminal surfaces to the caller.
    fn patch_phase(
        &self,
        investigation_id: &str,
        phase: &str,
        pct: f64,
    ) -> EngineResult<Investigation> {
        let patch = ProgressPatch {
            current_phase: Some(phase.to_string()),
            progress_percentage: Some(pct),
            ..ProgressPatch::default()
        };
        self.patch_retrying(investigation_id, &patch)
    }

    fn patch_retrying(
        &self,
        investigation_id: &str,
        patch: &ProgressPatch,
    ) -> EngineResult<Investigation> {
        loop {
            let current = self.load(investigation_id)?;
            match lifecycle::update_progress(&self.store, investigation_id, patch, current.version)
            {
                Ok(inv) => return Ok(inv),
                Err(EngineError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn load(&self, investigation_id: &str) -> EngineResult<Investigation> {
        self.store
            .get_investigation(investigation_id)?
            .ok_or(EngineError::NotFound)
    }

    fn append(&self, event: &InvestigationEvent) -> EngineResult<()> {
        self.store.append_event(&EventLogEntry::new(event)?)
    }
}

/// Confidence-weighted mean of the OK domain findings.
///
/// Returns `(None, 0)` when no domain produced usable evidence — the
/// fusion step then reports "needs more evidence" instead of a coerced
/// zero. `sources` counts the independent domains feeding the mean.
pub fn aggregate_internal<'a>(
    findings: impl Iterator<Item = &'a DomainFinding>,
) -> (Option<f64>, u32) {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    let mut plain_sum = 0.0;
    let mut sources = 0u32;

    for finding in findings {
        if finding.status != FindingStatus::Ok {
            continue;
        }
        let Some(score) = finding.risk_score else {
            continue;
        };
        let score = score.clamp(0.0, 1.0);
        let confidence = finding.confidence.clamp(0.0, 1.0);
        weighted_sum += confidence * score;
        weight_total += confidence;
        plain_sum += score;
        sources += 1;
    }

    if sources == 0 {
        return (None, 0);
    }
    // Zero total confidence degenerates to the unweighted mean.
    let fallback = plain_sum / sources as f64;
    let internal = safe_divide(weighted_sum, weight_total, fallback);
    (Some(internal.clamp(0.0, 1.0)), sources)
}
