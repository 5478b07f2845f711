//! Read-side services: client-facing status and final-results views.
//!
//! RULES:
//!   - Unknown id and unauthorized caller are the same `NotFound` — the
//!     read side never leaks which investigations exist.
//!   - A failed or cancelled investigation reads as a normal terminal
//!     status payload. Failure is data, not a fault.

use crate::{
    cache::PollCache,
    config::EngineConfig,
    error::{EngineError, EngineResult},
    event::EventLogEntry,
    fusion,
    investigation::{
        EvidenceItem, FindingStatus, FusionStatus, Investigation, InvestigationStatus,
        LifecycleStage,
    },
    polling,
    store::InvestigationStore,
    types::Version,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

// ── Status view ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct FusedRiskView {
    pub display: String,
    pub status:  FusionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub investigation_id:             String,
    pub status:                       InvestigationStatus,
    pub lifecycle_stage:              LifecycleStage,
    pub progress_percentage:          f64,
    pub current_phase:                String,
    pub fused_risk:                   FusedRiskView,
    pub recommended_poll_interval_ms: u64,
    pub etag:                         String,
    #[serde(skip_serializing)]
    pub version:                      Version,
}

/// Either a full payload or a bodyless not-modified, mirroring
/// 200-vs-304 at the transport the host wires up.
#[derive(Debug, Clone)]
pub enum StatusOutcome {
    NotModified,
    Status(StatusResponse),
}

pub struct StatusService<'a> {
    store:  &'a InvestigationStore,
    cache:  &'a PollCache,
    config: &'a EngineConfig,
}

impl<'a> StatusService<'a> {
    pub fn new(store: &'a InvestigationStore, cache: &'a PollCache, config: &'a EngineConfig) -> Self {
        Self { store, cache, config }
    }

    /// Serve one status poll. Cache hit within TTL never touches the
    /// durable store; a miss fetches, authorizes, and repopulates.
    pub fn get_status(
        &self,
        investigation_id: &str,
        caller_id: &str,
        if_none_match: Option<&str>,
    ) -> EngineResult<StatusOutcome> {
        let response = match self.cache.get(investigation_id, caller_id) {
            Some(cached) => cached,
            None => {
                let fresh = self.fetch_status(investigation_id, caller_id)?;
                self.cache.put(investigation_id, caller_id, fresh.clone());
                fresh
            }
        };

        if let Some(client_etag) = if_none_match {
            if polling::etag_matches(response.version, client_etag) {
                return Ok(StatusOutcome::NotModified);
            }
        }
        Ok(StatusOutcome::Status(response))
    }

    fn fetch_status(&self, investigation_id: &str, caller_id: &str) -> EngineResult<StatusResponse> {
        let inv = self.load_authorized(investigation_id, caller_id)?;
        let now = Utc::now();
        self.store.touch_last_accessed(investigation_id, now)?;

        let idle_ms = (now - inv.updated_at).num_milliseconds().max(0) as u64;
        let fused_risk = fused_view(&inv);
        Ok(StatusResponse {
            investigation_id: inv.investigation_id.clone(),
            status: inv.status,
            lifecycle_stage: inv.lifecycle_stage,
            progress_percentage: inv.progress.progress_percentage,
            current_phase: inv.progress.current_phase.clone(),
            fused_risk,
            recommended_poll_interval_ms: polling::recommended_interval_ms(
                inv.status,
                inv.lifecycle_stage,
                idle_ms,
                self.config,
            ),
            etag: polling::etag(&inv.investigation_id, inv.version),
            version: inv.version,
        })
    }

    fn load_authorized(
        &self,
        investigation_id: &str,
        caller_id: &str,
    ) -> EngineResult<Investigation> {
        let inv = self
            .store
            .get_investigation(investigation_id)?
            .ok_or(EngineError::NotFound)?;
        if inv.owner_id != caller_id {
            return Err(EngineError::NotFound);
        }
        Ok(inv)
    }
}

fn fused_view(inv: &Investigation) -> FusedRiskView {
    match &inv.progress.fused_risk {
        Some(fused) => FusedRiskView {
            display: fused.display.clone(),
            status:  fused.status,
        },
        None => {
            let published = fusion::publish(None, FusionStatus::NeedsMoreEvidence);
            FusedRiskView {
                display: published.display,
                status:  published.status,
            }
        }
    }
}

// ── Results view ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct FindingSummary {
    pub domain:         String,
    pub risk_score:     Option<f64>,
    pub confidence:     f64,
    pub status:         FindingStatus,
    pub evidence_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason:         Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub event_type:  String,
    pub recorded_at: DateTime<Utc>,
    pub detail:      serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultsMetadata {
    pub entity_id:        String,
    pub entity_type:      String,
    pub domains_analyzed: Vec<String>,
    pub created_at:       DateTime<Utc>,
    pub completed_at:     DateTime<Utc>,
    pub version:          Version,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultsReport {
    pub investigation_id:  String,
    pub risk_score:        Option<f64>,
    pub risk_display:      String,
    pub risk_level:        String,
    pub evidence_strength: f64,
    pub findings:          Vec<FindingSummary>,
    pub evidence:          Vec<EvidenceItem>,
    pub recommendations:   Vec<String>,
    pub timeline:          Vec<TimelineEntry>,
    pub metadata:          ResultsMetadata,
}

pub struct ResultsService<'a> {
    store: &'a InvestigationStore,
}

impl<'a> ResultsService<'a> {
    pub fn new(store: &'a InvestigationStore) -> Self {
        Self { store }
    }

    /// Full report for a completed investigation. `NotCompleted` until
    /// the terminal verdict lands.
    pub fn get_results(
        &self,
        investigation_id: &str,
        caller_id: &str,
    ) -> EngineResult<ResultsReport> {
        let inv = self
            .store
            .get_investigation(investigation_id)?
            .ok_or(EngineError::NotFound)?;
        if inv.owner_id != caller_id {
            return Err(EngineError::NotFound);
        }
        if inv.status != InvestigationStatus::Completed {
            return Err(EngineError::NotCompleted { status: inv.status });
        }

        let fused = inv.progress.fused_risk.clone();
        let (risk_score, risk_display, evidence_strength) = match &fused {
            Some(f) => (f.final_score, f.display.clone(), f.evidence_strength),
            None => (None, "N/A".to_string(), 0.0),
        };

        let mut findings: Vec<FindingSummary> = inv
            .progress
            .findings
            .iter()
            .map(|(domain, f)| FindingSummary {
                domain:         domain.clone(),
                risk_score:     f.risk_score,
                confidence:     f.confidence,
                status:         f.status,
                evidence_count: f.evidence.len(),
                reason:         f.reason.clone(),
            })
            .collect();
        findings.sort_by(|a, b| a.domain.cmp(&b.domain));

        let evidence: Vec<EvidenceItem> = inv
            .progress
            .findings
            .values()
            .flat_map(|f| f.evidence.iter().cloned())
            .collect();

        let settings = inv.settings.clone().unwrap_or_else(|| {
            crate::investigation::InvestigationSettings::new("", "", Vec::new())
        });

        Ok(ResultsReport {
            investigation_id: inv.investigation_id.clone(),
            risk_score,
            risk_display,
            risk_level: risk_level(risk_score).to_string(),
            evidence_strength,
            recommendations: recommendations(&fused, &inv),
            findings,
            evidence,
            timeline: self.timeline(investigation_id)?,
            metadata: ResultsMetadata {
                entity_id:        settings.entity_id,
                entity_type:      settings.entity_type,
                domains_analyzed: inv.progress.findings.keys().cloned().collect(),
                created_at:       inv.created_at,
                completed_at:     inv.updated_at,
                version:          inv.version,
            },
        })
    }

    fn timeline(&self, investigation_id: &str) -> EngineResult<Vec<TimelineEntry>> {
        let entries = self.store.events_for_investigation(investigation_id)?;
        entries.into_iter().map(timeline_entry).collect()
    }
}

fn timeline_entry(entry: EventLogEntry) -> EngineResult<TimelineEntry> {
    Ok(TimelineEntry {
        event_type:  entry.event_type,
        recorded_at: entry.recorded_at,
        detail:      serde_json::from_str(&entry.payload)?,
    })
}

/// Coarse banding of a fused score for the report header.
pub fn risk_level(score: Option<f64>) -> &'static str {
    match score {
        None => "unknown",
        Some(s) if s < 0.25 => "low",
        Some(s) if s < 0.50 => "medium",
        Some(s) if s < 0.75 => "high",
        Some(_) => "critical",
    }
}

fn recommendations(
    fused: &Option<crate::investigation::FusedRiskResult>,
    inv: &Investigation,
) -> Vec<String> {
    let mut out = Vec::new();
    match fused.as_ref().map(|f| f.status) {
        Some(FusionStatus::CappedForLowEvidence) => {
            out.push(
                "Verdict capped for low evidence; gather corroborating data before acting."
                    .to_string(),
            );
        }
        Some(FusionStatus::NeedsMoreEvidence) | None => {
            out.push("No usable evidence was collected; re-run analysis with a wider scope."
                .to_string());
        }
        Some(FusionStatus::Ok) => {}
    }
    if let Some(score) = fused.as_ref().and_then(|f| f.final_score) {
        if score >= 0.75 {
            out.push("Escalate to a human investigator for review.".to_string());
        }
    }
    for (domain, finding) in &inv.progress.findings {
        if finding.status == FindingStatus::InsufficientEvidence {
            out.push(format!("Re-run the {domain} analyzer; its evidence was degraded."));
        }
    }
    if out.is_empty() {
        out.push("No further action required; archive per retention policy.".to_string());
    }
    out
}
