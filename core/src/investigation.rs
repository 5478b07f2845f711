//! Investigation data model — the durable record of one unit of
//! fraud-analysis work.
//!
//! RULES:
//!   - `version` starts at 1 and bumps on every successful mutation.
//!   - `settings` is write-once; attached before IN_PROGRESS, frozen after.
//!   - `progress` only grows: findings upsert by domain, percentage never
//!     moves backwards, a later phase never reverts to an earlier one.
//!   - Once `status` is terminal no further progress mutation is permitted.
//!
//! `settings` and `progress` are persisted as JSON blobs carrying a
//! `schema_version` field so domain-specific fields can evolve additively
//! without a schema migration.

use crate::timing::TimingSample;
use crate::types::{EntityId, InvestigationId, OwnerId, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const SETTINGS_SCHEMA_VERSION: u32 = 1;
pub const PROGRESS_SCHEMA_VERSION: u32 = 1;

// ── Lifecycle enums ──────────────────────────────────────────────────────────

/// Coarse phase of the investigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Created,
    Settings,
    InProgress,
    Completed,
}

impl LifecycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created    => "created",
            Self::Settings   => "settings",
            Self::InProgress => "in_progress",
            Self::Completed  => "completed",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "created"     => Some(Self::Created),
            "settings"    => Some(Self::Settings),
            "in_progress" => Some(Self::InProgress),
            "completed"   => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operational outcome. Superset of [`LifecycleStage`] so terminal
/// failure and cancellation are captured independently of phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    Created,
    Settings,
    InProgress,
    Completed,
    Error,
    Cancelled,
}

impl InvestigationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created    => "created",
            Self::Settings   => "settings",
            Self::InProgress => "in_progress",
            Self::Completed  => "completed",
            Self::Error      => "error",
            Self::Cancelled  => "cancelled",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "created"     => Some(Self::Created),
            "settings"    => Some(Self::Settings),
            "in_progress" => Some(Self::InProgress),
            "completed"   => Some(Self::Completed),
            "error"       => Some(Self::Error),
            "cancelled"   => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }
}

impl fmt::Display for InvestigationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Settings ─────────────────────────────────────────────────────────────────

/// Configuration chosen at creation: the entity under investigation and
/// the analysis scope. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationSettings {
    pub schema_version: u32,
    pub entity_id:      EntityId,
    pub entity_type:    String,
    /// Analysis domains requested, e.g. "network", "device".
    pub domains:        Vec<String>,
    pub priority:       String,
}

impl InvestigationSettings {
    pub fn new(
        entity_id: impl Into<EntityId>,
        entity_type: impl Into<String>,
        domains: Vec<String>,
    ) -> Self {
        Self {
            schema_version: SETTINGS_SCHEMA_VERSION,
            entity_id:      entity_id.into(),
            entity_type:    entity_type.into(),
            domains,
            priority:       "routine".to_string(),
        }
    }
}

// ── Domain findings ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingStatus {
    Ok,
    InsufficientEvidence,
}

/// One piece of evidence backing a domain finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub kind:        String,
    pub detail:      String,
    pub observed_at: DateTime<Utc>,
}

/// Normalized output of one domain analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainFinding {
    pub risk_score: Option<f64>,
    /// Analyzer self-reported confidence in [0, 1].
    pub confidence: f64,
    pub evidence:   Vec<EvidenceItem>,
    pub status:     FindingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason:     Option<String>,
}

impl DomainFinding {
    /// The finding recorded for a failed, timed-out, or panicked
    /// analyzer: no score, no confidence, degraded evidence.
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            risk_score: None,
            confidence: 0.0,
            evidence:   Vec::new(),
            status:     FindingStatus::InsufficientEvidence,
            reason:     Some(reason.into()),
        }
    }
}

// ── Fused risk ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStatus {
    Ok,
    CappedForLowEvidence,
    NeedsMoreEvidence,
}

impl FusionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok                   => "ok",
            Self::CappedForLowEvidence => "capped_for_low_evidence",
            Self::NeedsMoreEvidence    => "needs_more_evidence",
        }
    }
}

/// The gated verdict the fusion engine writes back into progress.
/// `display` is the publish-safe form: absent evidence shows as "N/A",
/// never as "0.00".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedRiskResult {
    #[serde(rename = "final")]
    pub final_score:       Option<f64>,
    pub display:           String,
    pub status:            FusionStatus,
    pub evidence_strength: f64,
}

// ── Progress ─────────────────────────────────────────────────────────────────

/// Mutable, monotonically growing analysis state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationProgress {
    pub schema_version:      u32,
    pub current_phase:       String,
    pub progress_percentage: f64,
    /// Per-domain findings, upserted by domain key.
    pub findings:            BTreeMap<String, DomainFinding>,
    pub fused_risk:          Option<FusedRiskResult>,
    /// Per-domain analyzer timings recorded by the timing guard.
    pub timings:             BTreeMap<String, TimingSample>,
}

impl Default for InvestigationProgress {
    fn default() -> Self {
        Self {
            schema_version:      PROGRESS_SCHEMA_VERSION,
            current_phase:       "created".to_string(),
            progress_percentage: 0.0,
            findings:            BTreeMap::new(),
            fused_risk:          None,
            timings:             BTreeMap::new(),
        }
    }
}

/// A partial update merged into [`InvestigationProgress`]. Findings and
/// timings upsert by domain key; phase and fused risk replace;
/// percentage only ever increases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressPatch {
    pub current_phase:       Option<String>,
    pub progress_percentage: Option<f64>,
    pub findings:            BTreeMap<String, DomainFinding>,
    pub timings:             BTreeMap<String, TimingSample>,
    pub fused_risk:          Option<FusedRiskResult>,
}

impl InvestigationProgress {
    pub fn apply(&mut self, patch: &ProgressPatch) {
        if let Some(phase) = &patch.current_phase {
            self.current_phase = phase.clone();
        }
        if let Some(pct) = patch.progress_percentage {
            let pct = pct.clamp(0.0, 100.0);
            if pct > self.progress_percentage {
                self.progress_percentage = pct;
            }
        }
        for (domain, finding) in &patch.findings {
            self.findings.insert(domain.clone(), finding.clone());
        }
        for (domain, sample) in &patch.timings {
            self.timings.insert(domain.clone(), sample.clone());
        }
        if let Some(fused) = &patch.fused_risk {
            self.fused_risk = Some(fused.clone());
        }
    }
}

// ── The record ───────────────────────────────────────────────────────────────

/// The durable record of one investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investigation {
    pub investigation_id: InvestigationId,
    pub owner_id:         OwnerId,
    pub lifecycle_stage:  LifecycleStage,
    pub status:           InvestigationStatus,
    pub settings:         Option<InvestigationSettings>,
    pub progress:         InvestigationProgress,
    pub version:          Version,
    pub created_at:       DateTime<Utc>,
    pub updated_at:       DateTime<Utc>,
    pub last_accessed:    Option<DateTime<Utc>>,
}
