//! The audit event log — every lifecycle transition and every recorded
//! domain finding leaves a row behind.
//!
//! RULE: the log is append-only. Events feed the results timeline and
//! post-hoc review; engine decisions never read them back.

use crate::error::EngineResult;
use crate::investigation::{FindingStatus, FusionStatus};
use crate::types::InvestigationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every event recorded during an investigation's life.
/// Variants are added as the engine grows — never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvestigationEvent {
    InvestigationCreated {
        investigation_id: InvestigationId,
        owner_id: String,
    },
    SettingsAttached {
        investigation_id: InvestigationId,
        entity_id: String,
        entity_type: String,
        domains: Vec<String>,
    },
    AnalysisStarted {
        investigation_id: InvestigationId,
    },
    DomainFindingRecorded {
        investigation_id: InvestigationId,
        domain: String,
        status: FindingStatus,
        risk_score: Option<f64>,
        evidence_count: usize,
    },
    RiskFused {
        investigation_id: InvestigationId,
        display: String,
        status: FusionStatus,
        evidence_strength: f64,
    },
    InvestigationCompleted {
        investigation_id: InvestigationId,
    },
    InvestigationFailed {
        investigation_id: InvestigationId,
        error: String,
    },
    InvestigationCancelled {
        investigation_id: InvestigationId,
    },
}

impl InvestigationEvent {
    /// Stable string tag for the event_type column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::InvestigationCreated { .. }   => "investigation_created",
            Self::SettingsAttached { .. }       => "settings_attached",
            Self::AnalysisStarted { .. }        => "analysis_started",
            Self::DomainFindingRecorded { .. }  => "domain_finding_recorded",
            Self::RiskFused { .. }              => "risk_fused",
            Self::InvestigationCompleted { .. } => "investigation_completed",
            Self::InvestigationFailed { .. }    => "investigation_failed",
            Self::InvestigationCancelled { .. } => "investigation_cancelled",
        }
    }

    pub fn investigation_id(&self) -> &str {
        match self {
            Self::InvestigationCreated { investigation_id, .. }
            | Self::SettingsAttached { investigation_id, .. }
            | Self::AnalysisStarted { investigation_id }
            | Self::DomainFindingRecorded { investigation_id, .. }
            | Self::RiskFused { investigation_id, .. }
            | Self::InvestigationCompleted { investigation_id }
            | Self::InvestigationFailed { investigation_id, .. }
            | Self::InvestigationCancelled { investigation_id } => investigation_id,
        }
    }
}

/// One row in the investigation_event table.
#[derive(Debug, Clone)]
pub struct EventLogEntry {
    pub event_id:         String,
    pub investigation_id: InvestigationId,
    pub event_type:       String,
    pub payload:          String,
    pub recorded_at:      DateTime<Utc>,
}

impl EventLogEntry {
    pub fn new(event: &InvestigationEvent) -> EngineResult<Self> {
        Ok(Self {
            event_id:         uuid::Uuid::new_v4().to_string(),
            investigation_id: event.investigation_id().to_string(),
            event_type:       event.type_name().to_string(),
            payload:          serde_json::to_string(event)?,
            recorded_at:      Utc::now(),
        })
    }
}
