//! Domain analyzer contract.
//!
//! RULE: analyzers are pure functions of the analysis context. They
//! never see orchestration plumbing, never touch the store, and never
//! unwind across this boundary — outcomes are data.

use crate::investigation::DomainFinding;
use crate::types::{EntityId, InvestigationId};
use serde::{Deserialize, Serialize};

/// Normalized context injected into every analyzer invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub investigation_id: InvestigationId,
    pub entity_id:        EntityId,
    pub entity_type:      String,
}

/// What one analyzer invocation produced. A degraded outcome records a
/// domain-scoped failure; it weakens evidence strength instead of
/// aborting the investigation.
#[derive(Debug, Clone)]
pub enum AnalyzerOutcome {
    Finding(DomainFinding),
    Degraded { reason: String },
}

impl AnalyzerOutcome {
    /// Collapse into the finding written to progress.
    pub fn into_finding(self) -> DomainFinding {
        match self {
            Self::Finding(finding) => finding,
            Self::Degraded { reason } => DomainFinding::degraded(reason),
        }
    }
}

/// The contract every domain analyzer fulfills.
pub trait DomainAnalyzer: Send + Sync {
    /// Unique stable name for this analysis domain.
    fn domain(&self) -> &'static str;

    /// Produce a finding for the entity in `ctx`.
    fn analyze(&self, ctx: &AnalysisContext) -> AnalyzerOutcome;
}
