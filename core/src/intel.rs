//! External threat-intelligence boundary.
//!
//! The engine never sees raw intel feeds — only the normalized
//! `{level, event_count}` summary a provider produces. Providers absorb
//! their own lookup failures and fall back to `Minimal` with zero
//! events; degraded intel is data, not a fault.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse external corroboration level reported by threat intel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatIntelLevel {
    Minimal,
    Low,
    Medium,
    High,
}

impl ThreatIntelLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low     => "low",
            Self::Medium  => "medium",
            Self::High    => "high",
        }
    }

    /// Band midpoint used when the fusion step needs the level as a
    /// numeric external score.
    pub fn numeric(&self) -> f64 {
        match self {
            Self::Minimal => 0.10,
            Self::Low     => 0.35,
            Self::Medium  => 0.60,
            Self::High    => 0.85,
        }
    }
}

impl fmt::Display for ThreatIntelLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized external intelligence for one entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThreatIntelSummary {
    pub level:       ThreatIntelLevel,
    pub event_count: u32,
}

impl ThreatIntelSummary {
    /// The summary a provider returns when it has nothing (or failed).
    pub fn none() -> Self {
        Self {
            level:       ThreatIntelLevel::Minimal,
            event_count: 0,
        }
    }
}

/// One external intelligence source, looked up per entity.
pub trait ThreatIntelProvider: Send {
    fn lookup(&self, entity_id: &str, entity_type: &str) -> ThreatIntelSummary;
}
