//! Engine configuration.
//!
//! Defaults carry the tuned constants; a JSON file can override any
//! subset of fields for a deployment.

use crate::error::EngineResult;
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Recommended polling cadence per investigation state, milliseconds.
///
/// The mapping from (activity, phase) to cadence is monotone: idle must
/// never poll faster than active, active never faster than setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollIntervals {
    pub setup_ms:    u64,
    pub active_ms:   u64,
    pub terminal_ms: u64,
    pub default_ms:  u64,
    pub idle_ms:     u64,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            setup_ms:    2_000,
            active_ms:   3_000,
            terminal_ms: 5_000,
            default_ms:  15_000,
            idle_ms:     60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bound on analyzer workers in flight per investigation.
    pub max_concurrent_analyzers: usize,
    /// Deadline per analyzer invocation; a late analyzer is treated as
    /// a failed one.
    pub analyzer_timeout_ms: u64,
    /// TTL for the per-(investigation, caller) status cache.
    pub cache_ttl_ms: u64,
    /// An IN_PROGRESS investigation with no writes for this long counts
    /// as idle for polling purposes.
    pub idle_threshold_ms: u64,
    pub intervals: PollIntervals,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_analyzers: 4,
            analyzer_timeout_ms:      30_000,
            cache_ttl_ms:             2_000,
            idle_threshold_ms:        300_000,
            intervals:                PollIntervals::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_file(path: &str) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine config {path}"))?;
        Ok(serde_json::from_str(&text)?)
    }
}
