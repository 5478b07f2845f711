//! Adaptive polling cadence and weak cache validators.
//!
//! RULES:
//!   - The cadence mapping is monotone in activity: an idle
//!     investigation never polls faster than an active one, an active
//!     one never faster than one still in setup.
//!   - Validators fail closed: anything malformed never matches, which
//!     costs a full fetch rather than risking an incorrect 304.

use crate::{
    config::EngineConfig,
    investigation::{InvestigationStatus, LifecycleStage},
    types::Version,
};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Recommended client poll interval for the observed state.
pub fn recommended_interval_ms(
    status: InvestigationStatus,
    stage: LifecycleStage,
    idle_duration_ms: u64,
    config: &EngineConfig,
) -> u64 {
    let intervals = &config.intervals;
    if status.is_terminal() {
        return intervals.terminal_ms;
    }
    match stage {
        LifecycleStage::Created | LifecycleStage::Settings => intervals.setup_ms,
        LifecycleStage::InProgress => {
            if idle_duration_ms > config.idle_threshold_ms {
                intervals.idle_ms
            } else {
                intervals.active_ms
            }
        }
        // Stage says done but status has not caught up; no reason to
        // poll eagerly.
        LifecycleStage::Completed => intervals.default_ms,
    }
}

/// Weak validator for one (investigation, version) pair. Deterministic:
/// identical inputs always produce identical output, any version change
/// produces a different one.
pub fn etag(investigation_id: &str, version: Version) -> String {
    let mut hasher = Sha256::new();
    hasher.update(investigation_id.as_bytes());
    hasher.update(b":");
    hasher.update(version.to_string().as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(16);
    for byte in &digest[..8] {
        let _ = write!(hex, "{byte:02x}");
    }
    format!("W/\"{version}-{hex}\"")
}

/// Compare a client-supplied validator against the current version.
/// Only the version component is compared (weak semantics); malformed
/// validators never match.
pub fn etag_matches(current_version: Version, client_etag: &str) -> bool {
    let inner = client_etag.trim();
    let inner = inner.strip_prefix("W/").unwrap_or(inner);
    let inner = inner.trim_matches('"');
    let Some((version_part, _digest)) = inner.split_once('-') else {
        return false;
    };
    match version_part.parse::<Version>() {
        Ok(v) => v == current_version,
        Err(_) => false,
    }
}
