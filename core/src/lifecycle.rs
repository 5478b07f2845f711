//! Investigation state machine.
//!
//! CREATED → SETTINGS → IN_PROGRESS → exactly one of
//! COMPLETED | ERROR | CANCELLED.
//!
//! RULES:
//!   - Every mutation takes the version the caller last observed and is
//!     a compare-and-swap against the stored row. A losing writer gets
//!     `VersionConflict` and retries after re-reading; the engine never
//!     retries silently on the caller's behalf.
//!   - Terminal transitions retried with the same resulting status are
//!     idempotent no-ops; a different terminal status is a conflict.
//!   - Settings are write-once. Progress only grows.

use crate::{
    error::{EngineError, EngineResult},
    event::{EventLogEntry, InvestigationEvent},
    investigation::{
        FusedRiskResult, Investigation, InvestigationProgress, InvestigationSettings,
        InvestigationStatus, LifecycleStage, ProgressPatch,
    },
    store::InvestigationStore,
    types::Version,
};
use chrono::Utc;

/// Create a new investigation in CREATED at version 1.
pub fn create(
    store: &InvestigationStore,
    investigation_id: &str,
    owner_id: &str,
) -> EngineResult<Investigation> {
    let now = Utc::now();
    let inv = Investigation {
        investigation_id: investigation_id.to_string(),
        owner_id:         owner_id.to_string(),
        lifecycle_stage:  LifecycleStage::Created,
        status:           InvestigationStatus::Created,
        settings:         None,
        progress:         InvestigationProgress::default(),
        version:          1,
        created_at:       now,
        updated_at:       now,
        last_accessed:    None,
    };
    store.insert_investigation(&inv)?;
    append(
        store,
        &InvestigationEvent::InvestigationCreated {
            investigation_id: inv.investigation_id.clone(),
            owner_id:         inv.owner_id.clone(),
        },
    )?;
    log::info!("investigation {investigation_id} created for {owner_id}");
    Ok(inv)
}

/// Attach write-once settings; CREATED → SETTINGS.
pub fn attach_settings(
    store: &InvestigationStore,
    investigation_id: &str,
    settings: InvestigationSettings,
    expected_version: Version,
) -> EngineResult<Investigation> {
    let current = load(store, investigation_id)?;
    guard_not_terminal(&current)?;
    guard_version(&current, expected_version)?;
    if current.lifecycle_stage != LifecycleStage::Created {
        return Err(EngineError::InvalidTransition {
            from: current.lifecycle_stage,
            to:   LifecycleStage::Settings,
        });
    }

    let mut next = current;
    next.settings = Some(settings.clone());
    next.lifecycle_stage = LifecycleStage::Settings;
    next.status = InvestigationStatus::Settings;
    next.progress.current_phase = "settings".to_string();
    commit(store, next, expected_version, |inv| {
        InvestigationEvent::SettingsAttached {
            investigation_id: inv.investigation_id.clone(),
            entity_id:        settings.entity_id.clone(),
            entity_type:      settings.entity_type.clone(),
            domains:          settings.domains.clone(),
        }
    })
}

/// SETTINGS → IN_PROGRESS. Requires settings present.
pub fn advance_to_in_progress(
    store: &InvestigationStore,
    investigation_id: &str,
    expected_version: Version,
) -> EngineResult<Investigation> {
    let current = load(store, investigation_id)?;
    guard_not_terminal(&current)?;
    guard_version(&current, expected_version)?;
    if current.lifecycle_stage != LifecycleStage::Settings || current.settings.is_none() {
        return Err(EngineError::InvalidTransition {
            from: current.lifecycle_stage,
            to:   LifecycleStage::InProgress,
        });
    }

    let mut next = current;
    next.lifecycle_stage = LifecycleStage::InProgress;
    next.status = InvestigationStatus::InProgress;
    next.progress.current_phase = "in_progress".to_string();
    commit(store, next, expected_version, |inv| {
        InvestigationEvent::AnalysisStarted {
            investigation_id: inv.investigation_id.clone(),
        }
    })
}

/// Merge a progress patch. Findings upsert by domain key; phase and
/// percentage move forward only. Rejected once terminal.
pub fn update_progress(
    store: &InvestigationStore,
    investigation_id: &str,
    patch: &ProgressPatch,
    expected_version: Version,
) -> EngineResult<Investigation> {
    let current = load(store, investigation_id)?;
    guard_not_terminal(&current)?;
    guard_version(&current, expected_version)?;

    let mut next = current;
    next.progress.apply(patch);
    commit_quiet(store, next, expected_version)
}

/// IN_PROGRESS → COMPLETED, carrying the fused verdict.
pub fn complete(
    store: &InvestigationStore,
    investigation_id: &str,
    expected_version: Version,
    final_result: FusedRiskResult,
) -> EngineResult<Investigation> {
    let current = load(store, investigation_id)?;
    if current.status.is_terminal() {
        return idempotent_terminal(current, InvestigationStatus::Completed);
    }
    guard_version(&current, expected_version)?;
    if current.lifecycle_stage != LifecycleStage::InProgress {
        return Err(EngineError::InvalidTransition {
            from: current.lifecycle_stage,
            to:   LifecycleStage::Completed,
        });
    }

    let mut next = current;
    next.lifecycle_stage = LifecycleStage::Completed;
    next.status = InvestigationStatus::Completed;
    next.progress.fused_risk = Some(final_result);
    next.progress.current_phase = "completed".to_string();
    next.progress.progress_percentage = 100.0;
    commit(store, next, expected_version, |inv| {
        InvestigationEvent::InvestigationCompleted {
            investigation_id: inv.investigation_id.clone(),
        }
    })
}

/// Terminal failure. Allowed from any non-terminal phase.
pub fn fail(
    store: &InvestigationStore,
    investigation_id: &str,
    expected_version: Version,
    error: &str,
) -> EngineResult<Investigation> {
    let current = load(store, investigation_id)?;
    if current.status.is_terminal() {
        return idempotent_terminal(current, InvestigationStatus::Error);
    }
    guard_version(&current, expected_version)?;

    let mut next = current;
    next.status = InvestigationStatus::Error;
    next.progress.current_phase = "error".to_string();
    let error = error.to_string();
    commit(store, next, expected_version, move |inv| {
        InvestigationEvent::InvestigationFailed {
            investigation_id: inv.investigation_id.clone(),
            error:            error.clone(),
        }
    })
}

/// Cooperative cancellation. Allowed from any non-terminal phase;
/// in-flight analyzer work observes it at its next progress write.
pub fn cancel(
    store: &InvestigationStore,
    investigation_id: &str,
    expected_version: Version,
) -> EngineResult<Investigation> {
    let current = load(store, investigation_id)?;
    if current.status.is_terminal() {
        return idempotent_terminal(current, InvestigationStatus::Cancelled);
    }
    guard_version(&current, expected_version)?;

    let mut next = current;
    next.status = InvestigationStatus::Cancelled;
    next.progress.current_phase = "cancelled".to_string();
    commit(store, next, expected_version, |inv| {
        InvestigationEvent::InvestigationCancelled {
            investigation_id: inv.investigation_id.clone(),
        }
    })
}

// ── Internals ────────────────────────────────────────────────────────────────

fn load(store: &InvestigationStore, investigation_id: &str) -> EngineResult<Investigation> {
    store
        .get_investigation(investigation_id)?
        .ok_or(EngineError::NotFound)
}

fn guard_not_terminal(current: &Investigation) -> EngineResult<()> {
    if current.status.is_terminal() {
        return Err(EngineError::TerminalState {
            status: current.status,
        });
    }
    Ok(())
}

fn guard_version(current: &Investigation, expected_version: Version) -> EngineResult<()> {
    if current.version != expected_version {
        return Err(EngineError::VersionConflict {
            expected: expected_version,
            actual:   current.version,
        });
    }
    Ok(())
}

/// Retrying a terminal transition that already landed with the same
/// status is a no-op; a different terminal intent is a conflict.
fn idempotent_terminal(
    current: Investigation,
    target: InvestigationStatus,
) -> EngineResult<Investigation> {
    if current.status == target {
        Ok(current)
    } else {
        Err(EngineError::TerminalState {
            status: current.status,
        })
    }
}

/// Bump the version, CAS-write, then append the transition event.
fn commit(
    store: &InvestigationStore,
    mut next: Investigation,
    expected_version: Version,
    event: impl FnOnce(&Investigation) -> InvestigationEvent,
) -> EngineResult<Investigation> {
    next.version = expected_version + 1;
    next.updated_at = Utc::now();
    store.update_investigation_cas(&next, expected_version)?;
    append(store, &event(&next))?;
    log::debug!(
        "investigation {} -> {} (v{})",
        next.investigation_id,
        next.status,
        next.version
    );
    Ok(next)
}

/// As `commit`, for the high-frequency progress path that logs no event
/// of its own (the coordinator records finding events explicitly).
fn commit_quiet(
    store: &InvestigationStore,
    mut next: Investigation,
    expected_version: Version,
) -> EngineResult<Investigation> {
    next.version = expected_version + 1;
    next.updated_at = Utc::now();
    store.update_investigation_cas(&next, expected_version)?;
    Ok(next)
}

fn append(store: &InvestigationStore, event: &InvestigationEvent) -> EngineResult<()> {
    store.append_event(&EventLogEntry::new(event)?)
}
