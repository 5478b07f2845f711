//! Agent coordination layer.
//!
//! Wraps every domain analyzer call: repairs the shared analysis
//! context, runs the analyzer on a worker thread under the timing guard
//! and a deadline, contains panics, and merges the outcome into
//! investigation progress through the version compare-and-swap path.
//!
//! RULES:
//!   - A failed, timed-out, or panicked analyzer degrades evidence for
//!     its domain; it never aborts the investigation.
//!   - Each worker retries its own merge against the latest version —
//!     no worker assumes exclusive ownership of the row.
//!   - A terminal status observed at merge time stops the worker
//!     quietly (cooperative cancellation).
//!   - At most `max_concurrent_analyzers` workers are in flight.

use crate::{
    analyzer::{AnalysisContext, AnalyzerOutcome, DomainAnalyzer},
    config::EngineConfig,
    error::{EngineError, EngineResult},
    event::{EventLogEntry, InvestigationEvent},
    investigation::{DomainFinding, Investigation, ProgressPatch},
    lifecycle,
    store::InvestigationStore,
    timing::{safe_divide, TimingGuard, TimingSample},
};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A possibly incomplete context supplied by the caller. Absent fields
/// are recovered from the investigation record before invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialContext {
    pub investigation_id: Option<String>,
    pub entity_id:        Option<String>,
    pub entity_type:      Option<String>,
}

/// Build a normalized, consistent context for analyzer invocation.
///
/// The investigation record is authoritative for the id; entity fields
/// fall back to the attached settings when the caller did not supply
/// them. Analyzers never re-implement this discovery.
pub fn repair_context(inv: &Investigation, partial: &PartialContext) -> AnalysisContext {
    let settings = inv.settings.as_ref();
    AnalysisContext {
        investigation_id: inv.investigation_id.clone(),
        entity_id:        partial
            .entity_id
            .clone()
            .or_else(|| settings.map(|s| s.entity_id.clone()))
            .unwrap_or_default(),
        entity_type:      partial
            .entity_type
            .clone()
            .or_else(|| settings.map(|s| s.entity_type.clone()))
            .unwrap_or_default(),
    }
}

/// Fan the registered analyzers out over the investigation, merging
/// every outcome back into progress. Returns once every domain has
/// either reported or been recorded as degraded.
pub fn run_domain_analyses(
    store: &InvestigationStore,
    investigation_id: &str,
    analyzers: &[Arc<dyn DomainAnalyzer>],
    config: &EngineConfig,
) -> EngineResult<()> {
    let inv = store
        .get_investigation(investigation_id)?
        .ok_or(EngineError::NotFound)?;
    let ctx = repair_context(&inv, &PartialContext::default());
    let total_domains = analyzers.len().max(1);
    let timeout = Duration::from_millis(config.analyzer_timeout_ms);

    let chunk = config.max_concurrent_analyzers.max(1);
    for batch in analyzers.chunks(chunk) {
        let mut in_flight = Vec::with_capacity(batch.len());

        for analyzer in batch {
            let analyzer = Arc::clone(analyzer);
            let domain = analyzer.domain();
            let ctx = ctx.clone();
            let worker_store = store.reopen()?;
            let id = investigation_id.to_string();
            let (tx, rx) = mpsc::channel::<()>();

            thread::spawn(move || {
                let (finding, sample) = invoke_guarded(analyzer.as_ref(), &ctx);
                merge_finding(&worker_store, &id, domain, finding, sample, total_domains);
                // Receiver gone means the deadline already passed and the
                // domain was recorded as degraded; nothing left to report.
                let _ = tx.send(());
            });

            in_flight.push((domain, rx));
        }

        for (domain, rx) in in_flight {
            if rx.recv_timeout(timeout).is_err() {
                log::warn!("analyzer {domain} missed its {}ms deadline", config.analyzer_timeout_ms);
                merge_finding(
                    store,
                    investigation_id,
                    domain,
                    DomainFinding::degraded(format!(
                        "analyzer timed out after {}ms",
                        config.analyzer_timeout_ms
                    )),
                    TimingSample::default(),
                    total_domains,
                );
            }
        }
    }

    Ok(())
}

/// Run one analyzer under the timing guard with panic containment.
fn invoke_guarded(
    analyzer: &dyn DomainAnalyzer,
    ctx: &AnalysisContext,
) -> (DomainFinding, TimingSample) {
    let mut sample = TimingSample::default();
    let outcome = {
        let _guard = TimingGuard::start(&mut sample);
        match catch_unwind(AssertUnwindSafe(|| analyzer.analyze(ctx))) {
            Ok(outcome) => outcome,
            Err(_) => AnalyzerOutcome::Degraded {
                reason: "analyzer panicked".to_string(),
            },
        }
    };
    (outcome.into_finding(), sample)
}

/// CAS-retry merge of one domain's finding into progress.
///
/// First write for a domain wins: a straggler finishing after its
/// deadline must not displace the recorded timeout. Terminal status
/// stops the merge quietly; other errors are logged and dropped, since
/// a single domain's bookkeeping failure must not poison its siblings.
fn merge_finding(
    store: &InvestigationStore,
    investigation_id: &str,
    domain: &'static str,
    finding: DomainFinding,
    sample: TimingSample,
    total_domains: usize,
) {
    loop {
        let current = match store.get_investigation(investigation_id) {
            Ok(Some(inv)) => inv,
            Ok(None) => {
                log::error!("investigation {investigation_id} vanished during analysis");
                return;
            }
            Err(e) => {
                log::error!("re-read failed merging {domain} finding: {e}");
                return;
            }
        };
        if current.status.is_terminal() {
            log::info!(
                "investigation {investigation_id} is {}; dropping {domain} finding",
                current.status
            );
            return;
        }
        if current.progress.findings.contains_key(domain) {
            return;
        }

        let reported = current.progress.findings.len() + 1;
        let pct = 10.0 + safe_divide(reported as f64, total_domains as f64, 0.0) * 80.0;
        let mut patch = ProgressPatch {
            current_phase: Some("collecting_domain_findings".to_string()),
            progress_percentage: Some(pct),
            ..ProgressPatch::default()
        };
        patch.findings.insert(domain.to_string(), finding.clone());
        patch.timings.insert(domain.to_string(), sample.clone());

        match lifecycle::update_progress(store, investigation_id, &patch, current.version) {
            Ok(_) => {
                record_finding_event(store, investigation_id, domain, &finding);
                return;
            }
            // Lost the race: re-read and retry against the new version.
            Err(EngineError::VersionConflict { .. }) => continue,
            Err(EngineError::TerminalState { status }) => {
                log::info!(
                    "investigation {investigation_id} went {status} mid-merge; {domain} stops"
                );
                return;
            }
            Err(e) => {
                log::error!("merging {domain} finding failed: {e}");
                return;
            }
        }
    }
}

fn record_finding_event(
    store: &InvestigationStore,
    investigation_id: &str,
    domain: &str,
    finding: &DomainFinding,
) {
    let event = InvestigationEvent::DomainFindingRecorded {
        investigation_id: investigation_id.to_string(),
        domain:           domain.to_string(),
        status:           finding.status,
        risk_score:       finding.risk_score,
        evidence_count:   finding.evidence.len(),
    };
    match EventLogEntry::new(&event) {
        Ok(entry) => {
            if let Err(e) = store.append_event(&entry) {
                log::error!("event append failed for {domain}: {e}");
            }
        }
        Err(e) => log::error!("event encode failed for {domain}: {e}"),
    }
}
