//! inquest-runner: headless investigation runner.
//!
//! Usage:
//!   inquest-runner --seed 12345 --entity acct-0042 --db inquest.db
//!   inquest-runner --seed 12345 --owner desk-7

use anyhow::Result;
use inquest_core::{
    cache::PollCache,
    config::EngineConfig,
    engine::InvestigationEngine,
    investigation::InvestigationSettings,
    sim_analyzers::{standard_panel, SimulatedThreatIntel},
    status::{ResultsService, StatusOutcome, StatusService},
    store::InvestigationStore,
};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let entity = flag_value(&args, "--entity").unwrap_or("acct-0001");
    let owner = flag_value(&args, "--owner").unwrap_or("desk-1");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");

    println!("inquest-runner");
    println!("  seed:   {seed}");
    println!("  entity: {entity}");
    println!("  owner:  {owner}");
    println!("  db:     {db}");
    println!();

    // For :memory:, use a shared-cache URI so the analyzer workers'
    // connections all see the same in-memory database.
    let store = if db == ":memory:" {
        InvestigationStore::in_memory_shared(&format!("inquest_{seed}"))?
    } else {
        InvestigationStore::open(db)?
    };
    store.migrate()?;

    let config = EngineConfig::default();
    let mut engine = InvestigationEngine::new(
        store,
        Box::new(SimulatedThreatIntel::new(seed)),
        config.clone(),
    );
    for analyzer in standard_panel(seed) {
        engine.register(analyzer);
    }

    // The poll cache's eviction sweep runs in the background, the way a
    // hosting service would wire it.
    let cache = Arc::new(PollCache::new(config.cache_ttl_ms));
    let stop = Arc::new(AtomicBool::new(false));
    let sweeper = {
        let cache = Arc::clone(&cache);
        let stop = Arc::clone(&stop);
        let ttl_ms = config.cache_ttl_ms;
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(ttl_ms));
                cache.evict_expired();
            }
        })
    };

    // Drive one investigation end to end.
    let id = format!("inv-{seed}-{entity}");
    let created = engine.create(&id, owner)?;
    println!("created          v{}", created.version);

    let settings = InvestigationSettings::new(
        entity,
        "account",
        vec![
            "network".into(),
            "device".into(),
            "location".into(),
            "activity_log".into(),
        ],
    );
    let configured = engine.attach_settings(&id, settings, created.version)?;
    println!("settings         v{}", configured.version);

    let started = engine.advance_to_in_progress(&id, configured.version)?;
    println!("in_progress      v{}", started.version);

    let done = engine.run_analysis(&id)?;
    println!(
        "terminal         v{} status={} phase={}",
        done.version, done.status, done.progress.current_phase
    );
    println!();

    // Poll the way a client would: first fetch yields the payload and
    // an etag, the revalidation poll comes back not-modified.
    let status_service = StatusService::new(engine.store(), cache.as_ref(), engine.config());
    match status_service.get_status(&id, owner, None)? {
        StatusOutcome::Status(s) => {
            println!(
                "status poll:     {} {:.0}% fused={} next_poll={}ms",
                s.status,
                s.progress_percentage,
                s.fused_risk.display,
                s.recommended_poll_interval_ms
            );
            match status_service.get_status(&id, owner, Some(&s.etag))? {
                StatusOutcome::NotModified => {
                    println!("revalidation:    not modified (etag {})", s.etag)
                }
                StatusOutcome::Status(_) => println!("revalidation:    modified"),
            }
        }
        StatusOutcome::NotModified => println!("status poll:     not modified"),
    }
    println!();

    let results = ResultsService::new(engine.store()).get_results(&id, owner)?;
    println!("results:");
    println!("{}", serde_json::to_string_pretty(&results)?);

    stop.store(true, Ordering::Relaxed);
    let _ = sweeper.join();
    Ok(())
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    flag_value(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
