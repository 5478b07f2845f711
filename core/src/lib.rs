//! Inquest core — investigation coordination and evidence-gated risk
//! fusion for multi-agent fraud analysis.
//!
//! An investigation fans analysis out across independent domain
//! analyzers plus an external threat-intel lookup, then converges on a
//! single gated verdict that never overstates confidence when evidence
//! is thin.
//!
//! RULES:
//!   - All write contention is per-row version compare-and-swap.
//!     No locks are held across calls; concurrent investigations are
//!     fully independent.
//!   - Only the store talks to the database.
//!   - Analyzer failures are degraded evidence, never pipeline aborts.
//!   - Absent evidence publishes as "N/A", never as zero risk.

pub mod analyzer;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod event;
pub mod fusion;
pub mod intel;
pub mod investigation;
pub mod lifecycle;
pub mod polling;
pub mod sim_analyzers;
pub mod status;
pub mod store;
pub mod timing;
pub mod types;
