//! # Testrig Common
//!
//! Common types and error definitions shared across the testrig crates.
//!
//! This crate provides the foundational vocabulary every other crate builds
//! upon: the error taxonomy, phase identities and outcomes, and the typed
//! records produced by result parsing.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{Error, Result, ResultExt, SupervisorError, SupervisorResult};
pub use types::{
    BenchmarkRecord, CoverageSummary, PhaseName, PhaseOutcome, PhaseStatus, ServiceTarget,
};
