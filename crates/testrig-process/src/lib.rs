//! # Testrig Process
//!
//! Low-level process operations used by the supervisor and the phase runner.
//!
//! This crate provides primitives for:
//! - Process existence checking
//! - Graceful and forced termination signals
//! - Locating required tools on `PATH`
//! - Running an external tool to completion with a bounded timeout

pub mod check;
pub mod execute;
pub mod terminate;
pub mod validation;

// Re-export main types
pub use check::*;
pub use execute::*;
pub use terminate::*;
pub use validation::*;
