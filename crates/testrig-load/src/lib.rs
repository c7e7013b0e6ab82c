//! # Testrig Load
//!
//! Issues a burst of independent requests through a bounded worker pool and
//! summarizes how many succeeded and how long they took.

pub mod generator;
pub mod stats;

pub use generator::{HttpRequestProbe, LoadGenerator, RequestProbe};
pub use stats::{LatencyStats, LoadSummary, DEFAULT_SUCCESS_THRESHOLD};
