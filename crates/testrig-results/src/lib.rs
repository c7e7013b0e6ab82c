//! # Testrig Results
//!
//! Pure parsers that turn runner text output into typed records.
//!
//! Neither parser fails: text without the expected markers yields "no data",
//! and a marker with an unreadable value is reported as a value of its own
//! (`CoverageParse::Malformed`) so the caller can log it and carry on.

pub mod benchmark;
pub mod coverage;

pub use benchmark::{parse_benchmark_line, parse_benchmarks};
pub use coverage::{parse_coverage, CoverageParse};
