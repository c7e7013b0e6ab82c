//! # Testrig Report
//!
//! Merges phase outcomes, coverage, benchmark records and the load summary
//! into one immutable [`Report`], and publishes it as a JSON artifact.
//!
//! Publication writes to a temporary file in the target directory and then
//! renames it into place, so an interrupted run never leaves a half-written
//! report behind.

mod aggregator;
mod publish;

pub use aggregator::{Report, ReportAggregator, ReportSummary};
pub use publish::{report_file_name, REPORT_FILE_PREFIX};
