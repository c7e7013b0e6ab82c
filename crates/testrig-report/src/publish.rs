use crate::aggregator::Report;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use testrig_common::{Error, Result};
use tracing::{debug, info};

pub const REPORT_FILE_PREFIX: &str = "test-results-";

/// `test-results-20261018T093000.123Z.json`
pub fn report_file_name(finished_at: DateTime<Utc>) -> String {
    format!(
        "{}{}.json",
        REPORT_FILE_PREFIX,
        finished_at.format("%Y%m%dT%H%M%S%.3fZ")
    )
}

impl Report {
    /// Write the report into `dir` (atomic write) and return its path.
    ///
    /// Each run produces a new file; an existing report with the same name
    /// is never overwritten.
    pub async fn publish(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create report directory {}: {}", dir.display(), e),
            ))
        })?;

        let path = dir.join(report_file_name(self.finished_at()));
        if tokio::fs::try_exists(&path).await? {
            return Err(Error::validation(format!(
                "Report {} already exists",
                path.display()
            )));
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize report: {}", e)))?;

        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("json.tmp");
        debug!("Writing report to temporary file {}", temp_path.display());
        if let Err(e) = tokio::fs::write(&temp_path, json).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        info!("Report published: {}", path.display());
        Ok(path)
    }

    /// Load a previously published report.
    pub async fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Serialization(format!("Failed to parse report: {}", e)))
    }
}
