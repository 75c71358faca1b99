//! Filesystem artifacts: delivered pages, debug captures, failure reports.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use putusan_core::driver::FailedUnit;
use putusan_core::error::AppError;
use putusan_core::models::{FetchOutcome, TransportKind};
use putusan_core::traits::{DebugSink, OutcomeSink};

/// Writes each successful payload to `unit_00001.html` in a directory.
///
/// Failed outcomes carry no payload and are skipped.
#[derive(Debug, Clone)]
pub struct HtmlDirSink {
    dir: PathBuf,
}

impl HtmlDirSink {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            AppError::ConfigError(format!("output directory '{}' is not usable: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, unit_id: u64) -> PathBuf {
        self.dir.join(format!("unit_{unit_id:05}.html"))
    }
}

impl OutcomeSink for HtmlDirSink {
    async fn deliver(&self, outcome: &FetchOutcome) -> Result<(), AppError> {
        let Some(payload) = outcome.payload() else {
            return Ok(());
        };
        let path = self.path_for(outcome.unit_id());
        tokio::fs::write(&path, payload)
            .await
            .map_err(|e| AppError::SinkError(format!("failed to write {}: {e}", path.display())))?;
        tracing::debug!(unit_id = outcome.unit_id(), path = %path.display(), "Payload saved");
        Ok(())
    }
}

/// Saves every raw body the orchestrator sees, named by transport, URL
/// path and timestamp. Write errors are logged and ignored.
#[derive(Debug, Clone)]
pub struct HtmlDebugDir {
    dir: PathBuf,
}

impl HtmlDebugDir {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            AppError::ConfigError(format!("debug directory '{}' is not usable: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    fn file_name(transport: TransportKind, url: &str) -> String {
        let key = url::Url::parse(url)
            .map(|u| match u.query() {
                Some(q) => format!("{}_{q}", u.path()),
                None => u.path().to_string(),
            })
            .unwrap_or_else(|_| url.to_string());
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let sanitized = sanitized.trim_matches('_');
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        format!("{transport}_{sanitized}_{stamp}.html")
    }
}

#[async_trait]
impl DebugSink for HtmlDebugDir {
    async fn capture(&self, transport: TransportKind, url: &str, body: &str) {
        let path = self.dir.join(Self::file_name(transport, url));
        if let Err(e) = tokio::fs::write(&path, body).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to save debug HTML");
        }
    }
}

/// Write failed units as CSV with a header row.
pub fn write_failed_units_csv(path: &Path, units: &[FailedUnit]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::SinkError(format!("failed to create {}: {e}", path.display())))?;
    for unit in units {
        writer
            .serialize(unit)
            .map_err(|e| AppError::SinkError(format!("failed to write {}: {e}", path.display())))?;
    }
    writer.flush()?;
    Ok(())
}
