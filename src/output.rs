use crate::data::processing::IngestResult;
use crate::error::SinkError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_OUTPUT_PATH: &str = "Finais/empresasHistorico.json";

/// Destination for a completed run's histories.
pub trait OutputSink {
    fn persist(&self, result: &IngestResult) -> Result<(), SinkError>;
}

/// Writes the histories as a pretty-printed JSON array.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl OutputSink for JsonFileSink {
    fn persist(&self, result: &IngestResult) -> Result<(), SinkError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_string_pretty(&result.histories)?;
        fs::write(&self.path, json).map_err(|e| self.io_error(e))?;

        info!(
            path = %self.path.display(),
            instruments = result.histories.len(),
            "historical data JSON file written"
        );
        Ok(())
    }
}
