//! Append-only CSV output.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use printwatch_core::profile::TelemetryProfile;
use printwatch_core::sample::Record;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),
}

/// Appends [`Record`]s to a CSV file in the profile's column order.
///
/// The header is written when the file is created or found empty.
/// Each append opens, writes and flushes, so rows survive a crash and
/// the file can be rotated externally between writes.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
    profile: TelemetryProfile,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>, profile: TelemetryProfile) -> Self {
        Self {
            path: path.into(),
            profile,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &Record) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        let needs_header = file.metadata().map_err(|e| self.io_error(e))?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(self.profile.columns())?;
        }
        writer.write_record(record.to_row(self.profile))?;
        writer.flush().map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
