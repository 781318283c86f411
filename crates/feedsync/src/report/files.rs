//! Report file placement

use feedsync_common::filename;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::report::{FilenameConvention, ReportFormat, ReportRecord};

/// Writes downloaded reports into the export directory.
///
/// Choosing a free name and writing the file happen under one lock, so two
/// records with the same title never race for the same path.
#[derive(Debug)]
pub struct ReportWriter {
    dir: PathBuf,
    convention: FilenameConvention,
    lock: Mutex<()>,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>, convention: FilenameConvention) -> Self {
        Self {
            dir: dir.into(),
            convention,
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File stem before length capping and de-duplication
    pub fn stem(&self, record: &ReportRecord) -> Result<String> {
        if self.convention == FilenameConvention::InspectionId || record.title.trim().is_empty() {
            return Ok(record.id.clone());
        }
        Ok(filename::sanitize(&record.title)?)
    }

    pub async fn write(&self, record: &ReportRecord, format: ReportFormat, body: &[u8]) -> Result<PathBuf> {
        let stem = self.stem(record)?;
        let ext = format.extension();

        let _guard = self.lock.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let stem = filename::bounded(&self.dir, &stem, ext)?;
        let path = filename::unique_path(&self.dir, &stem, ext).await?;
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}
