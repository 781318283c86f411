//! Flat-file exporter
//!
//! Rows are staged in a SQLite database under the export directory. On
//! finalise each feed is written out to `{name}.csv`, rolling over into
//! timestamped files once a file would exceed the configured row count.
//! File writes run on the blocking pool, one staging page at a time.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::exporter::row::Row;
use crate::exporter::sql::{SqlConfig, SqlExporter};
use crate::exporter::{Exporter, RowFilter};
use crate::feed::descriptor::FeedDescriptor;
use feedsync_common::timestamp;

// ============================================================================
// Write-out Defaults
// ============================================================================

/// Default maximum data rows per CSV file
pub const DEFAULT_MAX_ROWS_PER_FILE: usize = 1_000_000;

/// Rows read from staging per query
pub const WRITE_OUT_PAGE_SIZE: usize = 10_000;

/// Staging database file name inside the export directory
pub const STAGING_DB: &str = "sqlite.db";

/// Exporter producing one or more CSV files per feed
pub struct CsvExporter {
    staging: SqlExporter,
    export_dir: PathBuf,
    max_rows_per_file: usize,
}

impl CsvExporter {
    /// Create the export directory and open its staging database
    pub async fn new(export_dir: impl Into<PathBuf>, max_rows_per_file: usize) -> Result<Self> {
        if max_rows_per_file == 0 {
            return Err(SyncError::config("csv max_rows_per_file must be greater than 0"));
        }

        let export_dir = export_dir.into();
        tokio::fs::create_dir_all(&export_dir).await?;

        let staging = SqlExporter::connect(&SqlConfig::sqlite_file(&export_dir.join(STAGING_DB))).await?;

        Ok(Self {
            staging,
            export_dir,
            max_rows_per_file,
        })
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    pub fn staging(&self) -> &SqlExporter {
        &self.staging
    }

    fn current_path(&self, feed: &FeedDescriptor) -> PathBuf {
        self.export_dir.join(format!("{}.csv", feed.name))
    }

    /// Remove `{name}.csv` and `{name}-{stamp}.csv` left by earlier runs
    async fn remove_previous(&self, feed: &FeedDescriptor) -> Result<usize> {
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.export_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_feed_file(feed.name, name) {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn open_writer(&self, feed: &FeedDescriptor) -> Result<CsvWriter> {
        let path = self.current_path(feed);
        let header: Vec<&'static str> = feed.column_names().collect();
        blocking(move || {
            let mut writer = ::csv::Writer::from_path(path)?;
            writer.write_record(header)?;
            Ok(writer)
        })
        .await
    }
}

type CsvWriter = ::csv::Writer<File>;

/// Run synchronous file work off the async workers
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SyncError::Task(e.to_string()))?
}

/// Append `rows` and hand the writer back
async fn write_page(mut writer: CsvWriter, rows: Vec<Row>) -> Result<CsvWriter> {
    blocking(move || {
        for row in &rows {
            writer.write_record(row.iter().map(|value| value.to_csv_field()))?;
        }
        Ok(writer)
    })
    .await
}

async fn close(mut writer: CsvWriter) -> Result<()> {
    blocking(move || {
        writer.flush()?;
        Ok(())
    })
    .await
}

/// Matches `{feed}.csv` and `{feed}-<digits and dots>.csv`
fn is_feed_file(feed: &str, file_name: &str) -> bool {
    let Some(stem) = file_name.strip_suffix(".csv") else {
        return false;
    };
    if stem == feed {
        return true;
    }
    match stem.strip_prefix(feed).and_then(|rest| rest.strip_prefix('-')) {
        Some(stamp) => !stamp.is_empty() && stamp.chars().all(|c| c.is_ascii_digit() || c == '.'),
        None => false,
    }
}

/// Next rollover time, strictly after `previous`
fn next_stamp(previous: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match previous {
        Some(prev) if now <= prev => prev + ChronoDuration::microseconds(1),
        _ => now,
    }
}

#[async_trait]
impl Exporter for CsvExporter {
    async fn init_feed(&self, feed: &FeedDescriptor, truncate: bool) -> Result<()> {
        self.staging.init_feed(feed, truncate).await
    }

    async fn write_batch(&self, feed: &FeedDescriptor, rows: &[&Row]) -> Result<()> {
        self.staging.write_batch(feed, rows).await
    }

    async fn delete_rows_if_exist(&self, feed: &FeedDescriptor, filter: &RowFilter) -> Result<u64> {
        self.staging.delete_rows_if_exist(feed, filter).await
    }

    async fn last_modified_at(
        &self,
        feed: &FeedDescriptor,
        fallback: DateTime<Utc>,
        scope_id: &str,
    ) -> Result<DateTime<Utc>> {
        self.staging.last_modified_at(feed, fallback, scope_id).await
    }

    async fn finalise_export(&self, feed: &FeedDescriptor) -> Result<()> {
        let removed = self.remove_previous(feed).await?;
        if removed > 0 {
            debug!(feed = feed.name, removed, "removed previous csv files");
        }

        let page_size = WRITE_OUT_PAGE_SIZE.min(self.max_rows_per_file);
        let mut writer = self.open_writer(feed).await?;
        let mut rows_in_file = 0usize;
        let mut total = 0usize;
        let mut files = 1usize;
        let mut last_stamp = None;
        let mut offset = 0usize;

        loop {
            let page = self.staging.fetch_page(feed, page_size, offset).await?;
            if page.is_empty() {
                break;
            }
            let fetched = page.len();
            offset += fetched;

            if rows_in_file > 0 && rows_in_file + fetched > self.max_rows_per_file {
                close(writer).await?;

                let stamp = next_stamp(last_stamp, Utc::now());
                last_stamp = Some(stamp);
                let rolled = self
                    .export_dir
                    .join(format!("{}-{}.csv", feed.name, timestamp::rollover_suffix(&stamp)));
                tokio::fs::rename(self.current_path(feed), &rolled).await?;
                debug!(feed = feed.name, file = %rolled.display(), rows = rows_in_file, "csv file rolled over");

                writer = self.open_writer(feed).await?;
                rows_in_file = 0;
                files += 1;
            }

            writer = write_page(writer, page).await?;
            rows_in_file += fetched;
            total += fetched;

            if fetched < page_size {
                break;
            }
        }

        close(writer).await?;
        info!(feed = feed.name, rows = total, files, "csv export written");
        Ok(())
    }

    fn parameter_limit(&self) -> usize {
        self.staging.parameter_limit()
    }
}
