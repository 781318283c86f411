//! Export destinations
//!
//! An [`Exporter`] receives decoded rows for one feed at a time. Two
//! implementations exist:
//!
//! - [`SqlExporter`]: a relational database through `sqlx`'s `Any` driver
//! - [`CsvExporter`]: SQLite staging followed by CSV write-out on finalise
//!
//! Writes are batched so that one statement never binds more parameters than
//! the destination allows, and rows sharing a primary key within a batch are
//! collapsed to the last one.

pub mod csv;
pub mod dialect;
pub mod row;
pub mod sql;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::Result;
use crate::feed::descriptor::FeedDescriptor;

pub use self::csv::CsvExporter;
pub use dialect::Dialect;
pub use row::{Row, Value};
pub use sql::{SqlConfig, SqlExporter};

// ============================================================================
// Batching Constants
// ============================================================================

/// Per-row allowance on top of the column count: primary key echoes in the
/// conflict clause and per-statement overhead.
pub const BATCH_OVERHEAD: usize = 4;

/// Rows per write statement, never less than one
pub fn batch_size(parameter_limit: usize, column_count: usize) -> usize {
    (parameter_limit / (column_count + BATCH_OVERHEAD)).max(1)
}

/// Keep only the last row for each primary key, preserving the order of those rows.
pub fn dedup_last<'a>(feed: &FeedDescriptor, rows: &'a [Row]) -> Vec<&'a Row> {
    let keys = feed.key_indices();
    let mut seen = HashSet::new();
    let mut kept: Vec<&Row> = rows
        .iter()
        .rev()
        .filter(|row| {
            let key: Vec<String> = keys
                .iter()
                .map(|&i| row.get(i).map(Value::key_text).unwrap_or_default())
                .collect();
            seen.insert(key)
        })
        .collect();
    kept.reverse();
    kept
}

/// Predicate for [`Exporter::delete_rows_if_exist`]
#[derive(Debug, Clone, PartialEq)]
pub enum RowFilter {
    Eq { column: &'static str, value: Value },
    In { column: &'static str, values: Vec<Value> },
}

impl RowFilter {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        RowFilter::Eq {
            column,
            value: value.into(),
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            RowFilter::Eq { column, .. } | RowFilter::In { column, .. } => column,
        }
    }

    /// Values in bind order
    pub fn values(&self) -> &[Value] {
        match self {
            RowFilter::Eq { value, .. } => std::slice::from_ref(value),
            RowFilter::In { values, .. } => values,
        }
    }

    /// An `IN` with no values matches nothing
    pub fn is_empty(&self) -> bool {
        matches!(self, RowFilter::In { values, .. } if values.is_empty())
    }
}

/// Counts from one [`Exporter::write_rows`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub batches: usize,
    /// Rows sent to the destination after de-duplication
    pub rows: usize,
    /// Earlier duplicates dropped within a batch
    pub duplicates: usize,
}

/// Destination for feed rows
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Ensure the feed's table exists; with `truncate`, delete its rows.
    async fn init_feed(&self, feed: &FeedDescriptor, truncate: bool) -> Result<()>;

    /// Upsert one batch that is already within the parameter limit and free of duplicate keys.
    async fn write_batch(&self, feed: &FeedDescriptor, rows: &[&Row]) -> Result<()>;

    /// Delete rows matching `filter`, returning how many were removed.
    async fn delete_rows_if_exist(&self, feed: &FeedDescriptor, filter: &RowFilter) -> Result<u64>;

    /// Latest stored cursor for `scope_id`, then for rows with no scope, else `fallback`.
    ///
    /// A stored value older than `fallback` yields `fallback`.
    async fn last_modified_at(
        &self,
        feed: &FeedDescriptor,
        fallback: DateTime<Utc>,
        scope_id: &str,
    ) -> Result<DateTime<Utc>>;

    /// Flush anything buffered for the feed.
    async fn finalise_export(&self, feed: &FeedDescriptor) -> Result<()>;

    /// Maximum bound parameters in one statement
    fn parameter_limit(&self) -> usize;

    /// Batched upsert keyed by primary key.
    ///
    /// Batches are written in slice order. Within a batch the last row for a
    /// key wins.
    async fn write_rows(&self, feed: &FeedDescriptor, rows: &[Row]) -> Result<WriteStats> {
        let size = batch_size(self.parameter_limit(), feed.columns.len());
        let mut stats = WriteStats::default();

        for chunk in rows.chunks(size) {
            let batch = dedup_last(feed, chunk);
            stats.duplicates += chunk.len() - batch.len();
            self.write_batch(feed, &batch).await?;
            stats.batches += 1;
            stats.rows += batch.len();
        }

        Ok(stats)
    }
}
