//! Per-record report completion, persisted beside the synced inspections

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::Result;
use crate::exporter::{Exporter, Row, SqlExporter, Value};
use crate::feed::descriptor::{ColumnDef, FeedDescriptor, FeedSource, RefreshPolicy, ReplacePolicy};
use crate::report::ReportFormat;

/// Storage layout of the state table
pub static REPORT_EXPORTS: FeedDescriptor = FeedDescriptor {
    name: "report_exports",
    source: FeedSource::Paginated("audits"),
    primary_key: &["audit_id"],
    columns: &[
        ColumnDef::key("audit_id", "audit_id", 100),
        ColumnDef::timestamp("modified_at", "modified_at"),
        ColumnDef::integer("pdf", "pdf"),
        ColumnDef::integer("word", "word"),
    ],
    order: &["audit_id"],
    cursor_column: None,
    scope_column: None,
    refresh: RefreshPolicy::Upsert,
    replace: ReplacePolicy::None,
    params: &[],
    skip_column: None,
    fan_out: None,
    media: None,
};

/// Outcome of the last attempt at one format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatStatus {
    #[default]
    NotAttempted,
    Succeeded,
    Failed,
}

impl FormatStatus {
    pub fn code(self) -> i64 {
        match self {
            FormatStatus::NotAttempted => 0,
            FormatStatus::Succeeded => 1,
            FormatStatus::Failed => -1,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => FormatStatus::Succeeded,
            -1 => FormatStatus::Failed,
            _ => FormatStatus::NotAttempted,
        }
    }
}

/// Completion of every format for one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportState {
    pub record_id: String,
    pub record_modified_at: Option<DateTime<Utc>>,
    pub pdf: FormatStatus,
    pub word: FormatStatus,
}

impl ReportState {
    pub fn new(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            record_modified_at: None,
            pdf: FormatStatus::NotAttempted,
            word: FormatStatus::NotAttempted,
        }
    }

    pub fn status(&self, format: ReportFormat) -> FormatStatus {
        match format {
            ReportFormat::Pdf => self.pdf,
            ReportFormat::Word => self.word,
        }
    }

    pub fn set(&mut self, format: ReportFormat, status: FormatStatus) {
        match format {
            ReportFormat::Pdf => self.pdf = status,
            ReportFormat::Word => self.word = status,
        }
    }

    /// Formats still to attempt for a record last modified at `modified_at`.
    ///
    /// A changed modification time resets every format first.
    pub fn pending(&mut self, modified_at: Option<DateTime<Utc>>, formats: &[ReportFormat]) -> Vec<ReportFormat> {
        if self.record_modified_at != modified_at {
            self.record_modified_at = modified_at;
            self.pdf = FormatStatus::NotAttempted;
            self.word = FormatStatus::NotAttempted;
        }

        formats
            .iter()
            .copied()
            .filter(|format| self.status(*format) != FormatStatus::Succeeded)
            .collect()
    }

    fn to_row(&self) -> Row {
        vec![
            Value::Text(self.record_id.clone()),
            self.record_modified_at.map_or(Value::Null, Value::Timestamp),
            Value::Integer(self.pdf.code()),
            Value::Integer(self.word.code()),
        ]
    }

    fn from_row(row: Row) -> Self {
        let mut values = row.into_iter();
        let record_id = match values.next() {
            Some(Value::Text(id)) => id,
            _ => String::new(),
        };
        let record_modified_at = match values.next() {
            Some(Value::Timestamp(ts)) => Some(ts),
            _ => None,
        };
        let mut code = || match values.next() {
            Some(Value::Integer(i)) => FormatStatus::from_code(i),
            _ => FormatStatus::NotAttempted,
        };
        let pdf = code();
        let word = code();

        Self {
            record_id,
            record_modified_at,
            pdf,
            word,
        }
    }
}

/// `report_exports` table access
#[derive(Clone)]
pub struct ReportStateStore {
    db: Arc<SqlExporter>,
}

impl ReportStateStore {
    pub fn new(db: Arc<SqlExporter>) -> Self {
        Self { db }
    }

    /// Create the table; with `reset`, forget every record.
    pub async fn init(&self, reset: bool) -> Result<()> {
        self.db.init_feed(&REPORT_EXPORTS, reset).await
    }

    pub async fn load(&self, record_id: &str) -> Result<Option<ReportState>> {
        let row = self
            .db
            .find_row(&REPORT_EXPORTS, &[Value::from(record_id)])
            .await?;
        Ok(row.map(ReportState::from_row))
    }

    pub async fn save(&self, state: &ReportState) -> Result<()> {
        self.db.write_rows(&REPORT_EXPORTS, &[state.to_row()]).await?;
        Ok(())
    }
}
