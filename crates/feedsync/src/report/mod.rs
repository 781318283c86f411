//! Inspection report export
//!
//! For every synced inspection the pipeline asks the server to render a
//! report, polls the job until it settles, and downloads the artifact:
//!
//! ```text
//! POST audits/{id}/report            -> {"messageId": ..}
//! GET  audits/{id}/report/{message}  -> {"status": "IN_PROGRESS" | "SUCCESS" | "FAILED", "url": ..}
//! GET  {url}                         -> file body
//! ```
//!
//! Completion per record and format is kept in `report_exports`, so a record
//! whose reports already succeeded is skipped until it changes.

pub mod files;
pub mod state;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::client::{decode_json, ensure_success, ApiClient};
use crate::error::{Result, SyncError};
use crate::exporter::{Row, SqlExporter, Value};
use crate::feed::registry::INSPECTIONS;
use crate::feed::{Feed, FeedOptions};
use crate::status::ExportStatus;

pub use files::ReportWriter;
pub use state::{FormatStatus, ReportState, ReportStateStore};

// ============================================================================
// Report Defaults
// ============================================================================

/// Status checks before a generation is abandoned
pub const DEFAULT_MAX_TRIES: u32 = 15;

/// Generations in flight at once
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default `retry_timeout` in seconds
pub const DEFAULT_RETRY_TIMEOUT: u64 = 15;

/// Inspections read from the store per page
const RECORD_PAGE_SIZE: usize = 100;

/// Report document format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportFormat {
    #[serde(rename = "PDF")]
    Pdf,
    #[serde(rename = "WORD")]
    Word,
}

impl ReportFormat {
    /// Name sent to the API
    pub fn api_name(self) -> &'static str {
        match self {
            ReportFormat::Pdf => "PDF",
            ReportFormat::Word => "WORD",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Word => "docx",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

impl FromStr for ReportFormat {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "PDF" => Ok(ReportFormat::Pdf),
            "WORD" => Ok(ReportFormat::Word),
            other => Err(SyncError::config(format!("{} is not a valid report format", other))),
        }
    }
}

/// How report files are named
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilenameConvention {
    #[default]
    InspectionTitle,
    InspectionId,
}

/// Wait between status checks for a configured retry timeout in seconds
pub fn poll_wait(retry_timeout: u64) -> Duration {
    let secs = match retry_timeout {
        t if t > 60 => 4,
        t if t > 15 => t / 15,
        _ => 1,
    };
    Duration::from_secs(secs)
}

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub formats: Vec<ReportFormat>,
    pub preference_id: Option<String>,
    pub filename_convention: FilenameConvention,
    pub poll_interval: Duration,
    pub max_tries: u32,
    pub concurrency: usize,
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            formats: vec![ReportFormat::Pdf],
            preference_id: None,
            filename_convention: FilenameConvention::default(),
            poll_interval: poll_wait(DEFAULT_RETRY_TIMEOUT),
            max_tries: DEFAULT_MAX_TRIES,
            concurrency: DEFAULT_CONCURRENCY,
            output_dir: PathBuf::from("export"),
        }
    }
}

/// The fields of an inspection a report needs
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRecord {
    pub id: String,
    pub title: String,
    pub modified_at: Option<DateTime<Utc>>,
}

impl ReportRecord {
    /// Read from a row of the inspections table
    pub fn from_inspection(row: &Row) -> Option<Self> {
        let get = |name: &str| INSPECTIONS.column_index(name).and_then(|i| row.get(i));
        let id = match get("audit_id")? {
            Value::Text(id) if !id.is_empty() => id.clone(),
            _ => return None,
        };
        let title = match get("name") {
            Some(Value::Text(title)) => title.clone(),
            _ => String::new(),
        };
        let modified_at = match get("modified_at") {
            Some(Value::Timestamp(ts)) => Some(*ts),
            _ => None,
        };
        Some(Self {
            id,
            title,
            modified_at,
        })
    }
}

/// Counts for one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub no_change: usize,
    pub pdf_reports: usize,
    pub pdf_errors: usize,
    pub word_reports: usize,
    pub word_errors: usize,
}

impl ReportSummary {
    fn record(&mut self, format: ReportFormat, status: FormatStatus) {
        let (ok, failed) = match format {
            ReportFormat::Pdf => (&mut self.pdf_reports, &mut self.pdf_errors),
            ReportFormat::Word => (&mut self.word_reports, &mut self.word_errors),
        };
        match status {
            FormatStatus::Succeeded => *ok += 1,
            FormatStatus::Failed => *failed += 1,
            FormatStatus::NotAttempted => {},
        }
    }

    /// Error if any generation failed
    pub fn ensure_success(&self) -> Result<()> {
        if self.pdf_errors > 0 || self.word_errors > 0 {
            return Err(SyncError::ReportsFailed {
                pdf: self.pdf_errors,
                word: self.word_errors,
            });
        }
        Ok(())
    }
}

/// What happened to one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    NoChange,
    Attempted(Vec<(ReportFormat, FormatStatus)>),
}

#[derive(Serialize)]
struct InitiateRequest<'a> {
    format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    preference_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct InitiateResponse {
    #[serde(rename = "messageId")]
    message_id: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    status: String,
    #[serde(default)]
    url: Option<String>,
}

/// Report generation pipeline
pub struct ReportExporter {
    client: ApiClient,
    db: Arc<SqlExporter>,
    store: ReportStateStore,
    writer: ReportWriter,
    config: ReportConfig,
    permits: Arc<Semaphore>,
}

impl ReportExporter {
    pub fn new(client: ApiClient, db: Arc<SqlExporter>, config: ReportConfig) -> Result<Self> {
        if config.formats.is_empty() {
            return Err(SyncError::config("no valid report format specified"));
        }
        Ok(Self {
            store: ReportStateStore::new(db.clone()),
            writer: ReportWriter::new(config.output_dir.clone(), config.filename_convention),
            permits: Arc::new(Semaphore::new(config.concurrency.max(1))),
            client,
            db,
            config,
        })
    }

    pub fn store(&self) -> &ReportStateStore {
        &self.store
    }

    /// Sync inspections into the report database, then export their reports
    pub async fn export_all(&self, options: FeedOptions, status: &ExportStatus) -> Result<ReportSummary> {
        let incremental = options.incremental;
        let org = self.client.whoami().await?;

        status.begin_run();
        status.start_feed(INSPECTIONS.name);
        let synced = Feed::new(&INSPECTIONS, Arc::new(options))
            .export(&self.client, self.db.as_ref(), &org.organisation_id, status)
            .await
            .map_err(|e| e.in_feed(INSPECTIONS.name));
        status.finish_feed(INSPECTIONS.name, synced.as_ref().err().map(ToString::to_string));
        status.complete_run();
        synced?;

        self.export_stored(!incremental).await
    }

    /// Export reports for every inspection already in the report database
    pub async fn export_stored(&self, reset: bool) -> Result<ReportSummary> {
        info!(formats = ?self.config.formats, "generating inspection reports");
        self.store.init(reset).await?;

        let total = self.db.count_rows(&INSPECTIONS).await?;
        let mut summary = ReportSummary::default();
        let mut offset = 0usize;

        loop {
            let rows = self.db.fetch_page(&INSPECTIONS, RECORD_PAGE_SIZE, offset).await?;
            if rows.is_empty() {
                break;
            }
            offset += rows.len();

            let records: Vec<ReportRecord> = rows.iter().filter_map(ReportRecord::from_inspection).collect();
            let outcomes = join_all(records.iter().map(|record| self.export_record(record))).await;

            for (record, outcome) in records.iter().zip(outcomes) {
                match outcome? {
                    RecordOutcome::NoChange => {
                        summary.no_change += 1;
                        debug!(record_id = %record.id, "no changes, reports skipped");
                    },
                    RecordOutcome::Attempted(results) => {
                        for (format, status) in results {
                            summary.record(format, status);
                        }
                    },
                }
            }

            info!(remaining = (total - offset as i64).max(0), "report page complete");
            if rows.len() < RECORD_PAGE_SIZE {
                break;
            }
        }

        if summary.no_change > 0 {
            info!(count = summary.no_change, "inspections unchanged, no reports downloaded");
        }
        info!(
            pdf = summary.pdf_reports,
            word = summary.word_reports,
            pdf_errors = summary.pdf_errors,
            word_errors = summary.word_errors,
            "report export complete"
        );
        Ok(summary)
    }

    /// Attempt every pending format for one record and persist the outcome
    pub async fn export_record(&self, record: &ReportRecord) -> Result<RecordOutcome> {
        let mut state = self
            .store
            .load(&record.id)
            .await?
            .unwrap_or_else(|| ReportState::new(record.id.clone()));

        let pending = state.pending(record.modified_at, &self.config.formats);
        if pending.is_empty() {
            return Ok(RecordOutcome::NoChange);
        }

        let mut results = Vec::with_capacity(pending.len());
        for format in pending {
            let status = match self.generate(record, format).await {
                Ok(path) => {
                    info!(record_id = %record.id, %format, file = %path.display(), "report saved");
                    FormatStatus::Succeeded
                },
                Err(e) => {
                    warn!(record_id = %record.id, %format, error = %e, "report export failed");
                    FormatStatus::Failed
                },
            };
            state.set(format, status);
            results.push((format, status));
        }

        self.store.save(&state).await?;
        Ok(RecordOutcome::Attempted(results))
    }

    /// Initiate, poll and download one report
    pub async fn generate(&self, record: &ReportRecord, format: ReportFormat) -> Result<PathBuf> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SyncError::PoolClosed)?;

        let body = InitiateRequest {
            format: format.api_name(),
            preference_id: self.config.preference_id.as_deref(),
        };
        let response = self
            .client
            .post_json(&format!("audits/{}/report", record.id), &body)
            .await?;
        let initiated: InitiateResponse = decode_json(ensure_success(response)?).await?;
        debug!(record_id = %record.id, %format, message_id = %initiated.message_id, "report initiated");

        let check_path = format!("audits/{}/report/{}", record.id, initiated.message_id);
        let mut tries = 0u32;
        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            let completion: CompletionResponse = self.client.get_json(&check_path).await?;
            match completion.status.as_str() {
                "SUCCESS" => {
                    let url = completion.url.filter(|u| !u.is_empty()).ok_or_else(|| {
                        SyncError::data_integrity(format!("{}: report succeeded without a url", check_path))
                    })?;
                    let file = ensure_success(self.client.get(&url, &[]).await?)?;
                    let bytes = file.bytes().await?;
                    return self.writer.write(record, format, &bytes).await;
                },
                "FAILED" => {
                    return Err(SyncError::ReportFailed {
                        format,
                        record_id: record.id.clone(),
                        title: record.title.clone(),
                    });
                },
                _ => {},
            }

            tries += 1;
            if tries >= self.config.max_tries {
                return Err(SyncError::ReportTimedOut {
                    format,
                    record_id: record.id.clone(),
                    tries,
                });
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_poll_wait() {
        assert_eq!(poll_wait(0), Duration::from_secs(1));
        assert_eq!(poll_wait(15), Duration::from_secs(1));
        assert_eq!(poll_wait(45), Duration::from_secs(3));
        assert_eq!(poll_wait(60), Duration::from_secs(4));
        assert_eq!(poll_wait(600), Duration::from_secs(4));
    }

    #[test]
    fn test_format_names() {
        assert_eq!(ReportFormat::Word.to_string(), "WORD");
        assert_eq!(ReportFormat::Word.extension(), "docx");
        assert_eq!("pdf".parse::<ReportFormat>().unwrap(), ReportFormat::Pdf);
        assert!("XLS".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_summary_errors() {
        let mut summary = ReportSummary::default();
        summary.record(ReportFormat::Pdf, FormatStatus::Succeeded);
        summary.record(ReportFormat::Pdf, FormatStatus::Failed);
        summary.record(ReportFormat::Word, FormatStatus::Failed);
        summary.record(ReportFormat::Word, FormatStatus::Failed);

        assert_eq!(summary.pdf_reports, 1);
        let err = summary.ensure_success().unwrap_err();
        assert_eq!(err.to_string(), "failed to generate 1 PDF reports and 2 WORD reports");
        assert!(ReportSummary::default().ensure_success().is_ok());
    }

    #[test]
    fn test_record_from_inspection_row() {
        let modified = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let mut row: Row = vec![Value::Null; INSPECTIONS.columns.len()];
        row[INSPECTIONS.column_index("audit_id").unwrap()] = Value::from("audit_1");
        row[INSPECTIONS.column_index("name").unwrap()] = Value::from("Forklift check");
        row[INSPECTIONS.column_index("modified_at").unwrap()] = Value::Timestamp(modified);

        let record = ReportRecord::from_inspection(&row).unwrap();
        assert_eq!(record.id, "audit_1");
        assert_eq!(record.title, "Forklift check");
        assert_eq!(record.modified_at, Some(modified));

        let blank: Row = vec![Value::Null; INSPECTIONS.columns.len()];
        assert!(ReportRecord::from_inspection(&blank).is_none());
    }
}
