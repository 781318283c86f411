//! Error types for the sync engine
//!
//! Every failure is classified by [`Severity`] and [`Subsystem`] so the
//! orchestrator can decide whether it blocks the run, and so each one is
//! logged once with the same structured fields.

use thiserror::Error;
use tracing::{error, info, warn};

use crate::report::ReportFormat;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type for feed synchronization and report export
#[derive(Error, Debug)]
pub enum SyncError {
    /// Retry budget exhausted on transient failures
    #[error("{target} giving up after {attempts} attempt(s)")]
    GiveUp { target: String, attempts: u32 },

    /// Underlying HTTP client failure outside the retry loop
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The token is not allowed to read this resource
    #[error("Request forbidden: {url}")]
    Forbidden { url: String },

    /// The resource does not exist
    #[error("Resource not found: {url}")]
    NotFound { url: String },

    /// A status that is neither success nor retryable
    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// Response body did not match the expected shape
    #[error("Malformed response: {0}")]
    DataIntegrity(String),

    /// Destination database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File system failure
    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer failure
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    /// Shared helper failure (timestamps, file names)
    #[error(transparent)]
    Common(#[from] feedsync_common::CommonError),

    /// The server reported that report generation failed
    #[error("{format} report generation failed on server for {title} ({record_id})")]
    ReportFailed {
        format: ReportFormat,
        record_id: String,
        title: String,
    },

    /// Report polling exhausted its try budget
    #[error("{format} report generation for {record_id} terminated after {tries} tries")]
    ReportTimedOut {
        format: ReportFormat,
        record_id: String,
        tries: u32,
    },

    /// One or more reports failed during a run
    #[error("failed to generate {pdf} PDF reports and {word} WORD reports")]
    ReportsFailed { pdf: usize, word: usize },

    /// Configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Neither API scope has credentials
    #[error("no API tokens provided")]
    NoApiTokens,

    /// The table filter matched no feeds
    #[error("no tables selected")]
    NoTablesSelected,

    /// The run was cancelled before this work started
    #[error("run cancelled")]
    Cancelled,

    /// A worker pool was closed while work was waiting on it
    #[error("worker pool closed unexpectedly")]
    PoolClosed,

    /// A feed task panicked or was aborted
    #[error("feed task failed: {0}")]
    Task(String),

    /// A feed failed; wraps the cause with the feed name
    #[error("{feed}: {source}")]
    Feed {
        feed: String,
        #[source]
        source: Box<SyncError>,
    },
}

/// How loudly an error is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Which part of the system raised the error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Api,
    Database,
    DataIntegrity,
    FileOperations,
    Configuration,
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subsystem::Api => write!(f, "API"),
            Subsystem::Database => write!(f, "DB"),
            Subsystem::DataIntegrity => write!(f, "Data Integrity"),
            Subsystem::FileOperations => write!(f, "File Operations"),
            Subsystem::Configuration => write!(f, "Configuration"),
        }
    }
}

impl SyncError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a data integrity error
    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    /// Attach the failing feed's name
    pub fn in_feed(self, feed: impl Into<String>) -> Self {
        Self::Feed {
            feed: feed.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, looking through feed wrappers
    pub fn root(&self) -> &SyncError {
        match self {
            SyncError::Feed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Blocking errors decide the overall run result.
    ///
    /// Permission and absence errors only affect the feed that hit them.
    pub fn is_blocking(&self) -> bool {
        !matches!(
            self.root(),
            SyncError::Forbidden { .. } | SyncError::NotFound { .. }
        )
    }

    pub fn severity(&self) -> Severity {
        match self.root() {
            SyncError::Forbidden { .. } | SyncError::NotFound { .. } => Severity::Warning,
            SyncError::Cancelled => Severity::Info,
            _ => Severity::Error,
        }
    }

    pub fn subsystem(&self) -> Subsystem {
        match self.root() {
            SyncError::GiveUp { .. }
            | SyncError::Http(_)
            | SyncError::Forbidden { .. }
            | SyncError::NotFound { .. }
            | SyncError::UnexpectedStatus { .. }
            | SyncError::ReportFailed { .. }
            | SyncError::ReportTimedOut { .. }
            | SyncError::ReportsFailed { .. } => Subsystem::Api,
            SyncError::DataIntegrity(_) => Subsystem::DataIntegrity,
            SyncError::Database(_) => Subsystem::Database,
            SyncError::Io(_) | SyncError::Csv(_) | SyncError::Common(_) => {
                Subsystem::FileOperations
            },
            SyncError::Config(_)
            | SyncError::NoApiTokens
            | SyncError::NoTablesSelected
            | SyncError::Cancelled
            | SyncError::PoolClosed
            | SyncError::Task(_)
            | SyncError::Feed { .. } => Subsystem::Configuration,
        }
    }

    /// Emit this error once at its severity
    pub fn log(&self) {
        let subsystem = self.subsystem();
        let blocking = self.is_blocking();
        match self.severity() {
            Severity::Info => info!(%subsystem, blocking, error = %self, "sync event"),
            Severity::Warning => warn!(%subsystem, blocking, error = %self, "sync warning"),
            Severity::Error => error!(%subsystem, blocking, error = %self, "sync error"),
        }
    }
}
