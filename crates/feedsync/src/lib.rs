//! Feedsync Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Mirrors an inspection platform's paginated data feeds into a local SQL
//! database or CSV files, and downloads inspection reports.
//!
//! # Overview
//!
//! - **Transport**: retrying HTTP with exponential backoff and rate-limit waits
//! - **Feeds**: static descriptors for every entity, drained page by page
//! - **Exporters**: batched upserts into PostgreSQL, MySQL or SQLite; CSV
//!   write-out with file rollover
//! - **Orchestration**: bounded-concurrency runs with per-feed status
//! - **Reports**: asynchronous PDF and Word generation with persisted state
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use feedsync::config::Config;
//! use feedsync::exporter::SqlExporter;
//! use feedsync::feed::registry;
//! use feedsync::orchestrator::SyncOrchestrator;
//! use feedsync::status::ExportStatus;
//!
//! async fn sync() -> feedsync::Result<()> {
//!     let config = Config::load(None)?;
//!     let exporter = SqlExporter::connect(&config.sql_config()?).await?;
//!     let orchestrator = SyncOrchestrator::new(
//!         config.api_client()?,
//!         config.sheqsy_scope()?,
//!         Arc::new(exporter),
//!         Arc::new(ExportStatus::new()),
//!         config.feed_options()?,
//!     );
//!     let summary = orchestrator.run(registry::all()).await?;
//!     println!("{} rows", summary.rows);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod drain;
pub mod error;
pub mod exporter;
pub mod feed;
pub mod orchestrator;
pub mod report;
pub mod status;
pub mod transport;

// Re-export commonly used types
pub use cli::{Cli, Commands};
pub use error::{Result, Severity, Subsystem, SyncError};
