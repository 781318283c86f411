//! Feedsync Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities and error handling for the feedsync workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the common error type and result alias
//! - **Logging**: `tracing` subscriber setup for console and rolling files
//! - **Timestamps**: the fixed-width UTC format used for stored cursor values
//! - **File names**: sanitizing record titles into safe, bounded file names
//!
//! # Example
//!
//! ```no_run
//! use feedsync_common::timestamp;
//!
//! fn cursor() -> feedsync_common::Result<()> {
//!     let ts = timestamp::parse("2024-01-18")?;
//!     println!("resuming after {}", timestamp::format(&ts));
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod filename;
pub mod logging;
pub mod timestamp;

// Re-export commonly used types
pub use error::{CommonError, Result};
