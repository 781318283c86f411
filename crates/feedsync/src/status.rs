//! Per-run export status
//!
//! One [`ExportStatus`] is constructed by the caller and shared as an `Arc`
//! between the orchestrator and its feed tasks. It is reset when a run begins
//! and only read once the run completes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Phase a feed is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExportStage {
    ApiDownload,
    WriteOut,
}

/// Lifecycle of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RunState {
    #[default]
    NotStarted,
    Running,
    Completed,
}

/// Status of one feed within a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportStatusItem {
    pub name: String,
    pub stage: ExportStage,
    pub started: DateTime<Utc>,
    pub finished: bool,
    pub has_error: bool,
    pub status_message: String,
    pub estimated_remaining: i64,
    pub duration_ms: u64,
}

#[derive(Debug, Default)]
struct Inner {
    state: RunState,
    started: Option<DateTime<Utc>>,
    items: BTreeMap<String, ExportStatusItem>,
}

/// Point-in-time copy of the registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub state: RunState,
    pub started: Option<DateTime<Utc>>,
    pub items: Vec<ExportStatusItem>,
}

/// Status registry for one run
#[derive(Debug, Default)]
pub struct ExportStatus {
    inner: Mutex<Inner>,
}

impl ExportStatus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forget every item and return to `NotStarted`
    pub fn reset(&self) {
        *self.lock() = Inner::default();
    }

    pub fn begin_run(&self) {
        let mut inner = self.lock();
        *inner = Inner::default();
        inner.state = RunState::Running;
        inner.started = Some(Utc::now());
    }

    pub fn complete_run(&self) {
        self.lock().state = RunState::Completed;
    }

    pub fn state(&self) -> RunState {
        self.lock().state
    }

    /// Register a feed entering its download stage
    pub fn start_feed(&self, name: &str) {
        let item = ExportStatusItem {
            name: name.to_string(),
            stage: ExportStage::ApiDownload,
            started: Utc::now(),
            finished: false,
            has_error: false,
            status_message: String::new(),
            estimated_remaining: 0,
            duration_ms: 0,
        };
        self.lock().items.insert(name.to_string(), item);
    }

    /// Apply `f` to a feed's item, if it has been started
    pub fn update(&self, name: &str, f: impl FnOnce(&mut ExportStatusItem)) {
        if let Some(item) = self.lock().items.get_mut(name) {
            f(item);
        }
    }

    pub fn set_stage(&self, name: &str, stage: ExportStage) {
        self.update(name, |item| item.stage = stage);
    }

    /// Record progress after a batch
    pub fn progress(&self, name: &str, estimated_remaining: i64, duration_ms: u64) {
        self.update(name, |item| {
            item.estimated_remaining = estimated_remaining;
            item.duration_ms = duration_ms;
        });
    }

    /// Mark a feed finished, with the error message if it failed
    pub fn finish_feed(&self, name: &str, error: Option<String>) {
        self.update(name, |item| {
            item.finished = true;
            item.duration_ms = (Utc::now() - item.started).num_milliseconds().max(0) as u64;
            match error {
                Some(message) => {
                    item.has_error = true;
                    item.status_message = message;
                },
                None => {
                    item.estimated_remaining = 0;
                    item.status_message = "complete".to_string();
                },
            }
        });
    }

    pub fn item(&self, name: &str) -> Option<ExportStatusItem> {
        self.lock().items.get(name).cloned()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.lock();
        StatusSnapshot {
            state: inner.state,
            started: inner.started,
            items: inner.items.values().cloned().collect(),
        }
    }
}
