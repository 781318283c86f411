//! Bounded-concurrency run over the selected feeds
//!
//! Each feed runs as its own task holding one permit of a shared semaphore.
//! Failures are collected rather than aborting siblings; once every task has
//! finished, the first blocking error in completion order decides the result.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::error::{Result, SyncError};
use crate::exporter::Exporter;
use crate::feed::{Feed, FeedDescriptor, FeedOptions, FeedStats};
use crate::status::ExportStatus;

/// Default number of feeds exported at once
pub const DEFAULT_POOL_SIZE: usize = 10;

/// SHEQSY scope: a client plus the configured company id
#[derive(Debug, Clone)]
pub struct SheqsyScope {
    pub client: ApiClient,
    pub company_id: String,
}

/// Result of a run in which no blocking error occurred
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub feeds_completed: usize,
    pub rows: usize,
    /// Non-blocking errors, already logged
    pub warnings: Vec<String>,
    pub duration: Duration,
}

/// Runs feeds concurrently against one exporter
pub struct SyncOrchestrator {
    api: Option<ApiClient>,
    sheqsy: Option<SheqsyScope>,
    exporter: Arc<dyn Exporter>,
    status: Arc<ExportStatus>,
    options: Arc<FeedOptions>,
    pool_size: usize,
    cancel: CancellationToken,
}

struct ResolvedScope {
    client: ApiClient,
    id: String,
}

impl SyncOrchestrator {
    pub fn new(
        api: Option<ApiClient>,
        sheqsy: Option<SheqsyScope>,
        exporter: Arc<dyn Exporter>,
        status: Arc<ExportStatus>,
        options: FeedOptions,
    ) -> Self {
        Self {
            api,
            sheqsy,
            exporter,
            status,
            options: Arc::new(options),
            pool_size: DEFAULT_POOL_SIZE,
            cancel: CancellationToken::new(),
        }
    }

    /// Zero is raised to one
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn status(&self) -> &Arc<ExportStatus> {
        &self.status
    }

    /// Feeds from `selection` that have a configured scope
    fn runnable(&self, selection: &[&'static FeedDescriptor]) -> Vec<&'static FeedDescriptor> {
        selection
            .iter()
            .copied()
            .filter(|feed| {
                if feed.source.is_sheqsy() {
                    self.sheqsy.is_some()
                } else {
                    self.api.is_some()
                }
            })
            .collect()
    }

    async fn resolve_scopes(&self) -> Result<(Option<ResolvedScope>, Option<ResolvedScope>)> {
        let api = match &self.api {
            Some(client) => {
                let whoami = client.whoami().await?;
                info!(org_id = %whoami.organisation_id, user_id = %whoami.user_id, "resolved organisation");
                Some(ResolvedScope {
                    client: client.clone(),
                    id: whoami.organisation_id,
                })
            },
            None => None,
        };

        let sheqsy = match &self.sheqsy {
            Some(scope) => {
                let company = scope.client.sheqsy_company(&scope.company_id).await?;
                info!(company_uid = %company.company_uid, "resolved SHEQSY company");
                Some(ResolvedScope {
                    client: scope.client.clone(),
                    id: company.company_uid,
                })
            },
            None => None,
        };

        Ok((api, sheqsy))
    }

    /// Export every runnable feed in `selection`
    pub async fn run(&self, selection: &[&'static FeedDescriptor]) -> Result<RunSummary> {
        if self.api.is_none() && self.sheqsy.is_none() {
            return Err(SyncError::NoApiTokens);
        }

        let feeds = self.runnable(selection);
        if feeds.is_empty() {
            return Err(SyncError::NoTablesSelected);
        }

        let started = Instant::now();
        self.status.begin_run();
        let (api, sheqsy) = match self.resolve_scopes().await {
            Ok(scopes) => scopes,
            Err(e) => {
                self.status.complete_run();
                return Err(e);
            },
        };

        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        let mut tasks = JoinSet::new();
        let mut skipped = 0usize;
        let total = feeds.len();

        for (launched, descriptor) in feeds.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                skipped = total - launched;
                break;
            }

            let permit = tokio::select! {
                _ = self.cancel.cancelled() => {
                    skipped = total - launched;
                    break;
                },
                permit = semaphore.clone().acquire_owned() => permit.map_err(|_| SyncError::PoolClosed)?,
            };

            let scope = if descriptor.source.is_sheqsy() {
                sheqsy.as_ref()
            } else {
                api.as_ref()
            };
            let Some(scope) = scope else {
                continue;
            };

            let feed = Feed::new(descriptor, self.options.clone());
            let client = scope.client.clone();
            let scope_id = scope.id.clone();
            let exporter = self.exporter.clone();
            let status = self.status.clone();

            status.start_feed(feed.name());
            debug!(feed = feed.name(), "feed launched");

            tasks.spawn(async move {
                let name = feed.name();
                let result = feed
                    .export(&client, exporter.as_ref(), &scope_id, &status)
                    .await
                    .map_err(|e| e.in_feed(name));
                status.finish_feed(name, result.as_ref().err().map(ToString::to_string));
                drop(permit);
                result
            });
        }

        let mut completed: Vec<FeedStats> = Vec::new();
        let mut errors: Vec<SyncError> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(stats)) => completed.push(stats),
                Ok(Err(e)) => errors.push(e),
                Err(e) => errors.push(SyncError::Task(e.to_string())),
            }
        }

        self.status.complete_run();
        for error in &errors {
            error.log();
        }

        if let Some(index) = errors.iter().position(SyncError::is_blocking) {
            return Err(errors.swap_remove(index));
        }

        // Feeds already in flight always finish; only unlaunched ones fail the run
        if skipped > 0 {
            warn!(completed = completed.len(), skipped, "run cancelled");
            return Err(SyncError::Cancelled);
        }

        let summary = RunSummary {
            feeds_completed: completed.len(),
            rows: completed.iter().map(|s| s.rows).sum(),
            warnings: errors.iter().map(ToString::to_string).collect(),
            duration: started.elapsed(),
        };
        info!(
            feeds = summary.feeds_completed,
            rows = summary.rows,
            warnings = summary.warnings.len(),
            duration_ms = summary.duration.as_millis() as u64,
            "sync run complete"
        );
        Ok(summary)
    }
}
