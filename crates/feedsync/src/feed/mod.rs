//! Per-entity synchronization
//!
//! A [`Feed`] pairs a static [`FeedDescriptor`] with the run's
//! [`FeedOptions`] and drives one entity end to end:
//!
//! 1. `init_feed`, truncating according to the refresh policy
//! 2. resolve the resume cursor through `last_modified_at`
//! 3. apply the scope replace policy
//! 4. drain pages into the exporter, batch by batch, downloading any
//!    referenced media when enabled
//! 5. `finalise_export`

pub mod descriptor;
pub mod media;
pub mod registry;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::client::ApiClient;
use crate::drain::{FeedDrainer, Page, PageHandler};
use crate::error::Result;
use crate::exporter::{Exporter, Row, RowFilter, Value};
use crate::status::{ExportStage, ExportStatus};
use media::{MediaDownloader, MediaRef, DEFAULT_MEDIA_DIR};

pub use descriptor::{FeedDescriptor, FeedSource, MediaRefs, QueryParam, RefreshPolicy, ReplacePolicy};

// ============================================================================
// Feed Option Defaults
// ============================================================================

/// Default page size requested from inspection feeds
pub const DEFAULT_INSPECTION_LIMIT: u32 = 100;

/// Largest page size the action and issue feeds accept
pub const MAX_FEED_LIMIT: u32 = 100;

/// Run-wide options applied to every feed
#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// Resume from stored cursors instead of re-fetching everything
    pub incremental: bool,
    /// Floor for the resume cursor
    pub modified_after: Option<DateTime<Utc>>,
    pub template_ids: Vec<String>,
    /// `true`, `false` or `both`
    pub archived: String,
    /// `true`, `false` or `both`
    pub completed: String,
    pub inspection_limit: u32,
    pub action_limit: u32,
    pub issue_limit: u32,
    /// Zero leaves the server default
    pub asset_limit: u32,
    /// `private`, `public` or empty
    pub web_report_link: String,
    /// Inspection ids whose rows are never written
    pub skip_ids: Vec<String>,
    pub include_deleted: bool,
    pub show_only_leaf_nodes: bool,
    /// Also export inactive inspection items
    pub include_inactive: bool,
    /// Download media referenced by feeds that carry [`MediaRefs`]
    pub export_media: bool,
    pub media_path: PathBuf,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            incremental: true,
            modified_after: None,
            template_ids: Vec::new(),
            archived: "false".to_string(),
            completed: "true".to_string(),
            inspection_limit: DEFAULT_INSPECTION_LIMIT,
            action_limit: MAX_FEED_LIMIT,
            issue_limit: MAX_FEED_LIMIT,
            asset_limit: 0,
            web_report_link: "private".to_string(),
            skip_ids: Vec::new(),
            include_deleted: false,
            show_only_leaf_nodes: true,
            include_inactive: false,
            export_media: false,
            media_path: PathBuf::from(DEFAULT_MEDIA_DIR),
        }
    }
}

/// Outcome of one feed export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub pages: usize,
    /// Rows written after de-duplication
    pub rows: usize,
    /// Rows dropped by the skip list
    pub skipped: usize,
    /// Rows removed by the replace policy
    pub deleted: u64,
    /// Media files written
    pub media: usize,
    pub duration: Duration,
}

/// One entity's synchronization
#[derive(Debug, Clone)]
pub struct Feed {
    descriptor: &'static FeedDescriptor,
    options: Arc<FeedOptions>,
}

impl Feed {
    pub fn new(descriptor: &'static FeedDescriptor, options: Arc<FeedOptions>) -> Self {
        Self {
            descriptor,
            options,
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn descriptor(&self) -> &'static FeedDescriptor {
        self.descriptor
    }

    /// Whether `init_feed` should delete existing rows
    pub fn truncate_on_init(&self) -> bool {
        match self.descriptor.refresh {
            RefreshPolicy::Incremental => !self.options.incremental,
            RefreshPolicy::Truncate => true,
            RefreshPolicy::Upsert => false,
        }
    }

    /// Query parameters for the first page request
    pub fn query_params(&self, modified_after: DateTime<Utc>) -> Vec<(String, String)> {
        let options = &self.options;
        let mut params = Vec::new();
        let mut push = |key: &str, value: String| {
            if !value.is_empty() {
                params.push((key.to_string(), value));
            }
        };

        for param in self.descriptor.params {
            match param {
                QueryParam::ModifiedAfter => {
                    if modified_after > DateTime::UNIX_EPOCH {
                        push(
                            "modified_after",
                            modified_after.to_rfc3339_opts(SecondsFormat::Millis, true),
                        );
                    }
                },
                QueryParam::Templates => {
                    for id in &options.template_ids {
                        push("template", id.clone());
                    }
                },
                QueryParam::Archived => push("archived", options.archived.clone()),
                QueryParam::Completed => push("completed", options.completed.clone()),
                QueryParam::InspectionLimit => push("limit", limit(options.inspection_limit)),
                QueryParam::ActionLimit => push("limit", limit(options.action_limit)),
                QueryParam::IssueLimit => push("limit", limit(options.issue_limit)),
                QueryParam::AssetLimit => push("limit", limit(options.asset_limit)),
                QueryParam::IncludeInactive => {
                    if options.include_inactive {
                        push("include_inactive", "true".to_string());
                    }
                },
                QueryParam::WebReportLink => push("web_report_link", options.web_report_link.clone()),
                QueryParam::IncludeDeleted => {
                    if options.include_deleted {
                        push("include_deleted", "true".to_string());
                    }
                },
                QueryParam::ShowOnlyLeafNodes => push(
                    "show_only_leaf_nodes",
                    options.show_only_leaf_nodes.to_string(),
                ),
            }
        }

        params
    }

    /// Synchronize this feed into `exporter` for the given scope
    pub async fn export(
        &self,
        client: &ApiClient,
        exporter: &dyn Exporter,
        scope_id: &str,
        status: &ExportStatus,
    ) -> Result<FeedStats> {
        let feed = self.descriptor;
        let started = Instant::now();

        exporter.init_feed(feed, self.truncate_on_init()).await?;

        let floor = self.options.modified_after.unwrap_or(DateTime::UNIX_EPOCH);
        let modified_after = exporter.last_modified_at(feed, floor, scope_id).await?;

        let mut deleted = 0;
        if let (ReplacePolicy::Scope, Some(scope)) = (feed.replace, feed.scope_column) {
            deleted = exporter
                .delete_rows_if_exist(feed, &RowFilter::eq(scope, scope_id))
                .await?;
            debug!(feed = feed.name, deleted, "cleared scope rows");
        }

        let media = match (feed.media, self.options.export_media) {
            (Some(refs), true) => {
                Some((refs, MediaDownloader::new(client, &self.options.media_path)))
            },
            _ => None,
        };

        let mut writer = FeedWriter {
            feed,
            exporter,
            status,
            media,
            skip: self.options.skip_ids.iter().cloned().collect(),
            exported_at: Utc::now(),
            started,
            stats: FeedStats {
                deleted,
                ..FeedStats::default()
            },
        };

        let drainer = FeedDrainer::new(client);
        let path = feed.source.path(scope_id);
        match feed.source {
            FeedSource::Paginated(_) => {
                let params = self.query_params(modified_after);
                drainer.drain(&path, &params, &mut writer).await?;
            },
            FeedSource::Sheqsy(_) => {
                drainer.fetch_single(&path, &mut writer).await?;
            },
            FeedSource::SheqsyHistory(_) => {
                drainer.drain_versions(&path, &mut writer).await?;
            },
        }

        status.set_stage(feed.name, ExportStage::WriteOut);
        exporter.finalise_export(feed).await?;

        let mut stats = writer.stats;
        stats.duration = started.elapsed();
        info!(
            feed = feed.name,
            pages = stats.pages,
            rows = stats.rows,
            skipped = stats.skipped,
            media = stats.media,
            duration_ms = stats.duration.as_millis() as u64,
            "feed export complete"
        );
        Ok(stats)
    }
}

fn limit(value: u32) -> String {
    if value == 0 {
        String::new()
    } else {
        value.to_string()
    }
}

/// Page handler that decodes, filters and writes one feed's pages
struct FeedWriter<'a> {
    feed: &'static FeedDescriptor,
    exporter: &'a dyn Exporter,
    status: &'a ExportStatus,
    media: Option<(MediaRefs, MediaDownloader<'a>)>,
    skip: HashSet<String>,
    exported_at: DateTime<Utc>,
    started: Instant,
    stats: FeedStats,
}

impl FeedWriter<'_> {
    fn is_skipped(&self, row: &[Value]) -> bool {
        if self.skip.is_empty() {
            return false;
        }
        self.feed
            .skip_column
            .and_then(|column| self.feed.column_index(column))
            .and_then(|i| row.get(i))
            .is_some_and(|value| self.skip.contains(&value.key_text()))
    }

    /// Media referenced by the page's rows
    fn media_refs(&self, refs: MediaRefs, rows: &[Row]) -> Vec<MediaRef> {
        let columns = (self.feed.column_index(refs.urls), self.feed.column_index(refs.owner));
        let (Some(urls), Some(owner)) = columns else {
            return Vec::new();
        };
        rows.iter()
            .filter_map(|row| Some((row.get(owner)?, row.get(urls)?)))
            .filter(|(owner, urls)| !owner.is_null() && !urls.is_null())
            .flat_map(|(owner, urls)| MediaRef::parse_list(&owner.key_text(), &urls.key_text()))
            .collect()
    }

    /// Distinct non-null values of `column` within the page
    fn parents(&self, column: &'static str, rows: &[Vec<Value>]) -> RowFilter {
        let mut seen = BTreeSet::new();
        let values = match self.feed.column_index(column) {
            Some(i) => rows
                .iter()
                .filter_map(|row| row.get(i))
                .filter(|value| !value.is_null() && seen.insert(value.key_text()))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        RowFilter::In { column, values }
    }
}

#[async_trait]
impl PageHandler for FeedWriter<'_> {
    async fn handle(&mut self, page: Page) -> Result<()> {
        let mut rows = Vec::with_capacity(page.data.len());
        for record in &page.data {
            for row in self.feed.rows_from_json(record, &self.exported_at)? {
                if self.is_skipped(&row) {
                    self.stats.skipped += 1;
                    continue;
                }
                rows.push(row);
            }
        }

        if let Some((refs, downloader)) = &self.media {
            let wanted = self.media_refs(*refs, &rows);
            if !wanted.is_empty() {
                debug!(feed = self.feed.name, count = wanted.len(), "downloading media");
                self.stats.media += downloader.download_all(wanted).await?;
            }
        }

        if let ReplacePolicy::Parent(column) = self.feed.replace {
            let filter = self.parents(column, &rows);
            self.stats.deleted += self.exporter.delete_rows_if_exist(self.feed, &filter).await?;
        }

        if !rows.is_empty() {
            let written = self.exporter.write_rows(self.feed, &rows).await?;
            self.stats.rows += written.rows;
        }
        self.stats.pages += 1;

        let estimated_remaining = page.metadata.remaining_records;
        let duration_ms = self.started.elapsed().as_millis() as u64;
        self.status.progress(self.feed.name, estimated_remaining, duration_ms);
        info!(
            feed = self.feed.name,
            rows = rows.len(),
            estimated_remaining,
            duration_ms,
            "export batch complete"
        );
        Ok(())
    }
}
