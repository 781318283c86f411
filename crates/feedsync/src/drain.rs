//! Cursor-driven page draining
//!
//! A feed endpoint returns an envelope:
//!
//! ```json
//! {"metadata": {"next_page": "/feed/users?cursor=..", "remaining_records": 120}, "data": [..]}
//! ```
//!
//! The drainer follows `next_page` until it is empty, handing each page to a
//! [`PageHandler`] in server order. The handler always runs at least once.
//!
//! SHEQSY history endpoints page by version instead:
//!
//! ```json
//! {"data": [..], "lastVersion": 42, "hasMoreItems": true, "itemsLeft": 300}
//! ```
//!
//! The next request asks for `?ver=42`; the walk ends when `hasMoreItems` is
//! false or `lastVersion` is 0.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Instant;
use tracing::debug;

use crate::client::{decode_json, ensure_success, ApiClient};
use crate::error::{Result, SyncError};

/// Version requested by the first history call
pub const FIRST_HISTORY_VERSION: i64 = 1;

/// Pagination metadata of one page
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageMetadata {
    #[serde(default)]
    pub next_page: Option<String>,
    #[serde(default)]
    pub remaining_records: i64,
}

/// One fetched page of raw records
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub data: Vec<Value>,
    pub metadata: PageMetadata,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    metadata: Option<PageMetadata>,
    #[serde(default)]
    data: Option<Vec<Value>>,
}

impl From<Envelope> for Page {
    fn from(envelope: Envelope) -> Self {
        Self {
            data: envelope.data.unwrap_or_default(),
            metadata: envelope.metadata.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryEnvelope {
    #[serde(default)]
    data: Option<Vec<Value>>,
    #[serde(default)]
    last_version: i64,
    #[serde(default)]
    has_more_items: bool,
    #[serde(default)]
    items_left: i64,
}

impl HistoryEnvelope {
    /// Version to request next, if the history continues
    fn next_version(&self) -> Option<i64> {
        (self.has_more_items && self.last_version != 0).then_some(self.last_version)
    }
}

impl Page {
    /// A single page holding every record, with no cursor
    pub fn single(data: Vec<Value>) -> Self {
        Self {
            data,
            metadata: PageMetadata::default(),
        }
    }

    /// The cursor for the next page, if any
    pub fn next_page(&self) -> Option<&str> {
        self.metadata
            .next_page
            .as_deref()
            .filter(|next| !next.trim().is_empty())
    }
}

/// Consumer of drained pages
///
/// An error returned here stops the drain at once. The fetch already
/// succeeded, so it is not retried.
#[async_trait]
pub trait PageHandler: Send {
    async fn handle(&mut self, page: Page) -> Result<()>;
}

/// Walks a paginated endpoint to exhaustion
pub struct FeedDrainer<'a> {
    client: &'a ApiClient,
}

impl<'a> FeedDrainer<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    /// Drain from `initial_url`. `params` apply to the first request only.
    ///
    /// Returns the number of pages handled.
    pub async fn drain(
        &self,
        initial_url: &str,
        params: &[(String, String)],
        handler: &mut dyn PageHandler,
    ) -> Result<usize> {
        let mut cursor = initial_url.to_string();
        let mut query = params;
        let mut pages = 0usize;

        loop {
            let started = Instant::now();
            let response = ensure_success(self.client.get(&cursor, query).await?)?;
            let page: Page = decode_json::<Envelope>(response).await?.into();
            query = &[];

            debug!(
                url = %cursor,
                records = page.data.len(),
                remaining = page.metadata.remaining_records,
                duration_ms = started.elapsed().as_millis() as u64,
                "page fetched"
            );

            let next = page.next_page().map(str::to_string);
            handler.handle(page).await?;
            pages += 1;

            match next {
                Some(next) => cursor = next,
                None => return Ok(pages),
            }
        }
    }

    /// Walk a versioned history endpoint from [`FIRST_HISTORY_VERSION`].
    ///
    /// Returns the number of pages handled. A version that does not move
    /// forward is a data-integrity error.
    pub async fn drain_versions(&self, url: &str, handler: &mut dyn PageHandler) -> Result<usize> {
        let mut version = FIRST_HISTORY_VERSION;
        let mut pages = 0usize;

        loop {
            let started = Instant::now();
            let query = [("ver".to_string(), version.to_string())];
            let response = ensure_success(self.client.get(url, &query).await?)?;
            let envelope: HistoryEnvelope = decode_json(response).await?;
            let next = envelope.next_version();

            debug!(
                url,
                version,
                last_version = envelope.last_version,
                remaining = envelope.items_left,
                duration_ms = started.elapsed().as_millis() as u64,
                "history page fetched"
            );

            let page = Page {
                data: envelope.data.unwrap_or_default(),
                metadata: PageMetadata {
                    next_page: None,
                    remaining_records: envelope.items_left,
                },
            };
            handler.handle(page).await?;
            pages += 1;

            match next {
                Some(next) if next == version => {
                    return Err(SyncError::data_integrity(format!(
                        "{}: history version {} did not advance",
                        url, version
                    )));
                },
                Some(next) => version = next,
                None => return Ok(pages),
            }
        }
    }

    /// Fetch an endpoint that returns a bare JSON array as one page.
    pub async fn fetch_single(&self, url: &str, handler: &mut dyn PageHandler) -> Result<usize> {
        let response = ensure_success(self.client.get(url, &[]).await?)?;
        let data: Vec<Value> = decode_json(response).await?;
        handler.handle(Page::single(data)).await?;
        Ok(1)
    }
}
