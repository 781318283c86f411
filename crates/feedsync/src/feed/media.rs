//! Media download for feeds that reference attachments
//!
//! Each URL is fetched through the feed's [`ApiClient`] and written to
//! `{dir}/{owner}/{media_id}.{ext}`. The media id is the last URL segment and
//! the extension is the content type's subtype, so `image/jpeg` gives `.jpeg`.
//! Forbidden and empty (204) responses are skipped.

use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::client::{ensure_success, ApiClient};
use crate::error::{Result, SyncError};

/// Directory media is written under unless configured
pub const DEFAULT_MEDIA_DIR: &str = "./export/media/";

/// Downloads in flight per page
pub const MEDIA_CONCURRENCY: usize = 10;

/// One attachment to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// Sub-directory the file lands in
    pub owner: String,
    pub url: String,
}

impl MediaRef {
    /// One reference per non-blank line of `urls`
    pub fn parse_list(owner: &str, urls: &str) -> Vec<MediaRef> {
        urls.lines()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(|url| MediaRef {
                owner: owner.to_string(),
                url: url.to_string(),
            })
            .collect()
    }
}

/// Last path segment of a media URL, ignoring query and fragment
pub fn media_id(url: &str) -> Option<&str> {
    url.split(['?', '#'])
        .next()?
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty() && *id != "." && *id != "..")
}

/// Subtype of a content type, without parameters
pub fn extension(content_type: &str) -> Option<&str> {
    content_type
        .split(';')
        .next()?
        .split_once('/')
        .map(|(_, subtype)| subtype.trim())
        .filter(|subtype| !subtype.is_empty() && !subtype.contains(['/', '\\']))
}

pub struct MediaDownloader<'a> {
    client: &'a ApiClient,
    dir: &'a Path,
}

impl<'a> MediaDownloader<'a> {
    pub fn new(client: &'a ApiClient, dir: &'a Path) -> Self {
        Self { client, dir }
    }

    /// Fetch and store one attachment. `None` when the server has nothing to give.
    pub async fn download(&self, media: &MediaRef) -> Result<Option<PathBuf>> {
        let outcome = self.client.get(&media.url, &[]).await?;
        let status = outcome.response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::NO_CONTENT {
            debug!(url = %media.url, status = status.as_u16(), "media skipped");
            return Ok(None);
        }

        let response = ensure_success(outcome)?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| SyncError::data_integrity(format!("{}: media has no content type", media.url)))?;
        let ext = extension(content_type)
            .ok_or_else(|| {
                SyncError::data_integrity(format!("{}: unusable content type {}", media.url, content_type))
            })?
            .to_string();
        let id = media_id(&media.url)
            .ok_or_else(|| SyncError::data_integrity(format!("{}: no media id in url", media.url)))?
            .to_string();

        let body = response.bytes().await?;
        let dir = self.dir.join(&media.owner);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.{}", id, ext));
        tokio::fs::write(&path, &body).await?;

        debug!(path = %path.display(), bytes = body.len(), "media written");
        Ok(Some(path))
    }

    /// Download every reference, [`MEDIA_CONCURRENCY`] at a time.
    ///
    /// Returns the number of files written. The first failure stops the batch.
    pub async fn download_all(&self, refs: Vec<MediaRef>) -> Result<usize> {
        let written: Vec<Option<PathBuf>> = stream::iter(refs)
            .map(|media| async move { self.download(&media).await })
            .buffer_unordered(MEDIA_CONCURRENCY)
            .try_collect()
            .await?;
        Ok(written.into_iter().flatten().count())
    }
}
