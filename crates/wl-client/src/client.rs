//! Capabilities implemented by sources and targets.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use wl_core::Entry;

use crate::error::{ClientError, FetchError};
use crate::pipeline::UploadOpts;

/// Options for a single fetch.
#[derive(Debug, Clone)]
pub struct FetchOpts {
    /// Source specific user identifier. Empty means the authenticated user.
    pub user: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    /// When set, tags matching this pattern become tasks.
    pub tags_as_tasks: Option<Regex>,
}

/// A source of entries.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Short name used in logs and messages.
    fn name(&self) -> &'static str;

    /// Returns every entry in the requested window, or an error and nothing.
    async fn fetch(&self, opts: &FetchOpts) -> Result<Vec<Entry>, FetchError>;
}

/// A target that accepts entries one at a time.
///
/// Batching and concurrency are handled by [`crate::upload`].
#[async_trait]
pub trait Uploader: Send + Sync {
    fn name(&self) -> &'static str;

    async fn upload_entry(&self, entry: &Entry, opts: &UploadOpts) -> Result<(), ClientError>;
}
