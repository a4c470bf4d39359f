//! Error types for fetching, uploading and configuring clients.

use std::time::Duration;

use thiserror::Error;
use wl_core::{Entry, PatternError};

/// Low level failure of a single request or command execution.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned a non-success status.
    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },
    /// The request URL could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// An external command could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// An external command exited unsuccessfully.
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    /// Failed to parse a response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// An entry is missing data the target requires.
    #[error("entry cannot be uploaded: {0}")]
    InvalidEntry(String),
    /// The call did not finish before its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// Pagination never reached an empty page or the reported total.
    #[error("stopped after {0} pages without reaching the end of the results")]
    PageLimit(usize),
    /// The run was cancelled before or while the call was in flight.
    #[error("cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Fetching entries from a source failed. No entries are returned with it.
#[derive(Debug, Error)]
#[error("failed to fetch entries: {0}")]
pub struct FetchError(#[from] pub ClientError);

/// Uploading a single entry failed.
///
/// Upload errors are isolated: sibling uploads carry on and the caller
/// collects every error at the end of the run.
#[derive(Debug, Error)]
#[error("failed to upload entry `{summary}` ({task}): {cause}")]
pub struct UploadError {
    pub summary: String,
    pub task: String,
    #[source]
    pub cause: ClientError,
}

impl UploadError {
    pub fn new(entry: &Entry, cause: ClientError) -> Self {
        Self {
            summary: entry.summary.clone(),
            task: entry.task.name.clone(),
            cause,
        }
    }

    /// Whether the entry was skipped or interrupted by cancellation.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.cause, ClientError::Cancelled)
    }
}

/// Invalid configuration, detected before any fetch or upload starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown source `{name}`, expected one of: {expected}")]
    UnknownSource { name: String, expected: String },
    #[error("unknown target `{name}`, expected one of: {expected}")]
    UnknownTarget { name: String, expected: String },
    #[error("sync source cannot match the target")]
    SourceIsTarget,
    #[error("{section}: `{option}` must be set")]
    MissingOption {
        section: &'static str,
        option: &'static str,
    },
    #[error("{section}: invalid base URL `{url}`: {reason}")]
    InvalidUrl {
        section: &'static str,
        url: String,
        reason: String,
    },
    #[error("invalid credentials: {0}")]
    InvalidAuth(&'static str),
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error(transparent)]
    Pattern(#[from] PatternError),
}
