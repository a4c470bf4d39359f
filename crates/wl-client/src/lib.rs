//! Talking to time tracking systems.
//!
//! This crate contains everything that performs I/O during a sync run:
//! - Capabilities: [`Fetcher`] and [`Uploader`], implemented per system
//! - Pagination: one control loop for every paginated API
//! - Upload pipeline: grouped, concurrent uploads with per-entry results
//! - Adapters and the registry that builds them from configuration

pub mod adapters;
mod client;
mod command;
mod error;
mod http;
pub mod paginate;
mod pipeline;
pub mod progress;
pub mod registry;

pub use client::{FetchOpts, Fetcher, Uploader};
pub use command::CommandClient;
pub use error::{ClientError, ConfigError, FetchError, UploadError};
pub use http::{Auth, HttpClient};
pub use paginate::{PageMeta, PageRequest, PaginateOpts, paginated_fetch};
pub use pipeline::{
    DEFAULT_TIMEOUT, UploadOpts, UploadReport, UploadResult, collect_results, group_by_task,
    results_channel, upload,
};
pub use progress::{NoProgress, Outcome, Progress, TerminalProgress, TrackerId};
pub use registry::{SourceKind, SourcesConfig, TargetKind, build_fetcher, build_uploader, ensure_distinct};
