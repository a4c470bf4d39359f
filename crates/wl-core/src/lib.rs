//! Core domain logic for worklog sync.
//!
//! This crate contains the pure, synchronous parts of a sync run:
//! - Entry model: attribution fields, merge key and completeness
//! - Reconciliation: filtering, merging and classifying entries
//! - Tag splitting: deriving per-task entries from tags

pub mod duration;
mod entry;
mod filter;
mod split;
mod worklog;

pub use entry::{Entry, Field, MergeKey};
pub use filter::{FilterOpts, PatternError, compile_pattern};
pub use worklog::{Worklog, classify, merge};
