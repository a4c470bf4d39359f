//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::commands::table::{Column, SortKey};

/// Sync worklogs between time trackers.
///
/// Fetches entries from a source, merges duplicates, shows what is complete
/// enough to upload and sends it to the target.
#[derive(Debug, Parser)]
#[command(name = "wl", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch entries from a source and upload them to a target.
    Sync(SyncArgs),

    /// List supported sources and targets.
    Sources,
}

#[derive(Debug, Clone, Default, Args)]
pub struct SyncArgs {
    /// Where entries are fetched from.
    #[arg(long)]
    pub source: String,

    /// Where entries are uploaded to.
    #[arg(long)]
    pub target: String,

    /// Start of the window (YYYY-MM-DD or RFC 3339). Defaults to today.
    #[arg(long)]
    pub start: Option<String>,

    /// End of the window (YYYY-MM-DD or RFC 3339). A date includes the whole
    /// day. Defaults to one day after the start.
    #[arg(long)]
    pub end: Option<String>,

    /// strftime-style format of --start and --end, read in local time.
    #[arg(long)]
    pub date_format: Option<String>,

    /// User to fetch entries for, in the source's own notation.
    #[arg(long, default_value = "")]
    pub source_user: String,

    /// User to log entries for, in the target's own notation.
    #[arg(long, default_value = "")]
    pub target_user: String,

    /// Treat tags matching this pattern as tasks and split entries by them.
    #[arg(long)]
    pub tags_as_tasks_regex: Option<String>,

    /// Only keep entries whose client name matches this pattern.
    #[arg(long)]
    pub filter_client: Option<String>,

    /// Only keep entries whose project name matches this pattern.
    #[arg(long)]
    pub filter_project: Option<String>,

    /// Round billable and unbillable time to the nearest minute.
    #[arg(long)]
    pub round_to_closest_minute: bool,

    /// Upload unbillable time as billable.
    #[arg(long)]
    pub force_billed_duration: bool,

    /// Columns to sort the tables by. Prefix a column with `-` to sort
    /// descending.
    #[arg(
        long = "table-sort-by",
        value_delimiter = ',',
        allow_hyphen_values = true,
        default_value = "start,project,task,summary"
    )]
    pub sort_by: Vec<SortKey>,

    /// Columns to leave out of the tables (summary, project, client, start,
    /// end).
    #[arg(long = "table-hide-column", value_enum, value_delimiter = ',')]
    pub hide_columns: Vec<Column>,

    /// Maximum number of tasks uploaded at the same time.
    #[arg(long, value_parser = clap::value_parser!(usize))]
    pub max_workers: Option<usize>,

    /// Show the entries without uploading anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Upload without asking for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}
