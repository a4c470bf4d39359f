//! The sync command: fetch, reconcile, confirm and upload.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use tokio_util::sync::CancellationToken;
use tracing::info;
use wl_client::{
    FetchOpts, SourceKind, TargetKind, TerminalProgress, UploadOpts, UploadReport, Uploader,
    build_fetcher, build_uploader, collect_results, ensure_distinct, results_channel, upload,
};
use wl_core::{Entry, FilterOpts, Worklog, compile_pattern};

use super::table::{TableOpts, format_worklog, window_title};
use crate::{Config, SyncArgs};

/// Everything a sync run needs, validated before any I/O happens.
#[derive(Debug)]
pub struct Plan {
    pub source: SourceKind,
    pub target: TargetKind,
    pub filters: FilterOpts,
    pub fetch: FetchOpts,
    pub upload: UploadOpts,
    pub table: TableOpts,
}

/// Validates the arguments against the configuration.
///
/// `today` anchors the default window in local time.
pub fn plan(args: &SyncArgs, config: &Config, today: NaiveDate) -> Result<Plan> {
    let source: SourceKind = args.source.parse()?;
    let target: TargetKind = args.target.parse()?;
    ensure_distinct(source, target)?;

    let filters = FilterOpts::new(args.filter_client.as_deref(), args.filter_project.as_deref())?;
    let tags_as_tasks = compile_pattern("tags-as-tasks", args.tags_as_tasks_regex.as_deref())?;
    let (start, end) = resolve_window(
        args.start.as_deref(),
        args.end.as_deref(),
        args.date_format.as_deref(),
        today,
    )?;

    if args.max_workers == Some(0) {
        bail!("--max-workers must be at least 1");
    }
    if let Some(column) = args.hide_columns.iter().find(|column| !column.is_hideable()) {
        bail!("column `{}` cannot be hidden", column.as_str());
    }

    Ok(Plan {
        source,
        target,
        filters,
        fetch: FetchOpts {
            user: args.source_user.clone(),
            start,
            end,
            tags_as_tasks,
        },
        upload: UploadOpts {
            user: args.target_user.clone(),
            treat_all_billable: args.force_billed_duration,
            round_to_minute: args.round_to_closest_minute,
            timeout: config.timeout(),
            max_workers: args.max_workers,
        },
        table: TableOpts {
            sort_by: args.sort_by.clone(),
            hidden: args.hide_columns.clone(),
        },
    })
}

fn local_midnight(date: NaiveDate) -> Result<DateTime<FixedOffset>> {
    local_time(date.and_time(NaiveTime::MIN))
}

fn local_time(time: NaiveDateTime) -> Result<DateTime<FixedOffset>> {
    time.and_local_timezone(Local)
        .earliest()
        .map(|local| local.fixed_offset())
        .with_context(|| format!("{time} does not exist in the local time zone"))
}

/// Parses a window bound. A bare date used as the end of the window means
/// the end of that day.
///
/// Without `date_format`, bounds are `YYYY-MM-DD` dates or RFC 3339 times.
/// With it, bounds are local times or dates in that format.
fn parse_bound(value: &str, date_format: Option<&str>, is_end: bool) -> Result<DateTime<FixedOffset>> {
    let date = if let Some(format) = date_format {
        if let Ok(time) = NaiveDateTime::parse_from_str(value, format) {
            return local_time(time);
        }
        NaiveDate::parse_from_str(value, format)
            .with_context(|| format!("`{value}` does not match date format `{format}`"))?
    } else {
        if let Ok(time) = DateTime::parse_from_rfc3339(value) {
            return Ok(time);
        }
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .with_context(|| format!("invalid date `{value}`, expected YYYY-MM-DD or RFC 3339"))?
    };
    let date = if is_end {
        date.succ_opt().context("date out of range")?
    } else {
        date
    };
    local_midnight(date)
}

/// Returns the fetch window. Defaults to the whole of `today`.
pub fn resolve_window(
    start: Option<&str>,
    end: Option<&str>,
    date_format: Option<&str>,
    today: NaiveDate,
) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
    let start = match start {
        Some(value) => parse_bound(value, date_format, false)?,
        None => local_midnight(today)?,
    };
    let end = match end {
        Some(value) => parse_bound(value, date_format, true)?,
        None => start + TimeDelta::days(1),
    };

    if end <= start {
        bail!("--end ({end}) must be after --start ({start})");
    }
    Ok((start, end))
}

/// Asks for confirmation. Anything but `y` or `yes` declines.
fn confirm<W: Write, R: BufRead>(writer: &mut W, input: &mut R) -> Result<bool> {
    write!(writer, "Continue? [y/n] ")?;
    writer.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer).context("failed to read answer")?;
    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}

async fn upload_entries(
    uploader: Arc<dyn Uploader>,
    entries: Vec<Entry>,
    opts: &UploadOpts,
    progress_message_length: usize,
    cancel: CancellationToken,
) -> UploadReport {
    let expected = entries.len();
    let progress = Arc::new(TerminalProgress::new(std::io::stderr(), progress_message_length));
    progress.start();

    let (results, receiver) = results_channel(expected);
    upload(uploader, entries, results, opts, progress.clone(), cancel);
    let report = collect_results(receiver, expected).await;

    progress.stop();
    report
}

pub async fn run<W: Write, R: BufRead>(
    writer: &mut W,
    input: &mut R,
    config: &Config,
    args: &SyncArgs,
    cancel: CancellationToken,
) -> Result<()> {
    let plan = plan(args, config, Local::now().date_naive())?;

    // Build both ends first so configuration problems surface before any I/O.
    let fetcher = build_fetcher(plan.source, &config.sources, config.timeout())?;
    let uploader = if args.dry_run {
        None
    } else {
        Some(build_uploader(plan.target, &config.sources, config.timeout())?)
    };

    info!(
        source = %plan.source,
        start = %plan.fetch.start,
        end = %plan.fetch.end,
        "fetching entries"
    );
    let entries = tokio::select! {
        biased;
        fetched = fetcher.fetch(&plan.fetch) => {
            fetched.with_context(|| format!("failed to fetch entries from {}", plan.source))?
        }
        () = cancel.cancelled() => bail!("interrupted while fetching entries from {}", plan.source),
    };

    let worklog = Worklog::new(entries, &plan.filters);
    let title = window_title(plan.fetch.start, plan.fetch.end);
    write!(writer, "{}", format_worklog(&title, &worklog, &plan.table))?;

    let Some(uploader) = uploader else {
        writeln!(writer, "\nDry run, nothing uploaded.")?;
        return Ok(());
    };

    let (complete, _incomplete) = worklog.into_parts();
    if complete.is_empty() {
        writeln!(writer, "\nNothing to upload.")?;
        return Ok(());
    }

    writeln!(writer)?;
    if !args.yes && !confirm(writer, input)? {
        writeln!(writer, "Aborted.")?;
        return Ok(());
    }
    if cancel.is_cancelled() {
        bail!("interrupted before uploading");
    }

    let total = complete.len();
    let report = upload_entries(
        uploader,
        complete,
        &plan.upload,
        config.progress_message_length,
        cancel,
    )
    .await;

    writeln!(
        writer,
        "Uploaded {} of {total} entries to {}.",
        report.succeeded, plan.target
    )?;
    for err in &report.errors {
        writeln!(writer, "- {err}")?;
    }

    if !report.is_success() {
        bail!(
            "{} of {total} entries were not uploaded",
            report.errors.len() + report.missing
        );
    }
    Ok(())
}
