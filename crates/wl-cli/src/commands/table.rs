//! Plain-text tables of reconciled entries.

use std::cmp::Ordering;
use std::fmt::Write;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeDelta};
use clap::ValueEnum;
use wl_core::{Entry, Worklog};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// A column of the entry tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Column {
    Task,
    Summary,
    Project,
    Client,
    Start,
    End,
    Billable,
    Unbillable,
}

impl Column {
    pub const ALL: [Self; 8] = [
        Self::Task,
        Self::Summary,
        Self::Project,
        Self::Client,
        Self::Start,
        Self::End,
        Self::Billable,
        Self::Unbillable,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Summary => "summary",
            Self::Project => "project",
            Self::Client => "client",
            Self::Start => "start",
            Self::End => "end",
            Self::Billable => "billable",
            Self::Unbillable => "unbillable",
        }
    }

    const fn header(self) -> &'static str {
        match self {
            Self::Task => "Task",
            Self::Summary => "Summary",
            Self::Project => "Project",
            Self::Client => "Client",
            Self::Start => "Start",
            Self::End => "End",
            Self::Billable => "Billable",
            Self::Unbillable => "Unbillable",
        }
    }

    /// Task and durations are always shown.
    pub const fn is_hideable(self) -> bool {
        !matches!(self, Self::Task | Self::Billable | Self::Unbillable)
    }

    fn cell(self, entry: &Entry) -> String {
        let time = |value: Option<DateTime<FixedOffset>>| {
            value.map_or_else(String::new, |t| t.format(TIME_FORMAT).to_string())
        };
        match self {
            Self::Task => entry.task.name.clone(),
            Self::Summary => entry.summary.clone(),
            Self::Project => entry.project.name.clone(),
            Self::Client => entry.client.name.clone(),
            Self::Start => time(entry.start),
            Self::End => time(end_of(entry)),
            Self::Billable => format_duration(entry.billable),
            Self::Unbillable => format_duration(entry.unbillable),
        }
    }

    fn compare(self, a: &Entry, b: &Entry) -> Ordering {
        match self {
            Self::Task => a.task.name.cmp(&b.task.name),
            Self::Summary => a.summary.cmp(&b.summary),
            Self::Project => a.project.name.cmp(&b.project.name),
            Self::Client => a.client.name.cmp(&b.client.name),
            Self::Start => a.start.cmp(&b.start),
            Self::End => end_of(a).cmp(&end_of(b)),
            Self::Billable => a.billable.cmp(&b.billable),
            Self::Unbillable => a.unbillable.cmp(&b.unbillable),
        }
    }
}

/// One sort criterion. A leading `-` sorts descending (`-start`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: Column,
    pub descending: bool,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (descending, name) = value
            .strip_prefix('-')
            .map_or((false, value), |name| (true, name));
        let column = <Column as ValueEnum>::from_str(name, true).map_err(|_| {
            let expected: Vec<&str> = Column::ALL.iter().map(|c| c.as_str()).collect();
            format!("`{name}` is not a column, expected one of: {}", expected.join(", "))
        })?;
        Ok(Self { column, descending })
    }
}

/// Row order and visible columns of the printed tables.
///
/// The default keeps rows in reconciliation order and shows every column.
#[derive(Debug, Clone, Default)]
pub struct TableOpts {
    pub sort_by: Vec<SortKey>,
    pub hidden: Vec<Column>,
}

impl TableOpts {
    fn columns(&self) -> Vec<Column> {
        Column::ALL
            .into_iter()
            .filter(|column| !self.hidden.contains(column))
            .collect()
    }

    fn sorted<'a>(&self, entries: &'a [Entry]) -> Vec<&'a Entry> {
        let mut sorted: Vec<&Entry> = entries.iter().collect();
        sorted.sort_by(|a, b| {
            self.sort_by
                .iter()
                .map(|key| {
                    let order = key.column.compare(a, b);
                    if key.descending { order.reverse() } else { order }
                })
                .find(|order| order.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        sorted
    }
}

fn end_of(entry: &Entry) -> Option<DateTime<FixedOffset>> {
    let spent = TimeDelta::from_std(entry.total()).ok()?;
    entry.start?.checked_add_signed(spent)
}

/// Formats a duration as `Xh Ym`, or `Ym` below one hour.
pub fn format_duration(duration: Duration) -> String {
    let total_minutes = duration.as_secs() / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Title naming the fetch window.
pub fn window_title(start: DateTime<FixedOffset>, end: DateTime<FixedOffset>) -> String {
    format!(
        "Worklog entries ({} - {})",
        start.format("%Y-%m-%d %H:%M %:z"),
        end.format("%Y-%m-%d %H:%M %:z")
    )
}

/// Renders one titled table with a totals row.
pub fn format_table(title: &str, entries: &[Entry], opts: &TableOpts) -> String {
    let mut output = String::new();
    writeln!(output, "{title}").unwrap();
    writeln!(output, "{}", "─".repeat(title.chars().count())).unwrap();

    if entries.is_empty() {
        writeln!(output, "(none)").unwrap();
        return output;
    }

    let columns = opts.columns();
    let billable: Duration = entries.iter().map(|e| e.billable).sum();
    let unbillable: Duration = entries.iter().map(|e| e.unbillable).sum();
    let totals: Vec<String> = columns
        .iter()
        .map(|column| match column {
            Column::Task => "Total".to_string(),
            Column::Billable => format_duration(billable),
            Column::Unbillable => format_duration(unbillable),
            _ => String::new(),
        })
        .collect();

    let header: Vec<String> = columns.iter().map(|c| c.header().to_string()).collect();
    let rows: Vec<Vec<String>> = opts
        .sorted(entries)
        .into_iter()
        .map(|entry| columns.iter().map(|c| c.cell(entry)).collect())
        .collect();

    let mut widths = vec![0; columns.len()];
    for cells in std::iter::once(&header).chain(&rows).chain(std::iter::once(&totals)) {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    for cells in std::iter::once(&header).chain(&rows).chain(std::iter::once(&totals)) {
        let line = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        writeln!(output, "{}", line.trim_end()).unwrap();
    }

    output
}

/// Renders the title, then the complete and the incomplete entries.
pub fn format_worklog(title: &str, worklog: &Worklog, opts: &TableOpts) -> String {
    let mut output = format!("{title}\n\n");
    output.push_str(&format_table("COMPLETE ENTRIES", worklog.complete(), opts));
    output.push('\n');
    output.push_str(&format_table("INCOMPLETE ENTRIES", worklog.incomplete(), opts));
    output
}
