//! Canonical worklog entry and its attribution fields.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

/// An attribution with both an identifier and a display name.
///
/// Sources with numeric identifiers convert them to strings at the adapter
/// boundary so the core only ever sees string ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub id: String,
    pub name: String,
}

impl Field {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Creates a field that uses the same value as id and name.
    ///
    /// Tag based sources (Timewarrior, Toggl) have no separate identifiers.
    pub fn named(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            id: value.clone(),
            name: value,
        }
    }

    /// A field is complete when both the id and the name are filled.
    pub fn is_complete(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Identity used to find entries describing the same logical activity.
///
/// Client, exact start time and notes are intentionally not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MergeKey {
    pub project: String,
    pub task: String,
    pub summary: String,
    pub date: Option<NaiveDate>,
}

impl fmt::Display for MergeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let date = self
            .date
            .map_or_else(String::new, |d| d.format("%Y-%m-%d").to_string());
        write!(f, "{}:{}:{}:{date}", self.project, self.task, self.summary)
    }
}

/// A single span of logged time.
///
/// Entries are value objects. The reconciler and the splitter never mutate an
/// entry they were given; they build new ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub client: Field,
    pub project: Field,
    pub task: Field,
    pub summary: String,
    pub notes: String,
    /// Start of the activity in the offset reported by the source.
    pub start: Option<DateTime<FixedOffset>>,
    pub billable: Duration,
    pub unbillable: Duration,
}

impl Entry {
    /// Returns the key used for merging similar entries.
    pub fn merge_key(&self) -> MergeKey {
        MergeKey {
            project: self.project.name.clone(),
            task: self.task.name.clone(),
            summary: self.summary.clone(),
            date: self.start.map(|start| start.date_naive()),
        }
    }

    /// Total time spent, billable and unbillable together.
    pub fn total(&self) -> Duration {
        self.billable + self.unbillable
    }

    /// Whether every field needed by an upload target is present.
    ///
    /// Client, project and task must be complete, the summary and start must
    /// be set, and some time must have been spent.
    pub fn is_complete(&self) -> bool {
        let has_metadata = self.client.is_complete()
            && self.project.is_complete()
            && self.task.is_complete()
            && !self.summary.is_empty();
        let has_time = self.start.is_some() && !self.total().is_zero();

        has_metadata && has_time
    }
}
