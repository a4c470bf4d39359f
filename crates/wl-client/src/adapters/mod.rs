//! Source and target adapters.
//!
//! Each adapter translates one external system's representation into
//! [`Entry`] values and back. Nothing outside this module knows about the
//! wire formats.

pub mod clockify;
pub mod harvest;
pub mod tempo;
pub mod timewarrior;
pub mod toggl;

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use regex::Regex;
use wl_core::{Entry, Field};

use crate::error::ClientError;

/// Sent where an API asks clients to identify themselves.
const USER_AGENT: &str = concat!("wl/", env!("CARGO_PKG_VERSION"));

/// Parses an RFC 3339 timestamp, falling back to offset-less formats which
/// are read as UTC.
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, ClientError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc().fixed_offset())
        .ok_or_else(|| ClientError::InvalidResponse(format!("invalid timestamp `{value}`")))
}

/// Returns `(billable, unbillable)` for time spent on a (non-)billable entry.
pub(crate) const fn billability(spent: Duration, billable: bool) -> (Duration, Duration) {
    if billable {
        (spent, Duration::ZERO)
    } else {
        (Duration::ZERO, spent)
    }
}

/// Converts plain tag names into fields.
pub(crate) fn tag_fields(tags: &[String]) -> Vec<Field> {
    tags.iter().map(|tag| Field::named(tag.as_str())).collect()
}

/// Splits `entry` by its tags when a task pattern is configured, keeping the
/// entry as is when no tag matches.
pub(crate) fn expand_tags(entry: Entry, tags: &[Field], tags_as_tasks: Option<&Regex>) -> Vec<Entry> {
    match tags_as_tasks {
        Some(pattern) if !tags.is_empty() => {
            entry.split_by_tags_or_keep(&entry.summary, pattern, tags)
        }
        _ => vec![entry],
    }
}

/// Wraps a secret so it is never printed by `Debug`.
pub(crate) struct Redacted<'a>(pub &'a str);

impl std::fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            f.write_str("\"\"")
        } else {
            f.write_str("[REDACTED]")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_naive_timestamps() {
        let with_offset = parse_timestamp("2021-10-02T05:00:00+02:00").unwrap();
        assert_eq!(with_offset.to_rfc3339(), "2021-10-02T05:00:00+02:00");

        let naive = parse_timestamp("2021-10-02 05:00:00.000").unwrap();
        assert_eq!(naive.to_rfc3339(), "2021-10-02T05:00:00+00:00");

        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(ClientError::InvalidResponse(_))
        ));
    }

    #[test]
    fn billability_moves_time_to_the_right_bucket() {
        let hour = Duration::from_secs(3600);
        assert_eq!(billability(hour, true), (hour, Duration::ZERO));
        assert_eq!(billability(hour, false), (Duration::ZERO, hour));
    }

    #[test]
    fn expand_tags_without_pattern_keeps_entry() {
        let entry = Entry {
            summary: "Work".to_string(),
            billable: Duration::from_secs(60),
            ..Entry::default()
        };
        let tags = tag_fields(&["TASK-1".to_string()]);
        assert_eq!(expand_tags(entry.clone(), &tags, None), vec![entry]);
    }

    #[test]
    fn expand_tags_splits_matching_tags_and_keeps_unmatched_entries() {
        let pattern = Regex::new(r"^TASK-\d+$").unwrap();
        let entry = Entry {
            summary: "Work".to_string(),
            billable: Duration::from_secs(60),
            ..Entry::default()
        };

        let tags = tag_fields(&["TASK-1".to_string(), "meeting".to_string(), "TASK-2".to_string()]);
        let split = expand_tags(entry.clone(), &tags, Some(&pattern));
        let tasks: Vec<&str> = split.iter().map(|e| e.task.name.as_str()).collect();
        assert_eq!(tasks, ["TASK-1", "TASK-2"]);
        assert!(split.iter().all(|e| e.billable == Duration::from_secs(30)));

        let unmatched = tag_fields(&["meeting".to_string()]);
        assert_eq!(expand_tags(entry.clone(), &unmatched, Some(&pattern)), vec![entry]);
    }

    #[test]
    fn redacted_hides_secrets() {
        assert_eq!(format!("{:?}", Redacted("secret")), "[REDACTED]");
        assert_eq!(format!("{:?}", Redacted("")), "\"\"");
    }
}
