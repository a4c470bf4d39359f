//! Timewarrior, read through `timew export`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wl_core::{Entry, Field, compile_pattern};

use super::{expand_tags, tag_fields};
use crate::client::{FetchOpts, Fetcher};
use crate::command::CommandClient;
use crate::error::{ClientError, ConfigError, FetchError};

const SECTION: &str = "timewarrior";
/// Format of `start` and `end` in the export, always UTC.
const EXPORT_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimewarriorConfig {
    pub command: String,
    /// Appended to the export command, e.g. a tag filter.
    pub arguments: Vec<String>,
    /// Entries carrying this tag are unbillable.
    pub unbillable_tag: String,
    pub client_tag_regex: Option<String>,
    pub project_tag_regex: Option<String>,
}

impl Default for TimewarriorConfig {
    fn default() -> Self {
        Self {
            command: "timew".to_string(),
            arguments: Vec::new(),
            unbillable_tag: "unbillable".to_string(),
            client_tag_regex: None,
            project_tag_regex: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FetchEntry {
    start: String,
    end: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    annotation: String,
}

/// How tags are mapped onto entry attribution.
#[derive(Debug, Clone, Default)]
struct TagRules {
    unbillable_tag: String,
    client: Option<Regex>,
    project: Option<Regex>,
}

#[derive(Debug, Clone)]
pub struct TimewarriorClient {
    command: CommandClient,
    rules: TagRules,
}

impl TimewarriorClient {
    pub fn new(config: &TimewarriorConfig, timeout: Duration) -> Result<Self, ConfigError> {
        if config.command.trim().is_empty() {
            return Err(ConfigError::MissingOption {
                section: SECTION,
                option: "command",
            });
        }
        let rules = TagRules {
            unbillable_tag: config.unbillable_tag.clone(),
            client: compile_pattern("client tag", config.client_tag_regex.as_deref())?,
            project: compile_pattern("project tag", config.project_tag_regex.as_deref())?,
        };
        Ok(Self {
            command: CommandClient::new(config.command.as_str(), config.arguments.clone(), timeout),
            rules,
        })
    }
}

fn parse_time(value: &str) -> Result<DateTime<FixedOffset>, ClientError> {
    NaiveDateTime::parse_from_str(value, EXPORT_TIME_FORMAT)
        .map(|naive| naive.and_utc().fixed_offset())
        .map_err(|err| ClientError::InvalidResponse(format!("invalid time `{value}`: {err}")))
}

fn parse_entries(
    output: &[u8],
    rules: &TagRules,
    tags_as_tasks: Option<&Regex>,
) -> Result<Vec<Entry>, ClientError> {
    let fetched: Vec<FetchEntry> = serde_json::from_slice(output)?;
    let mut entries = Vec::with_capacity(fetched.len());

    for item in fetched {
        let Some(end) = item.end.as_deref() else {
            debug!(annotation = %item.annotation, "skipping running interval");
            continue;
        };
        let start = parse_time(&item.start)?;
        let spent = (parse_time(end)? - start)
            .to_std()
            .map_err(|_| ClientError::InvalidResponse("interval ends before it starts".to_string()))?;

        let mut entry = Entry {
            summary: item.annotation.clone(),
            notes: item.annotation.clone(),
            start: Some(start),
            billable: spent,
            ..Entry::default()
        };

        for tag in &item.tags {
            if *tag == rules.unbillable_tag {
                entry.unbillable = entry.billable;
                entry.billable = Duration::ZERO;
            } else if rules.client.as_ref().is_some_and(|re| re.is_match(tag)) {
                entry.client = Field::named(tag.as_str());
            } else if rules.project.as_ref().is_some_and(|re| re.is_match(tag)) {
                entry.project = Field::named(tag.as_str());
            } else if tags_as_tasks.is_some_and(|re| re.is_match(tag)) {
                entry.task = Field::named(tag.as_str());
            }
        }
        if !entry.task.is_complete() {
            entry.task = Field::named(item.annotation.as_str());
        }

        entries.extend(expand_tags(entry, &tag_fields(&item.tags), tags_as_tasks));
    }

    Ok(entries)
}

#[async_trait]
impl Fetcher for TimewarriorClient {
    fn name(&self) -> &'static str {
        SECTION
    }

    async fn fetch(&self, opts: &FetchOpts) -> Result<Vec<Entry>, FetchError> {
        let args = vec![
            "export".to_string(),
            "from".to_string(),
            opts.start.format(QUERY_TIME_FORMAT).to_string(),
            "to".to_string(),
            opts.end.format(QUERY_TIME_FORMAT).to_string(),
        ];
        let output = self.command.output(&args).await?;
        let entries = parse_entries(&output, &self.rules, opts.tags_as_tasks.as_ref())?;
        debug!(fetched = entries.len(), "parsed timewarrior export");
        Ok(entries)
    }
}
