//! Clockify time entries.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wl_core::{Entry, Field};

use super::{Redacted, billability, expand_tags, parse_timestamp};
use crate::client::{FetchOpts, Fetcher};
use crate::error::{ClientError, ConfigError, FetchError};
use crate::http::{Auth, HttpClient};
use crate::paginate::{DEFAULT_MAX_PAGE_SIZE, PageMeta, PageRequest, PaginateOpts, paginated_fetch};

const SECTION: &str = "clockify";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockifyConfig {
    pub url: String,
    pub api_key: String,
    pub workspace: String,
}

impl Default for ClockifyConfig {
    fn default() -> Self {
        Self {
            url: "https://api.clockify.me".to_string(),
            api_key: String::new(),
            workspace: String::new(),
        }
    }
}

impl fmt::Debug for ClockifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockifyConfig")
            .field("url", &self.url)
            .field("api_key", &Redacted(&self.api_key))
            .field("workspace", &self.workspace)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Project {
    id: String,
    name: String,
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_name: String,
}

#[derive(Debug, Deserialize)]
struct Interval {
    start: String,
    end: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchEntry {
    #[serde(default)]
    description: String,
    #[serde(default)]
    billable: bool,
    project: Option<Project>,
    task: Option<Field>,
    time_interval: Interval,
    #[serde(default)]
    tags: Option<Vec<Field>>,
}

#[derive(Debug, Clone)]
pub struct ClockifyClient {
    http: HttpClient,
    workspace: String,
}

impl ClockifyClient {
    pub fn new(config: &ClockifyConfig, timeout: std::time::Duration) -> Result<Self, ConfigError> {
        if config.workspace.trim().is_empty() {
            return Err(ConfigError::MissingOption {
                section: SECTION,
                option: "workspace",
            });
        }
        let auth = Auth::token(Some("X-Api-Key"), None, config.api_key.as_str())?;
        Ok(Self {
            http: HttpClient::new(SECTION, &config.url, auth, timeout)?,
            workspace: config.workspace.clone(),
        })
    }

    async fn fetch_page(
        &self,
        opts: &FetchOpts,
        request: PageRequest,
    ) -> Result<(String, PageMeta), ClientError> {
        let path = format!(
            "/api/v1/workspaces/{}/user/{}/time-entries",
            self.workspace, opts.user
        );
        let url = self.http.url(
            &path,
            &[
                ("start", format_time(opts.start)),
                ("end", format_time(opts.end)),
                ("page", request.page.to_string()),
                ("page-size", request.page_size.to_string()),
                ("hydrated", "true".to_string()),
                ("in-progress", "false".to_string()),
            ],
        )?;
        // Clockify reports no totals; the loop ends on an empty page.
        Ok((self.http.get(url).await?, PageMeta::default()))
    }
}

fn format_time(time: DateTime<FixedOffset>) -> String {
    time.with_timezone(&Utc).format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn parse_entries(body: &str, tags_as_tasks: Option<&Regex>) -> Result<Vec<Entry>, ClientError> {
    let fetched: Vec<FetchEntry> = serde_json::from_str(body)?;
    let mut entries = Vec::with_capacity(fetched.len());

    for item in fetched {
        let Some(end) = item.time_interval.end.as_deref() else {
            debug!(description = %item.description, "skipping running entry");
            continue;
        };
        let start = parse_timestamp(&item.time_interval.start)?;
        let spent = (parse_timestamp(end)? - start)
            .to_std()
            .map_err(|_| ClientError::InvalidResponse("entry ends before it starts".to_string()))?;
        let (billable, unbillable) = billability(spent, item.billable);

        let (client, project) = item.project.map_or_else(Default::default, |project| {
            (
                Field::new(project.client_id, project.client_name),
                Field::new(project.id, project.name),
            )
        });

        let entry = Entry {
            client,
            project,
            task: item.task.unwrap_or_default(),
            summary: item.description.clone(),
            notes: item.description,
            start: Some(start),
            billable,
            unbillable,
        };
        let tags = item.tags.unwrap_or_default();
        entries.extend(expand_tags(entry, &tags, tags_as_tasks));
    }

    Ok(entries)
}

#[async_trait]
impl Fetcher for ClockifyClient {
    fn name(&self) -> &'static str {
        SECTION
    }

    async fn fetch(&self, opts: &FetchOpts) -> Result<Vec<Entry>, FetchError> {
        let paging = PaginateOpts {
            page_size: DEFAULT_MAX_PAGE_SIZE,
            ..PaginateOpts::default()
        };
        let tags_as_tasks = opts.tags_as_tasks.as_ref();

        paginated_fetch(
            &paging,
            move |request| self.fetch_page(opts, request),
            |body: String| parse_entries(&body, tags_as_tasks),
        )
        .await
    }
}
