//! Tempo Timesheets worklogs on Jira server.
//!
//! Tempo is both a source and the upload target. Worklogs are attributed to
//! Jira issues: the account key is the client, the Jira project the project
//! and the issue the task.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wl_core::{Entry, Field};

use super::{Redacted, parse_timestamp};
use crate::client::{FetchOpts, Fetcher, Uploader};
use crate::error::{ClientError, ConfigError, FetchError};
use crate::http::{Auth, HttpClient};
use crate::pipeline::UploadOpts;

const SECTION: &str = "tempo";
const PATH_WORKLOG_CREATE: &str = "/rest/tempo-timesheets/4/worklogs";
const PATH_WORKLOG_SEARCH: &str = "/rest/tempo-timesheets/4/worklogs/search";

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for TempoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempoConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &Redacted(&self.password))
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Issue {
    id: u64,
    key: String,
    #[serde(default)]
    account_key: String,
    project_id: u64,
    project_key: String,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchEntry {
    start_date: String,
    billable_seconds: u64,
    time_spent_seconds: u64,
    #[serde(default)]
    comment: String,
    issue: Issue,
}

#[derive(Debug, Serialize)]
struct SearchParams<'a> {
    from: String,
    to: String,
    worker: &'a str,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadEntry {
    comment: String,
    include_non_working_days: bool,
    origin_task_id: String,
    started: String,
    billable_seconds: u64,
    time_spent_seconds: u64,
    worker: String,
}

impl UploadEntry {
    fn new(entry: &Entry, worker: &str) -> Result<Self, ClientError> {
        let start = entry
            .start
            .ok_or_else(|| ClientError::InvalidEntry(format!("`{}` has no start", entry.summary)))?;
        Ok(Self {
            comment: entry.summary.clone(),
            include_non_working_days: true,
            origin_task_id: entry.task.name.clone(),
            started: start.format("%Y-%m-%d").to_string(),
            billable_seconds: entry.billable.as_secs(),
            time_spent_seconds: entry.total().as_secs(),
            worker: worker.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TempoClient {
    http: HttpClient,
}

impl TempoClient {
    pub fn new(config: &TempoConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let auth = Auth::basic(config.username.as_str(), config.password.as_str())?;
        Ok(Self {
            http: HttpClient::new(SECTION, &config.url, auth, timeout)?,
        })
    }
}

fn parse_entries(body: &str) -> Result<Vec<Entry>, ClientError> {
    let fetched: Vec<FetchEntry> = serde_json::from_str(body)?;
    fetched
        .into_iter()
        .map(|item| -> Result<Entry, ClientError> {
            let issue = item.issue;
            Ok(Entry {
                client: Field::named(issue.account_key),
                project: Field::new(issue.project_id.to_string(), issue.project_key),
                task: Field::new(issue.id.to_string(), issue.key),
                summary: issue.summary,
                notes: item.comment,
                start: Some(parse_timestamp(&item.start_date)?),
                billable: Duration::from_secs(item.billable_seconds),
                unbillable: Duration::from_secs(
                    item.time_spent_seconds.saturating_sub(item.billable_seconds),
                ),
            })
        })
        .collect()
}

#[async_trait]
impl Fetcher for TempoClient {
    fn name(&self) -> &'static str {
        SECTION
    }

    async fn fetch(&self, opts: &FetchOpts) -> Result<Vec<Entry>, FetchError> {
        let params = SearchParams {
            from: opts.start.format("%Y-%m-%d").to_string(),
            to: opts.end.format("%Y-%m-%d").to_string(),
            worker: &opts.user,
        };
        let url = self.http.url(PATH_WORKLOG_SEARCH, &[])?;
        let body = self.http.post_json(url, &params).await?;
        let entries = parse_entries(&body)?;
        debug!(fetched = entries.len(), "fetched tempo worklogs");
        Ok(entries)
    }
}

#[async_trait]
impl Uploader for TempoClient {
    fn name(&self) -> &'static str {
        SECTION
    }

    async fn upload_entry(&self, entry: &Entry, opts: &UploadOpts) -> Result<(), ClientError> {
        let payload = UploadEntry::new(entry, &opts.user)?;
        let url = self.http.url(PATH_WORKLOG_CREATE, &[])?;
        self.http.post_json(url, &payload).await?;
        Ok(())
    }
}
