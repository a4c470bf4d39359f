//! Toggl Track detailed reports.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use wl_core::{Entry, Field};

use super::{Redacted, USER_AGENT, billability, expand_tags, parse_timestamp, tag_fields};
use crate::client::{FetchOpts, Fetcher};
use crate::error::{ClientError, ConfigError, FetchError};
use crate::http::{Auth, HttpClient};
use crate::paginate::{PageMeta, PageRequest, PaginateOpts, paginated_fetch};

const SECTION: &str = "toggl";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TogglConfig {
    pub url: String,
    pub api_token: String,
    pub workspace: String,
}

impl Default for TogglConfig {
    fn default() -> Self {
        Self {
            url: "https://api.track.toggl.com".to_string(),
            api_token: String::new(),
            workspace: String::new(),
        }
    }
}

impl fmt::Debug for TogglConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TogglConfig")
            .field("url", &self.url)
            .field("api_token", &Redacted(&self.api_token))
            .field("workspace", &self.workspace)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct FetchEntry {
    client: Option<String>,
    #[serde(default)]
    description: String,
    /// Milliseconds.
    dur: u64,
    is_billable: bool,
    project: Option<String>,
    pid: Option<u64>,
    start: String,
    #[serde(default)]
    tags: Vec<String>,
    task: Option<String>,
    tid: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ReportPage {
    total_count: Option<usize>,
    per_page: Option<usize>,
    data: Vec<FetchEntry>,
}

fn optional_field(id: Option<u64>, name: Option<String>) -> Field {
    Field::new(
        id.map(|id| id.to_string()).unwrap_or_default(),
        name.unwrap_or_default(),
    )
}

#[derive(Debug, Clone)]
pub struct TogglClient {
    http: HttpClient,
    workspace: String,
}

impl TogglClient {
    pub fn new(config: &TogglConfig, timeout: Duration) -> Result<Self, ConfigError> {
        if config.workspace.trim().is_empty() {
            return Err(ConfigError::MissingOption {
                section: SECTION,
                option: "workspace",
            });
        }
        // Toggl takes the API token as the username of basic auth.
        let auth = Auth::basic(config.api_token.as_str(), "api_token")?;
        Ok(Self {
            http: HttpClient::new(SECTION, &config.url, auth, timeout)?,
            workspace: config.workspace.clone(),
        })
    }

    async fn fetch_page(
        &self,
        opts: &FetchOpts,
        request: PageRequest,
    ) -> Result<(Vec<FetchEntry>, PageMeta), ClientError> {
        let url = self.http.url(
            "/reports/api/v2/details",
            &[
                ("since", opts.start.format("%Y-%m-%d").to_string()),
                ("until", opts.end.format("%Y-%m-%d").to_string()),
                ("page", request.page.to_string()),
                ("user_id", opts.user.clone()),
                ("workspace_id", self.workspace.clone()),
                ("user_agent", USER_AGENT.to_string()),
            ],
        )?;
        let page: ReportPage = serde_json::from_str(&self.http.get(url).await?)?;
        let meta = PageMeta {
            entries_per_page: page.per_page,
            total_entries: page.total_count,
        };
        Ok((page.data, meta))
    }
}

fn parse_entries(
    fetched: Vec<FetchEntry>,
    tags_as_tasks: Option<&Regex>,
) -> Result<Vec<Entry>, ClientError> {
    let mut entries = Vec::with_capacity(fetched.len());

    for item in fetched {
        let (billable, unbillable) = billability(Duration::from_millis(item.dur), item.is_billable);
        let client = item.client.unwrap_or_default();

        let entry = Entry {
            client: Field::named(client),
            project: optional_field(item.pid, item.project),
            task: optional_field(item.tid, item.task),
            summary: item.description.clone(),
            notes: item.description,
            start: Some(parse_timestamp(&item.start)?),
            billable,
            unbillable,
        };
        entries.extend(expand_tags(entry, &tag_fields(&item.tags), tags_as_tasks));
    }

    Ok(entries)
}

#[async_trait]
impl Fetcher for TogglClient {
    fn name(&self) -> &'static str {
        SECTION
    }

    async fn fetch(&self, opts: &FetchOpts) -> Result<Vec<Entry>, FetchError> {
        // The report API picks its own page size and reports it back.
        let paging = PaginateOpts::default();
        let tags_as_tasks = opts.tags_as_tasks.as_ref();

        paginated_fetch(
            &paging,
            move |request| self.fetch_page(opts, request),
            |page| parse_entries(page, tags_as_tasks),
        )
        .await
    }
}
