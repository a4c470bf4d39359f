//! Harvest time entries.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use wl_core::{Entry, Field};

use super::{Redacted, USER_AGENT, billability, parse_timestamp};
use crate::client::{FetchOpts, Fetcher};
use crate::error::{ClientError, ConfigError, FetchError};
use crate::http::{Auth, HttpClient};
use crate::paginate::{DEFAULT_MAX_PAGE_SIZE, PageMeta, PageRequest, PaginateOpts, paginated_fetch};

const SECTION: &str = "harvest";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub url: String,
    pub token: String,
    pub account: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            url: "https://api.harvestapp.com".to_string(),
            token: String::new(),
            account: String::new(),
        }
    }
}

impl fmt::Debug for HarvestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarvestConfig")
            .field("url", &self.url)
            .field("token", &Redacted(&self.token))
            .field("account", &self.account)
            .finish()
    }
}

/// Harvest identifies everything with integers.
#[derive(Debug, Deserialize)]
struct IntField {
    id: u64,
    name: String,
}

impl From<IntField> for Field {
    fn from(field: IntField) -> Self {
        Self::new(field.id.to_string(), field.name)
    }
}

#[derive(Debug, Deserialize)]
struct FetchEntry {
    client: IntField,
    project: IntField,
    task: IntField,
    #[serde(default)]
    notes: Option<String>,
    spent_date: String,
    hours: f64,
    created_at: String,
    billable: bool,
}

impl FetchEntry {
    /// Harvest logs against a day, not a time. The time of day is taken from
    /// the creation timestamp so entries keep a stable start.
    fn start(&self) -> Result<DateTime<FixedOffset>, ClientError> {
        let day = NaiveDate::parse_from_str(&self.spent_date, "%Y-%m-%d").map_err(|err| {
            ClientError::InvalidResponse(format!("invalid spent_date `{}`: {err}", self.spent_date))
        })?;
        let created = parse_timestamp(&self.created_at)?;
        day.and_time(created.time())
            .and_local_timezone(*created.offset())
            .single()
            .ok_or_else(|| ClientError::InvalidResponse("ambiguous start time".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct FetchResponse {
    time_entries: Vec<FetchEntry>,
    per_page: Option<usize>,
    total_entries: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct HarvestClient {
    http: HttpClient,
}

impl HarvestClient {
    pub fn new(config: &HarvestConfig, timeout: Duration) -> Result<Self, ConfigError> {
        if config.account.trim().is_empty() {
            return Err(ConfigError::MissingOption {
                section: SECTION,
                option: "account",
            });
        }
        let auth = Auth::token(None, Some("Bearer"), config.token.as_str())?;
        let http = HttpClient::new(SECTION, &config.url, auth, timeout)?
            .with_header("Harvest-Account-ID", config.account.as_str());
        Ok(Self { http })
    }

    async fn fetch_page(
        &self,
        opts: &FetchOpts,
        request: PageRequest,
    ) -> Result<(Vec<FetchEntry>, PageMeta), ClientError> {
        let mut params = vec![
            ("from", format_time(opts.start)),
            ("to", format_time(opts.end)),
            ("is_running", "false".to_string()),
            ("page", request.page.to_string()),
            ("per_page", request.page_size.to_string()),
            ("user_agent", USER_AGENT.to_string()),
        ];
        if !opts.user.is_empty() {
            params.push(("user_id", opts.user.clone()));
        }

        let body = self.http.get(self.http.url("/v2/time_entries", &params)?).await?;
        let response: FetchResponse = serde_json::from_str(&body)?;
        let meta = PageMeta {
            entries_per_page: response.per_page,
            total_entries: response.total_entries,
        };
        Ok((response.time_entries, meta))
    }
}

fn format_time(time: DateTime<FixedOffset>) -> String {
    time.with_timezone(&Utc).format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn parse_entries(fetched: Vec<FetchEntry>) -> Result<Vec<Entry>, ClientError> {
    fetched
        .into_iter()
        .map(|item| -> Result<Entry, ClientError> {
            let start = item.start()?;
            let spent = Duration::try_from_secs_f64(item.hours * 3600.0).map_err(|err| {
                ClientError::InvalidResponse(format!("invalid hours {}: {err}", item.hours))
            })?;
            let (billable, unbillable) = billability(spent, item.billable);
            let notes = item.notes.unwrap_or_default();

            Ok(Entry {
                client: item.client.into(),
                project: item.project.into(),
                task: item.task.into(),
                summary: notes.clone(),
                notes,
                start: Some(start),
                billable,
                unbillable,
            })
        })
        .collect()
}

#[async_trait]
impl Fetcher for HarvestClient {
    fn name(&self) -> &'static str {
        SECTION
    }

    async fn fetch(&self, opts: &FetchOpts) -> Result<Vec<Entry>, FetchError> {
        let paging = PaginateOpts {
            page_size: DEFAULT_MAX_PAGE_SIZE,
            ..PaginateOpts::default()
        };
        paginated_fetch(
            &paging,
            move |request| self.fetch_page(opts, request),
            parse_entries,
        )
        .await
    }
}
