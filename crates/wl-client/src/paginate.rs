//! Uniform retrieval from paginated APIs.
//!
//! Sources differ in how they describe pages, so the loop is parameterized by
//! a fetch function (one request per page) and a parse function (raw payload
//! to entries). Pages are requested strictly one after another.

use std::future::Future;

use tracing::{debug, warn};
use wl_core::Entry;

use crate::error::{ClientError, FetchError};

/// Page size requested when the caller does not pick one. Most APIs accept it.
pub const DEFAULT_PAGE_SIZE: usize = 50;
/// Largest page size commonly accepted by sources.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 250;
/// Upper bound on requests for sources that never report a total.
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// The page a fetch function is asked for. Pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

/// Pagination details reported alongside a page, when the source knows them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub entries_per_page: Option<usize>,
    pub total_entries: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginateOpts {
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for PaginateOpts {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// Fetches every page and returns the parsed entries.
///
/// Stops on the first page that parses to no entries, or once the reported
/// total has been covered. Any fetch or parse error aborts the whole fetch and
/// discards what was collected so far. Exceeding `max_pages` is an error.
pub async fn paginated_fetch<R, F, Fut, P>(
    opts: &PaginateOpts,
    mut fetch_page: F,
    mut parse_page: P,
) -> Result<Vec<Entry>, FetchError>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<(R, PageMeta), ClientError>>,
    P: FnMut(R) -> Result<Vec<Entry>, ClientError>,
{
    let mut entries = Vec::new();
    let mut page_size = if opts.page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        opts.page_size
    };

    for page in 1..=opts.max_pages {
        let (raw, meta) = fetch_page(PageRequest { page, page_size }).await?;
        let parsed = parse_page(raw)?;

        debug!(page, fetched = parsed.len(), ?meta, "fetched page");

        if parsed.is_empty() {
            return Ok(entries);
        }
        entries.extend(parsed);

        if let Some(per_page) = meta.entries_per_page.filter(|n| *n > 0) {
            page_size = per_page;
        }
        if meta
            .total_entries
            .is_some_and(|total| total <= page_size.saturating_mul(page))
        {
            return Ok(entries);
        }
    }

    warn!(max_pages = opts.max_pages, "pagination did not terminate");
    Err(ClientError::PageLimit(opts.max_pages).into())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use wl_core::Field;

    use super::*;

    fn stub_entries(total: usize) -> Vec<Entry> {
        (0..total)
            .map(|i| Entry {
                summary: format!("entry {i}"),
                task: Field::named(format!("TASK-{i}")),
                ..Entry::default()
            })
            .collect()
    }

    fn page_of(data: &[Entry], request: PageRequest) -> Vec<Entry> {
        let start = (request.page - 1) * request.page_size;
        let end = (start + request.page_size).min(data.len());
        data.get(start..end).map(<[Entry]>::to_vec).unwrap_or_default()
    }

    async fn run_with_totals(total: usize, page_size: usize) -> (usize, Vec<Entry>) {
        let data = stub_entries(total);
        let calls = Cell::new(0);
        let opts = PaginateOpts {
            page_size,
            ..PaginateOpts::default()
        };

        let entries = paginated_fetch(
            &opts,
            |request| {
                calls.set(calls.get() + 1);
                let page = page_of(&data, request);
                async move {
                    let meta = PageMeta {
                        entries_per_page: Some(page_size),
                        total_entries: Some(total),
                    };
                    Ok((page, meta))
                }
            },
            Ok,
        )
        .await
        .unwrap();

        (calls.get(), entries)
    }

    #[tokio::test]
    async fn known_total_issues_ceil_total_over_page_size_calls() {
        for (total, page_size) in [(1, 50), (49, 50), (50, 50), (51, 50), (123, 10), (7, 1)] {
            let (calls, entries) = run_with_totals(total, page_size).await;
            assert_eq!(calls, total.div_ceil(page_size), "total={total} size={page_size}");
            assert_eq!(entries.len(), total);
        }
    }

    #[tokio::test]
    async fn entries_are_returned_in_page_order() {
        let (_, entries) = run_with_totals(5, 2).await;
        let summaries: Vec<&str> = entries.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(summaries, ["entry 0", "entry 1", "entry 2", "entry 3", "entry 4"]);
    }

    #[tokio::test]
    async fn unknown_total_stops_on_empty_page() {
        let data = stub_entries(7);
        let calls = Cell::new(0);
        let opts = PaginateOpts {
            page_size: 3,
            ..PaginateOpts::default()
        };

        let entries = paginated_fetch(
            &opts,
            |request| {
                calls.set(calls.get() + 1);
                let page = page_of(&data, request);
                async move { Ok((page, PageMeta::default())) }
            },
            Ok,
        )
        .await
        .unwrap();

        assert_eq!(entries.len(), 7);
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn reported_page_size_overrides_requested_size() {
        let data = stub_entries(25);
        let requests = Cell::new(0);
        let opts = PaginateOpts {
            page_size: 50,
            ..PaginateOpts::default()
        };

        let entries = paginated_fetch(
            &opts,
            |request| {
                requests.set(requests.get() + 1);
                // The server ignores the requested size and serves 10 per page.
                let page = page_of(
                    &data,
                    PageRequest {
                        page: request.page,
                        page_size: 10,
                    },
                );
                async move {
                    let meta = PageMeta {
                        entries_per_page: Some(10),
                        total_entries: Some(25),
                    };
                    Ok((page, meta))
                }
            },
            Ok,
        )
        .await
        .unwrap();

        assert_eq!(entries.len(), 25);
        assert_eq!(requests.get(), 3);
    }

    #[tokio::test]
    async fn fetch_error_discards_partial_results() {
        let data = stub_entries(10);
        let opts = PaginateOpts {
            page_size: 2,
            ..PaginateOpts::default()
        };

        let result = paginated_fetch(
            &opts,
            |request| {
                let page = page_of(&data, request);
                async move {
                    if request.page == 3 {
                        Err(ClientError::Api {
                            status: 500,
                            body: "boom".to_string(),
                        })
                    } else {
                        Ok((page, PageMeta::default()))
                    }
                }
            },
            Ok,
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err.0, ClientError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn parse_error_aborts_fetch() {
        let opts = PaginateOpts::default();
        let result = paginated_fetch(
            &opts,
            |_| async { Ok(("not json", PageMeta::default())) },
            |raw: &str| {
                serde_json::from_str::<Vec<String>>(raw)?;
                Ok(Vec::new())
            },
        )
        .await;

        assert!(matches!(
            result.unwrap_err().0,
            ClientError::InvalidResponse(_)
        ));
    }

    #[tokio::test]
    async fn endless_source_hits_page_limit() {
        let calls = Cell::new(0);
        let opts = PaginateOpts {
            page_size: 1,
            max_pages: 5,
        };

        let result = paginated_fetch(
            &opts,
            |_| {
                calls.set(calls.get() + 1);
                async { Ok((stub_entries(1), PageMeta::default())) }
            },
            Ok,
        )
        .await;

        assert!(matches!(result.unwrap_err().0, ClientError::PageLimit(5)));
        assert_eq!(calls.get(), 5);
    }

    #[tokio::test]
    async fn empty_first_page_returns_nothing() {
        let opts = PaginateOpts::default();
        let entries = paginated_fetch(
            &opts,
            |_| async { Ok((Vec::new(), PageMeta::default())) },
            Ok,
        )
        .await
        .unwrap();
        assert!(entries.is_empty());
    }
}
