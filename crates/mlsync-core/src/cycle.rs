//! One fetch cycle: search jobs, pagination, item details, mapping, storage.
//!
//! API calls are blocking and run on the blocking pool; storage is async and
//! happens after each page is fetched, never while a request is in flight.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::{ItemDetail, MarketClient, SearchPage, SearchQuery};
use crate::config::FetchConfig;
use crate::control::CancelToken;
use crate::mapper::{map_item, ListingRecord, MapContext};
use crate::retry::{ApiError, ErrorKind};
use crate::store::{unix_timestamp, ListingStore, SearchRun, SearchRunStatus};

/// Query used for filter-only searches (category or seller).
const MATCH_ALL: &str = "*";

/// One independent search to paginate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchJob {
    /// Human-readable name for logs and summaries (`keyword:iphone`).
    pub label: String,
    pub query: SearchQuery,
}

#[derive(Debug, Clone)]
pub struct FetchPlan {
    pub jobs: Vec<SearchJob>,
    pub page_size: u32,
    pub max_pages: u32,
    pub call_item_details: bool,
}

impl FetchPlan {
    /// One job per keyword, plus a match-all job per category and per seller.
    pub fn from_config(cfg: &FetchConfig) -> Self {
        let page_size = cfg.page_size.max(1);
        let job = |label: String, query: SearchQuery| SearchJob {
            label,
            query: SearchQuery {
                limit: page_size,
                ..query
            },
        };

        let mut jobs = Vec::new();
        for keyword in &cfg.keywords {
            jobs.push(job(format!("keyword:{}", keyword), SearchQuery::new(keyword.as_str())));
        }
        for category in &cfg.categories {
            jobs.push(job(
                format!("category:{}", category),
                SearchQuery {
                    category: Some(category.clone()),
                    ..SearchQuery::new(MATCH_ALL)
                },
            ));
        }
        for seller in &cfg.seller_ids {
            jobs.push(job(
                format!("seller:{}", seller),
                SearchQuery {
                    seller_id: Some(seller.clone()),
                    ..SearchQuery::new(MATCH_ALL)
                },
            ));
        }

        Self {
            jobs,
            page_size,
            max_pages: cfg.max_pages,
            call_item_details: cfg.call_item_details,
        }
    }
}

/// A job that ended on a terminal error.
#[derive(Debug, Clone)]
pub struct JobFailure {
    pub label: String,
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub detail: String,
}

#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub pages_fetched: u32,
    pub items_fetched: u32,
    pub detail_failures: u32,
    pub mapping_failures: u32,
    pub records_mapped: u32,
    pub records_upserted: u64,
    pub failed_jobs: Vec<JobFailure>,
    pub cancelled: bool,
    /// A request ended in `Forbidden`; remaining jobs were not started.
    pub blocked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobEnd {
    Completed,
    Failed,
    Blocked,
    Cancelled,
}

struct JobReport {
    end: JobEnd,
    pages: u32,
    items: u32,
    error: Option<ApiError>,
}

impl JobReport {
    fn new() -> Self {
        Self {
            end: JobEnd::Completed,
            pages: 0,
            items: 0,
            error: None,
        }
    }

    fn finish(mut self, end: JobEnd, error: Option<ApiError>) -> Self {
        self.end = end;
        self.error = error;
        self
    }

    fn status(&self) -> SearchRunStatus {
        match self.end {
            JobEnd::Completed => SearchRunStatus::Completed,
            JobEnd::Failed => SearchRunStatus::Failed,
            JobEnd::Blocked => SearchRunStatus::Blocked,
            JobEnd::Cancelled => SearchRunStatus::Cancelled,
        }
    }
}

/// Run every job of `plan` once. Failed jobs are recorded, not retried.
///
/// A terminal `Forbidden` on any request stops the cycle: the upstream is
/// blocking automated traffic and further jobs would only hit the same wall.
pub async fn run_fetch_cycle(
    client: Arc<MarketClient>,
    plan: &FetchPlan,
    ctx: &MapContext,
    store: Option<&ListingStore>,
    cancel: &CancelToken,
) -> Result<CycleSummary> {
    let mut summary = CycleSummary::default();
    if plan.jobs.is_empty() {
        tracing::warn!("fetch plan has no keywords, categories or sellers");
    }

    for (index, job) in plan.jobs.iter().enumerate() {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }
        tracing::info!(job = %job.label, "search job started");
        let started_at = unix_timestamp();
        let report = run_job(&client, plan, job, ctx, store, cancel, &mut summary).await?;
        if let Some(e) = &report.error {
            summary.failed_jobs.push(JobFailure {
                label: job.label.clone(),
                kind: e.kind,
                status: e.status,
                detail: e.detail.clone(),
            });
        }
        if let Some(store) = store {
            store
                .record_search_run(&SearchRun {
                    job_label: job.label.clone(),
                    status: report.status(),
                    pages: report.pages,
                    items: report.items,
                    http_status: report.error.as_ref().and_then(|e| e.status),
                    error_kind: report.error.as_ref().map(|e| e.kind.as_str().to_string()),
                    error_detail: report.error.as_ref().map(|e| e.detail.clone()),
                    started_at,
                    finished_at: unix_timestamp(),
                })
                .await?;
        }

        match report.end {
            JobEnd::Completed | JobEnd::Failed => {}
            JobEnd::Blocked => {
                summary.blocked = true;
                tracing::warn!(
                    job = %job.label,
                    skipped_jobs = plan.jobs.len() - index - 1,
                    "upstream is blocking requests; pausing the rest of the cycle"
                );
                break;
            }
            JobEnd::Cancelled => {
                summary.cancelled = true;
                break;
            }
        }
    }

    tracing::info!(
        pages = summary.pages_fetched,
        items = summary.items_fetched,
        mapped = summary.records_mapped,
        upserted = summary.records_upserted,
        failed_jobs = summary.failed_jobs.len(),
        cancelled = summary.cancelled,
        blocked = summary.blocked,
        "fetch cycle finished"
    );
    Ok(summary)
}

/// Offset of the `page_index`-th page, or `None` once it no longer fits the
/// API's offset parameter.
fn page_offset(page_index: u32, page_size: u32) -> Option<u32> {
    page_index.checked_mul(page_size)
}

async fn run_job(
    client: &Arc<MarketClient>,
    plan: &FetchPlan,
    job: &SearchJob,
    ctx: &MapContext,
    store: Option<&ListingStore>,
    cancel: &CancelToken,
    summary: &mut CycleSummary,
) -> Result<JobReport> {
    let mut report = JobReport::new();
    for page_index in 0..plan.max_pages {
        let Some(offset) = page_offset(page_index, plan.page_size) else {
            tracing::warn!(job = %job.label, page_index, page_size = plan.page_size, "page offset overflows; paging stopped");
            break;
        };
        let query = SearchQuery {
            offset,
            ..job.query.clone()
        };

        let page = match search_page(client, query, cancel).await? {
            Ok(page) => page,
            Err(e) if e.kind == ErrorKind::Cancelled => return Ok(report.finish(JobEnd::Cancelled, None)),
            Err(e) => {
                tracing::warn!(
                    job = %job.label,
                    offset,
                    kind = %e.kind,
                    status = e.status,
                    transient = e.kind.is_transient(),
                    "search job failed"
                );
                let end = if e.kind == ErrorKind::Forbidden {
                    JobEnd::Blocked
                } else {
                    JobEnd::Failed
                };
                return Ok(report.finish(end, Some(e)));
            }
        };
        summary.pages_fetched += 1;
        report.pages += 1;
        if page.results.is_empty() {
            break;
        }

        let payloads = if plan.call_item_details {
            let ids: Vec<String> = page.item_ids().into_iter().map(str::to_string).collect();
            let (details, details_end) = fetch_details(client, ids, cancel).await?;
            summary.detail_failures += details.iter().filter(|d| d.is_none()).count() as u32;
            let payloads: Vec<_> = details.into_iter().flatten().map(|d| d.raw).collect();
            match details_end {
                DetailsEnd::Complete => payloads,
                DetailsEnd::Cancelled => {
                    report.items += payloads.len() as u32;
                    store_page(job, &payloads, ctx, store, summary).await?;
                    return Ok(report.finish(JobEnd::Cancelled, None));
                }
                DetailsEnd::Blocked(e) => {
                    report.items += payloads.len() as u32;
                    store_page(job, &payloads, ctx, store, summary).await?;
                    return Ok(report.finish(JobEnd::Blocked, Some(e)));
                }
            }
        } else {
            page.results.iter().map(|r| r.raw.clone()).collect()
        };
        report.items += payloads.len() as u32;
        store_page(job, &payloads, ctx, store, summary).await?;

        let next_offset = u64::from(offset) + u64::from(plan.page_size);
        if next_offset >= page.paging.total {
            break;
        }
    }
    Ok(report)
}

async fn search_page(
    client: &Arc<MarketClient>,
    query: SearchQuery,
    cancel: &CancelToken,
) -> Result<Result<SearchPage, ApiError>> {
    let client = Arc::clone(client);
    let cancel = cancel.clone();
    tokio::task::spawn_blocking(move || client.search(&query, &cancel))
        .await
        .context("search task panicked")
}

enum DetailsEnd {
    Complete,
    Cancelled,
    Blocked(ApiError),
}

/// Details for each id, `None` where the fetch failed. Stops early on
/// cancellation or on a `Forbidden` block.
async fn fetch_details(
    client: &Arc<MarketClient>,
    ids: Vec<String>,
    cancel: &CancelToken,
) -> Result<(Vec<Option<ItemDetail>>, DetailsEnd)> {
    let client = Arc::clone(client);
    let cancel = cancel.clone();
    tokio::task::spawn_blocking(move || {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match client.item_detail(&id, &cancel) {
                Ok(detail) => out.push(Some(detail)),
                Err(e) if e.kind == ErrorKind::Cancelled => return (out, DetailsEnd::Cancelled),
                Err(e) if e.kind == ErrorKind::Forbidden => {
                    tracing::warn!(item = %id, status = e.status, "item detail blocked");
                    return (out, DetailsEnd::Blocked(e));
                }
                Err(e) => {
                    tracing::warn!(item = %id, kind = %e.kind, status = e.status, "item detail skipped");
                    out.push(None);
                }
            }
        }
        (out, DetailsEnd::Complete)
    })
    .await
    .context("item detail task panicked")
}

async fn store_page(
    job: &SearchJob,
    payloads: &[serde_json::Value],
    ctx: &MapContext,
    store: Option<&ListingStore>,
    summary: &mut CycleSummary,
) -> Result<()> {
    summary.items_fetched += payloads.len() as u32;
    let mut records: Vec<ListingRecord> = Vec::with_capacity(payloads.len());
    for payload in payloads {
        match map_item(payload, ctx) {
            Ok(rec) => records.push(rec),
            Err(e) => {
                summary.mapping_failures += 1;
                tracing::debug!(job = %job.label, error = %e, "payload not mapped");
            }
        }
    }
    summary.records_mapped += records.len() as u32;
    if let Some(store) = store {
        summary.records_upserted += store.upsert_listings(&records).await?;
    }
    Ok(())
}
