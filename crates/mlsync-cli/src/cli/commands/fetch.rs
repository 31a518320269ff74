//! `mlsync fetch` – one fetch cycle (the scheduler's entry point).

use std::time::Duration;

use anyhow::Result;
use mlsync_core::api::RequestMode;
use mlsync_core::config::{FetchConfig, MlsyncConfig};
use mlsync_core::control::CancelToken;
use mlsync_core::cycle::{run_fetch_cycle, FetchPlan};
use mlsync_core::mapper::MapContext;
use mlsync_core::store::ListingStore;

use super::build_client;

#[derive(Debug, Default)]
pub struct FetchArgs {
    pub keywords: Vec<String>,
    pub categories: Vec<String>,
    pub sellers: Vec<String>,
    pub max_pages: Option<u32>,
    pub page_size: Option<u32>,
    /// `Some` overrides the configured `call_item_details`.
    pub details: Option<bool>,
    pub deadline_secs: Option<u64>,
    pub no_store: bool,
}

impl FetchArgs {
    /// Folds `--details` / `--no-details` into one override.
    pub fn details_flag(details: bool, no_details: bool) -> Option<bool> {
        match (details, no_details) {
            (true, _) => Some(true),
            (false, true) => Some(false),
            (false, false) => None,
        }
    }

    /// Configured fetch settings with command-line overrides applied.
    pub fn apply(&self, base: &FetchConfig) -> FetchConfig {
        let mut fetch = base.clone();
        if !self.keywords.is_empty() || !self.categories.is_empty() || !self.sellers.is_empty() {
            fetch.keywords = self.keywords.clone();
            fetch.categories = self.categories.clone();
            fetch.seller_ids = self.sellers.clone();
        }
        if let Some(n) = self.max_pages {
            fetch.max_pages = n;
        }
        if let Some(n) = self.page_size {
            fetch.page_size = n;
        }
        if let Some(details) = self.details {
            fetch.call_item_details = details;
        }
        fetch
    }
}

pub async fn run_fetch(cfg: &MlsyncConfig, mode: RequestMode, args: FetchArgs) -> Result<()> {
    let fetch = args.apply(&cfg.fetch);
    let plan = FetchPlan::from_config(&fetch);
    if plan.jobs.is_empty() {
        println!("Nothing to fetch: configure keywords, categories or seller ids.");
        return Ok(());
    }

    let mut ctx = MapContext::new(cfg.api.market.as_str());
    if let Some(rate) = fetch.fx_rate_to_usd {
        ctx = ctx.with_fx_rate(rate);
    }
    let store = if args.no_store {
        None
    } else {
        Some(ListingStore::open_default().await?)
    };

    let cancel = CancelToken::new();
    if let Some(secs) = args.deadline_secs {
        cancel.cancel_after(Duration::from_secs(secs));
    }

    let client = build_client(cfg, mode);
    let summary = run_fetch_cycle(client, &plan, &ctx, store.as_ref(), &cancel).await?;

    println!(
        "jobs: {}  pages: {}  items: {}  mapped: {}  stored: {}",
        plan.jobs.len(),
        summary.pages_fetched,
        summary.items_fetched,
        summary.records_mapped,
        summary.records_upserted
    );
    if summary.detail_failures > 0 || summary.mapping_failures > 0 {
        println!(
            "skipped: {} detail fetches, {} unmappable payloads",
            summary.detail_failures, summary.mapping_failures
        );
    }
    for failure in &summary.failed_jobs {
        println!("failed {}: {} ({})", failure.label, failure.kind, failure.detail);
    }
    if summary.blocked {
        println!("upstream blocked requests (HTTP 403); remaining jobs skipped");
    }
    if summary.cancelled {
        println!("cycle cancelled before completion");
    }
    Ok(())
}
