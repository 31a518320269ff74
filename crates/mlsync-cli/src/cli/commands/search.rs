//! `mlsync search` – one logical search.

use anyhow::{Context, Result};
use mlsync_core::api::{RequestMode, SearchQuery};
use mlsync_core::config::MlsyncConfig;
use mlsync_core::control::CancelToken;

use super::build_client;

#[derive(Debug)]
pub struct SearchArgs {
    pub query: String,
    pub category: Option<String>,
    pub seller: Option<String>,
    pub offset: u32,
    pub limit: u32,
}

pub async fn run_search(cfg: &MlsyncConfig, mode: RequestMode, args: SearchArgs) -> Result<()> {
    let query = SearchQuery {
        query: args.query,
        category: args.category,
        seller_id: args.seller,
        offset: args.offset,
        limit: args.limit,
    };
    let client = build_client(cfg, mode);
    let page = tokio::task::spawn_blocking(move || client.search(&query, &CancelToken::new()))
        .await
        .context("search task panicked")??;

    println!(
        "total: {}  offset: {}  returned: {}",
        page.paging.total,
        page.paging.offset,
        page.results.len()
    );
    for row in &page.results {
        println!(
            "{:<16} {}",
            row.id.as_deref().unwrap_or("-"),
            row.title.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
