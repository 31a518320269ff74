//! `mlsync item` – print one item's JSON.

use anyhow::{Context, Result};
use mlsync_core::api::RequestMode;
use mlsync_core::config::MlsyncConfig;
use mlsync_core::control::CancelToken;

use super::build_client;

pub async fn run_item(cfg: &MlsyncConfig, mode: RequestMode, id: &str) -> Result<()> {
    let client = build_client(cfg, mode);
    let id = id.to_string();
    let item = tokio::task::spawn_blocking(move || client.item_detail(&id, &CancelToken::new()))
        .await
        .context("item task panicked")??;
    println!("{}", serde_json::to_string_pretty(&item.raw)?);
    Ok(())
}
