//! `mlsync config` – print the effective configuration.

use anyhow::Result;
use mlsync_core::config::{self, MlsyncConfig};
use mlsync_core::secret::redact;

pub fn run_config(cfg: &MlsyncConfig) -> Result<()> {
    println!("config file: {}", config::config_path()?.display());
    println!("route: {:?}", cfg.route());

    let mut shown = cfg.clone();
    shown.retry = Some(cfg.retry_or_default());
    let text = serde_json::to_string_pretty(&shown)?;
    println!("{}", redact(&text, cfg.credentials.secrets()));
    Ok(())
}
