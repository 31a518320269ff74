//! CLI command handlers, one per file.

mod config;
mod fetch;
mod item;
mod listings;
mod runs;
mod search;

pub use config::run_config;
pub use fetch::{run_fetch, FetchArgs};
pub use item::run_item;
pub use listings::run_listings;
pub use runs::run_runs;
pub use search::{run_search, SearchArgs};

use std::sync::Arc;

use mlsync_core::api::{MarketClient, Orchestrator, RequestMode};
use mlsync_core::auth::TokenStore;
use mlsync_core::config::MlsyncConfig;

/// Client wired from config: curl transport, OAuth refresher, shared token store.
pub(crate) fn build_client(cfg: &MlsyncConfig, mode: RequestMode) -> Arc<MarketClient> {
    let tokens = Arc::new(TokenStore::from_credentials(&cfg.credentials));
    let orch = Orchestrator::from_config(cfg, tokens);
    Arc::new(MarketClient::new(orch, mode))
}
