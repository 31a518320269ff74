//! CLI for the mlsync marketplace listing fetcher.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use mlsync_core::api::RequestMode;
use mlsync_core::config;

use commands::{
    run_config, run_fetch, run_item, run_listings, run_runs, run_search, FetchArgs, SearchArgs,
};

/// Top-level CLI for mlsync.
#[derive(Debug, Parser)]
#[command(name = "mlsync")]
#[command(about = "mlsync: resilient marketplace listing fetcher", long_about = None)]
pub struct Cli {
    /// How the bearer token is used for API calls.
    #[arg(long, global = true, value_enum, default_value_t = ModeArg::Fallback)]
    pub mode: ModeArg,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Always send the token.
    Authenticated,
    /// Send the token; on 403 retry once without it.
    Fallback,
    /// Never send a token.
    Anonymous,
}

impl From<ModeArg> for RequestMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Authenticated => RequestMode::Authenticated,
            ModeArg::Fallback => RequestMode::AnonymousFallbackAllowed,
            ModeArg::Anonymous => RequestMode::Anonymous,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run one fetch cycle over the configured keywords, categories and sellers.
    Fetch {
        /// Search keyword (repeatable). Replaces the configured keywords.
        #[arg(long = "keyword", value_name = "K")]
        keywords: Vec<String>,
        /// Category id (repeatable). Replaces the configured categories.
        #[arg(long = "category", value_name = "C")]
        categories: Vec<String>,
        /// Seller id (repeatable). Replaces the configured sellers.
        #[arg(long = "seller", value_name = "S")]
        sellers: Vec<String>,
        #[arg(long, value_name = "N")]
        max_pages: Option<u32>,
        #[arg(long, value_name = "N")]
        page_size: Option<u32>,
        /// Fetch each item's detail instead of mapping search rows.
        #[arg(long)]
        details: bool,
        /// Map search rows directly, without item-detail requests.
        #[arg(long, conflicts_with = "details")]
        no_details: bool,
        /// Cancel outstanding work after N seconds.
        #[arg(long, value_name = "N")]
        deadline_secs: Option<u64>,
        /// Map only; do not write to the listing store.
        #[arg(long)]
        no_store: bool,
    },

    /// Run one search and print result ids.
    Search {
        query: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        seller: Option<String>,
        #[arg(long, default_value = "0")]
        offset: u32,
        #[arg(long, default_value = "50")]
        limit: u32,
    },

    /// Fetch one item and print its JSON.
    Item {
        /// Item identifier (e.g. MLM123456789).
        id: String,
    },

    /// Show stored listings, most recently updated first.
    Listings {
        #[arg(long, default_value = "20", value_name = "N")]
        limit: u32,
    },

    /// Show recorded search runs, newest first.
    Runs {
        #[arg(long, default_value = "20", value_name = "N")]
        limit: u32,
    },

    /// Print the effective configuration (secrets masked).
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        cfg.apply_env(|key| std::env::var(key).ok())?;
        tracing::debug!("loaded config: {:?}", cfg);
        let mode = RequestMode::from(cli.mode);

        match cli.command {
            CliCommand::Fetch {
                keywords,
                categories,
                sellers,
                max_pages,
                page_size,
                details,
                no_details,
                deadline_secs,
                no_store,
            } => {
                let args = FetchArgs {
                    keywords,
                    categories,
                    sellers,
                    max_pages,
                    page_size,
                    details: FetchArgs::details_flag(details, no_details),
                    deadline_secs,
                    no_store,
                };
                run_fetch(&cfg, mode, args).await?
            }
            CliCommand::Search {
                query,
                category,
                seller,
                offset,
                limit,
            } => {
                let args = SearchArgs {
                    query,
                    category,
                    seller,
                    offset,
                    limit,
                };
                run_search(&cfg, mode, args).await?
            }
            CliCommand::Item { id } => run_item(&cfg, mode, &id).await?,
            CliCommand::Listings { limit } => run_listings(limit).await?,
            CliCommand::Runs { limit } => run_runs(limit).await?,
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
