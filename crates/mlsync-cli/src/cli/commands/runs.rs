//! `mlsync runs` – show the search-run audit log.

use anyhow::Result;
use mlsync_core::store::ListingStore;

pub async fn run_runs(limit: u32) -> Result<()> {
    let store = ListingStore::open_default().await?;
    let runs = store.list_search_runs(limit).await?;
    if runs.is_empty() {
        println!("No search runs recorded.");
        return Ok(());
    }
    println!(
        "{:<28} {:<10} {:>5} {:>6} {:>6} {}",
        "JOB", "STATUS", "PAGES", "ITEMS", "HTTP", "ERROR"
    );
    for run in runs {
        let http = run
            .http_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let error = match (&run.error_kind, &run.error_detail) {
            (Some(kind), Some(detail)) => format!("{}: {}", kind, detail),
            (Some(kind), None) => kind.clone(),
            _ => String::new(),
        };
        println!(
            "{:<28} {:<10} {:>5} {:>6} {:>6} {}",
            run.job_label,
            run.status.as_str(),
            run.pages,
            run.items,
            http,
            error
        );
    }
    Ok(())
}
