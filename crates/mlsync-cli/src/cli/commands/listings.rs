//! `mlsync listings` – show stored listings.

use anyhow::Result;
use mlsync_core::store::ListingStore;

pub async fn run_listings(limit: u32) -> Result<()> {
    let store = ListingStore::open_default().await?;
    let rows = store.list_recent(limit).await?;
    if rows.is_empty() {
        println!("No listings stored.");
        return Ok(());
    }
    println!(
        "{:<16} {:<4} {:>12} {:<4} {:>10} {}",
        "ITEM", "MKT", "PRICE", "CUR", "USD", "TITLE"
    );
    for row in rows {
        let r = row.record;
        let usd = r
            .price_usd
            .map(|p| format!("{:.2}", p))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {:<4} {:>12.2} {:<4} {:>10} {}",
            r.channel_item_id, r.market, r.price_original, r.currency_original, usd, r.title
        );
    }
    println!("total stored: {}", store.count().await?);
    Ok(())
}
