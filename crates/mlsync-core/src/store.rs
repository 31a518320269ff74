//! Persistent listing store (SQLite via sqlx).
//!
//! One row per `(channel, market, channel_item_id)`; re-fetching an item
//! updates its row in place. Each search job of a fetch cycle also leaves
//! one `search_runs` row.

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::mapper::ListingRecord;

/// Stored listing plus bookkeeping timestamps (Unix seconds).
#[derive(Debug, Clone, PartialEq)]
pub struct StoredListing {
    pub record: ListingRecord,
    pub first_seen_at: i64,
    pub updated_at: i64,
}

/// Outcome of one search job, stored as a string in `search_runs.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchRunStatus {
    Completed,
    Failed,
    /// Ended on an anti-automation block; the rest of the cycle was skipped.
    Blocked,
    Cancelled,
}

impl SearchRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchRunStatus::Completed => "completed",
            SearchRunStatus::Failed => "failed",
            SearchRunStatus::Blocked => "blocked",
            SearchRunStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "completed" => SearchRunStatus::Completed,
            "blocked" => SearchRunStatus::Blocked,
            "cancelled" => SearchRunStatus::Cancelled,
            _ => SearchRunStatus::Failed,
        }
    }
}

/// Audit row for one search job. `error_detail` is already token-redacted.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRun {
    pub job_label: String,
    pub status: SearchRunStatus,
    pub pages: u32,
    pub items: u32,
    /// Last HTTP status seen by the failing request, if any.
    pub http_status: Option<u16>,
    pub error_kind: Option<String>,
    pub error_detail: Option<String>,
    pub started_at: i64,
    pub finished_at: i64,
}

/// Percent-encode a path for a sqlite:// URI.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Handle to the listing database at `~/.local/state/mlsync/listings.db`.
#[derive(Clone)]
pub struct ListingStore {
    pool: Pool<Sqlite>,
}

impl ListingStore {
    /// Open (or create) the default listing database and run migrations.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("mlsync")?;
        let db_path = xdg_dirs.get_state_home().join("mlsync").join("listings.db");
        Self::open_at(db_path).await
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub async fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect(&uri)
            .await?;
        let store = ListingStore { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "listing store opened");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS listings (
                channel TEXT NOT NULL,
                market TEXT NOT NULL,
                channel_item_id TEXT NOT NULL,
                title TEXT NOT NULL,
                seller_id TEXT,
                price_original REAL NOT NULL,
                currency_original TEXT NOT NULL,
                price_usd REAL,
                fx_rate_to_usd REAL,
                listing_timestamp TEXT,
                permalink TEXT,
                first_seen_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (channel, market, channel_item_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS search_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_label TEXT NOT NULL,
                status TEXT NOT NULL,
                pages INTEGER NOT NULL,
                items INTEGER NOT NULL,
                http_status INTEGER,
                error_kind TEXT,
                error_detail TEXT,
                started_at INTEGER NOT NULL,
                finished_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or update records in one transaction. Returns rows written.
    pub async fn upsert_listings(&self, records: &[ListingRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let now = unix_timestamp();
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for r in records {
            written += sqlx::query(
                r#"
                INSERT INTO listings (
                    channel, market, channel_item_id, title, seller_id,
                    price_original, currency_original, price_usd, fx_rate_to_usd,
                    listing_timestamp, permalink, first_seen_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
                ON CONFLICT (channel, market, channel_item_id) DO UPDATE SET
                    title = excluded.title,
                    seller_id = excluded.seller_id,
                    price_original = excluded.price_original,
                    currency_original = excluded.currency_original,
                    price_usd = excluded.price_usd,
                    fx_rate_to_usd = excluded.fx_rate_to_usd,
                    listing_timestamp = excluded.listing_timestamp,
                    permalink = excluded.permalink,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&r.channel)
            .bind(&r.market)
            .bind(&r.channel_item_id)
            .bind(&r.title)
            .bind(&r.seller_id)
            .bind(r.price_original)
            .bind(&r.currency_original)
            .bind(r.price_usd)
            .bind(r.fx_rate_to_usd)
            .bind(&r.listing_timestamp)
            .bind(&r.permalink)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit().await?;
        tracing::debug!(written, "listings upserted");
        Ok(written)
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM listings")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    /// Most recently updated listings first.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<StoredListing>> {
        let rows = sqlx::query(
            r#"
            SELECT channel, market, channel_item_id, title, seller_id,
                   price_original, currency_original, price_usd, fx_rate_to_usd,
                   listing_timestamp, permalink, first_seen_at, updated_at
            FROM listings
            ORDER BY updated_at DESC, channel_item_id ASC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| StoredListing {
                record: ListingRecord {
                    channel: row.get("channel"),
                    market: row.get("market"),
                    channel_item_id: row.get("channel_item_id"),
                    title: row.get("title"),
                    seller_id: row.get("seller_id"),
                    price_original: row.get("price_original"),
                    currency_original: row.get("currency_original"),
                    price_usd: row.get("price_usd"),
                    fx_rate_to_usd: row.get("fx_rate_to_usd"),
                    listing_timestamp: row.get("listing_timestamp"),
                    permalink: row.get("permalink"),
                },
                first_seen_at: row.get("first_seen_at"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }

    /// Append one search-run audit row. Returns its id.
    pub async fn record_search_run(&self, run: &SearchRun) -> Result<i64> {
        let id = sqlx::query(
            r#"
            INSERT INTO search_runs (
                job_label, status, pages, items, http_status,
                error_kind, error_detail, started_at, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&run.job_label)
        .bind(run.status.as_str())
        .bind(i64::from(run.pages))
        .bind(i64::from(run.items))
        .bind(run.http_status.map(i64::from))
        .bind(&run.error_kind)
        .bind(&run.error_detail)
        .bind(run.started_at)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        tracing::debug!(id, job = %run.job_label, status = run.status.as_str(), "search run recorded");
        Ok(id)
    }

    /// Newest search runs first.
    pub async fn list_search_runs(&self, limit: u32) -> Result<Vec<SearchRun>> {
        let rows = sqlx::query(
            r#"
            SELECT job_label, status, pages, items, http_status,
                   error_kind, error_detail, started_at, finished_at
            FROM search_runs
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let status: String = row.get("status");
                let pages: i64 = row.get("pages");
                let items: i64 = row.get("items");
                let http_status: Option<i64> = row.get("http_status");
                SearchRun {
                    job_label: row.get("job_label"),
                    status: SearchRunStatus::from_str(&status),
                    pages: u32::try_from(pages).unwrap_or(0),
                    items: u32::try_from(items).unwrap_or(0),
                    http_status: http_status.and_then(|s| u16::try_from(s).ok()),
                    error_kind: row.get("error_kind"),
                    error_detail: row.get("error_detail"),
                    started_at: row.get("started_at"),
                    finished_at: row.get("finished_at"),
                }
            })
            .collect())
    }
}

pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
/// In-memory store for tests (no disk I/O).
pub(crate) async fn open_memory() -> Result<ListingStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    let store = ListingStore { pool };
    store.migrate().await?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{map_item, MapContext};
    use serde_json::json;

    fn record(id: &str, price: f64) -> ListingRecord {
        map_item(
            &json!({"id": id, "title": "Monitor", "price": price}),
            &MapContext::new("MX"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn upsert_is_idempotent_per_key() {
        let store = open_memory().await.unwrap();
        store
            .upsert_listings(&[record("MLM1", 100.0), record("MLM2", 200.0)])
            .await
            .unwrap();
        store.upsert_listings(&[record("MLM1", 90.0)]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let rows = store.list_recent(10).await.unwrap();
        let first = rows
            .iter()
            .find(|r| r.record.channel_item_id == "MLM1")
            .unwrap();
        assert_eq!(first.record.price_original, 90.0);
        assert_eq!(first.record.currency_original, "MXN");
        assert!(first.updated_at >= first.first_seen_at);
    }

    #[tokio::test]
    async fn same_id_in_other_market_is_separate() {
        let store = open_memory().await.unwrap();
        let mut ar = record("MLM1", 1.0);
        ar.market = "AR".to_string();
        store
            .upsert_listings(&[record("MLM1", 1.0), ar])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_batch_writes_nothing() {
        let store = open_memory().await.unwrap();
        assert_eq!(store.upsert_listings(&[]).await.unwrap(), 0);
        assert!(store.list_recent(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_runs_are_listed_newest_first() {
        let store = open_memory().await.unwrap();
        let ok = SearchRun {
            job_label: "keyword:tv".to_string(),
            status: SearchRunStatus::Completed,
            pages: 2,
            items: 3,
            http_status: None,
            error_kind: None,
            error_detail: None,
            started_at: 100,
            finished_at: 105,
        };
        let blocked = SearchRun {
            job_label: "keyword:radio".to_string(),
            status: SearchRunStatus::Blocked,
            pages: 0,
            items: 0,
            http_status: Some(403),
            error_kind: Some("forbidden".to_string()),
            error_detail: Some("HTTP 403".to_string()),
            started_at: 106,
            finished_at: 110,
        };
        let first = store.record_search_run(&ok).await.unwrap();
        let second = store.record_search_run(&blocked).await.unwrap();
        assert!(second > first);

        let runs = store.list_search_runs(10).await.unwrap();
        assert_eq!(runs, vec![blocked, ok]);
        assert_eq!(store.list_search_runs(1).await.unwrap().len(), 1);
    }

    #[test]
    fn unknown_status_reads_as_failed() {
        assert_eq!(SearchRunStatus::from_str("blocked"), SearchRunStatus::Blocked);
        assert_eq!(SearchRunStatus::from_str("dead"), SearchRunStatus::Failed);
    }

    #[tokio::test]
    async fn open_at_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested dir").join("listings.db");
        let store = ListingStore::open_at(&path).await.unwrap();
        store.upsert_listings(&[record("MLM7", 7.0)]).await.unwrap();
        drop(store);
        assert!(path.exists());

        let reopened = ListingStore::open_at(&path).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
