use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::secret::mask_opt;

/// Vendor API base URL. Any other host is treated as an intermediate proxy.
pub const VENDOR_BASE_URL: &str = "https://api.mercadolibre.com";

/// Marketplace endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Vendor API or a backend proxy exposing the same paths.
    pub base_url: String,
    /// Site identifier used as the `/sites/{site_id}/search` path segment.
    pub site_id: String,
    /// Market code stamped on stored listings (e.g. "MX").
    pub market: String,
    /// Abort threshold for a single physical attempt.
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: VENDOR_BASE_URL.to_string(),
            site_id: "MLM".to_string(),
            market: "MX".to_string(),
            timeout_secs: 25,
            connect_timeout_secs: 10,
        }
    }
}

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Hard cap on charged physical attempts per logical operation (including the first).
    pub max_attempts: u32,
    /// Retries allowed for 403 before giving up (fast-fail on anti-automation blocks).
    pub forbidden_retries: u32,
    /// Base delay in seconds for exponential backoff.
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
    /// Fixed delay between 403 retries, in seconds.
    pub forbidden_delay_secs: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            forbidden_retries: 2,
            base_delay_secs: 1.0,
            max_delay_secs: 30,
            forbidden_delay_secs: 2.0,
        }
    }
}

/// Caller-level fetch cycle bounds and inputs. Not enforced by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub page_size: u32,
    pub max_pages: u32,
    /// Fetch `/items/{id}` for every search hit instead of mapping search rows directly.
    pub call_item_details: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub seller_ids: Vec<String>,
    /// Conversion rate used to fill the USD price of stored listings.
    #[serde(default)]
    pub fx_rate_to_usd: Option<f64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            max_pages: 10,
            call_item_details: true,
            keywords: Vec::new(),
            categories: Vec::new(),
            seller_ids: Vec::new(),
            fx_rate_to_usd: None,
        }
    }
}

/// Credential material. Seeds the token store; never written to the default file.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Shared secret sent as `X-Worker-Key` when routing through a proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_key: Option<String>,
}

impl Credentials {
    /// Every secret value present, for redaction of error details.
    pub fn secrets(&self) -> Vec<&str> {
        [
            &self.client_secret,
            &self.access_token,
            &self.refresh_token,
            &self.worker_key,
        ]
        .into_iter()
        .filter_map(|s| s.as_deref())
        .collect()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &mask_opt(&self.client_secret))
            .field("access_token", &mask_opt(&self.access_token))
            .field("refresh_token", &mask_opt(&self.refresh_token))
            .field("worker_key", &mask_opt(&self.worker_key))
            .finish()
    }
}

/// Direct vendor call vs. call through an intermediate backend proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Proxy,
}

/// Global configuration loaded from `~/.config/mlsync/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MlsyncConfig {
    #[serde(default)]
    pub api: ApiConfig,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub credentials: Credentials,
}

impl MlsyncConfig {
    pub fn retry_or_default(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.api.connect_timeout_secs)
    }

    /// Route implied by the base URL host.
    pub fn route(&self) -> Route {
        let vendor_host = url::Url::parse(VENDOR_BASE_URL)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        let host = url::Url::parse(&self.api.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string));
        match (host, vendor_host) {
            (Some(h), Some(v)) if h.eq_ignore_ascii_case(&v) => Route::Direct,
            _ => Route::Proxy,
        }
    }

    /// Apply environment overrides once, at explicit process init.
    /// `lookup` is injectable (`|k| std::env::var(k).ok()` in production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("MLSYNC_BASE_URL") {
            self.api.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("ML_SITE_ID") {
            self.api.site_id = v;
        }
        if let Some(v) = get("ML_MARKET") {
            self.api.market = v;
        }
        if let Some(v) = get("ML_TIMEOUT_SECONDS") {
            self.api.timeout_secs = v.parse().context("ML_TIMEOUT_SECONDS")?;
        }
        if let Some(v) = get("ML_LIMIT") {
            self.fetch.page_size = v.parse().context("ML_LIMIT")?;
        }
        if let Some(v) = get("ML_MAX_PAGES") {
            self.fetch.max_pages = v.parse().context("ML_MAX_PAGES")?;
        }
        if let Some(v) = get("ML_CALL_ITEMS_DETAIL") {
            self.fetch.call_item_details = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = get("ML_KEYWORDS") {
            self.fetch.keywords = parse_csv(&v);
        }
        if let Some(v) = get("ML_CATEGORIES") {
            self.fetch.categories = parse_csv(&v);
        }
        if let Some(v) = get("ML_SELLER_IDS") {
            self.fetch.seller_ids = parse_csv(&v);
        }
        if let Some(v) = get("ML_FX_RATE_TO_USD") {
            self.fetch.fx_rate_to_usd = Some(v.parse().context("ML_FX_RATE_TO_USD")?);
        }

        let creds = &mut self.credentials;
        for (key, slot) in [
            ("ML_CLIENT_ID", &mut creds.client_id),
            ("ML_CLIENT_SECRET", &mut creds.client_secret),
            ("ML_ACCESS_TOKEN", &mut creds.access_token),
            ("ML_REFRESH_TOKEN", &mut creds.refresh_token),
            ("WORKER_KEY", &mut creds.worker_key),
        ] {
            if let Some(v) = get(key) {
                *slot = Some(v);
            }
        }
        Ok(())
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mlsync")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MlsyncConfig> {
    load_or_init_at(&config_path()?)
}

pub fn load_or_init_at(path: &Path) -> Result<MlsyncConfig> {
    if !path.exists() {
        let default_cfg = MlsyncConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let cfg: MlsyncConfig =
        toml::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}
