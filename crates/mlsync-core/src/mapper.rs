//! Field mapping from raw marketplace item JSON to stored listing records.
//!
//! Pure functions only; nothing here touches the network or the store.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Channel name stamped on every record.
pub const CHANNEL: &str = "mercadolibre";

const DEFAULT_CURRENCY: &str = "MXN";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapError {
    #[error("item payload is not a JSON object")]
    NotAnObject,
    #[error("blocked payload (HTTP 403) cannot be mapped")]
    Blocked,
    #[error("item payload has no id or item_id")]
    MissingId,
    #[error("fx rate to USD must be > 0, got {0}")]
    InvalidFxRate(f64),
}

/// Per-cycle mapping inputs.
#[derive(Debug, Clone)]
pub struct MapContext {
    pub market: String,
    pub fx_rate_to_usd: Option<f64>,
}

impl MapContext {
    pub fn new(market: impl Into<String>) -> Self {
        Self {
            market: market.into(),
            fx_rate_to_usd: None,
        }
    }

    pub fn with_fx_rate(mut self, rate: f64) -> Self {
        self.fx_rate_to_usd = Some(rate);
        self
    }
}

/// One listing row, keyed by `(channel, market, channel_item_id)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingRecord {
    pub channel: String,
    pub market: String,
    pub channel_item_id: String,
    pub title: String,
    pub seller_id: Option<String>,
    pub price_original: f64,
    pub currency_original: String,
    pub price_usd: Option<f64>,
    pub fx_rate_to_usd: Option<f64>,
    pub listing_timestamp: Option<String>,
    pub permalink: Option<String>,
}

/// Map a search row or item payload into a [`ListingRecord`].
pub fn map_item(item: &Value, ctx: &MapContext) -> Result<ListingRecord, MapError> {
    let obj = item.as_object().ok_or(MapError::NotAnObject)?;

    if obj.get("http_status").and_then(Value::as_i64) == Some(403) {
        return Err(MapError::Blocked);
    }

    let id = text(obj.get("id"))
        .or_else(|| text(obj.get("item_id")))
        .ok_or(MapError::MissingId)?;

    let fx = match ctx.fx_rate_to_usd {
        Some(rate) if rate > 0.0 && rate.is_finite() => Some(rate),
        Some(rate) => return Err(MapError::InvalidFxRate(rate)),
        None => None,
    };

    let price = obj.get("price").map(safe_price).unwrap_or(0.0);
    let market = if ctx.market.trim().is_empty() {
        "MX".to_string()
    } else {
        ctx.market.trim().to_uppercase()
    };
    let seller_id = text(obj.get("seller_id"))
        .or_else(|| obj.get("seller").and_then(|s| text(s.get("id"))));

    Ok(ListingRecord {
        channel: CHANNEL.to_string(),
        market,
        channel_item_id: id,
        title: text(obj.get("title")).unwrap_or_default(),
        seller_id,
        price_original: price,
        currency_original: text(obj.get("currency_id")).unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        price_usd: fx.map(|rate| price * rate),
        fx_rate_to_usd: fx,
        listing_timestamp: text(obj.get("date_created")),
        permalink: text(obj.get("permalink")),
    })
}

/// Non-empty string, or a number rendered as one.
fn text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numbers and numeric strings; anything else is 0.
fn safe_price(v: &Value) -> f64 {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|p| p.is_finite()).unwrap_or(0.0)
}
