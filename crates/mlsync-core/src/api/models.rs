//! Typed views of search pages and item payloads.
//!
//! Only the fields the fetch cycle reads are typed; the raw JSON object is
//! kept alongside so the field mapper sees everything the server sent.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Paging {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
}

/// One page of `/sites/{site}/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub paging: Paging,
    #[serde(default)]
    pub results: Vec<ItemSummary>,
}

impl SearchPage {
    /// Ids of the rows that carry one, in page order.
    pub fn item_ids(&self) -> Vec<&str> {
        self.results.iter().filter_map(|r| r.id.as_deref()).collect()
    }
}

/// Search result row. Rows without an id are kept; the mapper rejects them.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "Value")]
pub struct ItemSummary {
    pub id: Option<String>,
    pub title: Option<String>,
    pub raw: Value,
}

impl TryFrom<Value> for ItemSummary {
    type Error = String;

    fn try_from(raw: Value) -> Result<Self, Self::Error> {
        if !raw.is_object() {
            return Err(format!("search result is not an object: {}", raw));
        }
        Ok(Self {
            id: string_field(&raw, "id"),
            title: string_field(&raw, "title"),
            raw,
        })
    }
}

/// `/items/{id}` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "Value")]
pub struct ItemDetail {
    pub id: String,
    pub raw: Value,
}

impl TryFrom<Value> for ItemDetail {
    type Error = String;

    fn try_from(raw: Value) -> Result<Self, Self::Error> {
        let id = string_field(&raw, "id").ok_or_else(|| "item payload has no id".to_string())?;
        Ok(Self { id, raw })
    }
}

/// Ids arrive as strings, but accept numbers too.
fn string_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
