//! Logical operations and how they map onto endpoint URLs.

use url::Url;

use crate::retry::ApiError;

/// Parameters of one search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub query: String,
    pub category: Option<String>,
    pub seller_id: Option<String>,
    pub offset: u32,
    pub limit: u32,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            category: None,
            seller_id: None,
            offset: 0,
            limit: 50,
        }
    }
}

/// One caller-visible request; may take several physical attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Search(SearchQuery),
    ItemDetail(String),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Search(_) => "search",
            Operation::ItemDetail(_) => "item_detail",
        }
    }

    /// Target URL. Both the vendor API and the proxy expose these paths.
    pub fn url(&self, base_url: &str, site_id: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse(base_url)
            .map_err(|e| ApiError::malformed(format!("invalid base url {:?}: {}", base_url, e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ApiError::malformed(format!("base url {:?} cannot take a path", base_url)))?;
            segments.pop_if_empty();
            match self {
                Operation::Search(_) => {
                    segments.extend(["sites", site_id, "search"]);
                }
                Operation::ItemDetail(item_id) => {
                    segments.extend(["items", item_id.as_str()]);
                }
            }
        }
        if let Operation::Search(q) = self {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("q", &q.query);
            if let Some(category) = &q.category {
                pairs.append_pair("category", category);
            }
            if let Some(seller_id) = &q.seller_id {
                pairs.append_pair("seller_id", seller_id);
            }
            pairs.append_pair("offset", &q.offset.to_string());
            pairs.append_pair("limit", &q.limit.to_string());
        }
        Ok(url)
    }
}
