//! Typed marketplace client on top of the orchestrator.

use serde::de::DeserializeOwned;

use crate::api::models::{ItemDetail, SearchPage};
use crate::api::operation::{Operation, SearchQuery};
use crate::api::orchestrator::{ApiResponse, Orchestrator, RequestMode};
use crate::control::CancelToken;
use crate::retry::{ApiError, ErrorKind};

pub struct MarketClient {
    orchestrator: Orchestrator,
    mode: RequestMode,
}

impl MarketClient {
    pub fn new(orchestrator: Orchestrator, mode: RequestMode) -> Self {
        Self { orchestrator, mode }
    }

    /// One page of search results.
    pub fn search(&self, query: &SearchQuery, cancel: &CancelToken) -> Result<SearchPage, ApiError> {
        let op = Operation::Search(query.clone());
        let resp = self.orchestrator.perform(&op, self.mode, cancel)?;
        decode(&op, &resp)
    }

    pub fn item_detail(&self, item_id: &str, cancel: &CancelToken) -> Result<ItemDetail, ApiError> {
        let op = Operation::ItemDetail(item_id.to_string());
        let resp = self.orchestrator.perform(&op, self.mode, cancel)?;
        decode(&op, &resp)
    }
}

fn decode<T: DeserializeOwned>(op: &Operation, resp: &ApiResponse) -> Result<T, ApiError> {
    serde_json::from_slice(&resp.body).map_err(|e| {
        tracing::warn!(op = op.name(), status = resp.status, error = %e, "undecodable response body");
        ApiError::new(
            ErrorKind::Malformed,
            Some(resp.status),
            format!("{} returned an undecodable body: {}", op.name(), e),
        )
        .with_attempts(resp.attempts.len() as u32)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::orchestrator::Endpoint;
    use crate::auth::{RefreshError, TokenGrant, TokenRefresher, TokenStore};
    use crate::config::Route;
    use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};
    use std::sync::Arc;

    struct Fixed(u16, &'static str);

    impl Transport for Fixed {
        fn send(&self, _: &HttpRequest) -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse::new(self.0, self.1))
        }
    }

    struct NoRefresh;

    impl TokenRefresher for NoRefresh {
        fn refresh(&self, _: &str) -> Result<TokenGrant, RefreshError> {
            Err(RefreshError::MissingCredentials("client_id"))
        }
    }

    fn client(status: u16, body: &'static str) -> MarketClient {
        let endpoint = Endpoint {
            base_url: "https://api.mercadolibre.com".to_string(),
            site_id: "MLM".to_string(),
            route: Route::Direct,
            worker_key: None,
        };
        let orch = Orchestrator::new(
            endpoint,
            Arc::new(Fixed(status, body)),
            Arc::new(TokenStore::anonymous()),
            Arc::new(NoRefresh),
        );
        MarketClient::new(orch, RequestMode::AnonymousFallbackAllowed)
    }

    #[test]
    fn search_decodes_page() {
        let c = client(200, r#"{"paging":{"total":1},"results":[{"id":"MLM9"}]}"#);
        let page = c.search(&SearchQuery::new("mouse"), &CancelToken::new()).unwrap();
        assert_eq!(page.item_ids(), vec!["MLM9"]);
    }

    #[test]
    fn undecodable_body_is_malformed() {
        let c = client(200, "<html>captcha</html>");
        let err = c.item_detail("MLM1", &CancelToken::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Malformed);
        assert_eq!(err.status, Some(200));
        assert_eq!(err.attempts, 1);
    }

    #[test]
    fn item_without_id_is_malformed() {
        let c = client(200, r#"{"title":"x"}"#);
        let err = c.item_detail("MLM1", &CancelToken::new()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Malformed);
    }
}
