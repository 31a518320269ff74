//! Request headers attached to every marketplace call.

use crate::config::Route;
use crate::transport::HttpRequest;

/// Desktop browser identity; sent unconditionally to reduce anti-bot scoring.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

pub const WORKER_KEY_HEADER: &str = "X-Worker-Key";

/// Attach the browser-like header set, the proxy worker key (proxy route
/// only) and the bearer token when one is given.
pub fn decorate(
    request: HttpRequest,
    route: Route,
    worker_key: Option<&str>,
    bearer: Option<&str>,
) -> HttpRequest {
    let mut request = request
        .header("User-Agent", BROWSER_USER_AGENT)
        .header("Accept", "application/json, text/plain, */*")
        .header("Accept-Language", "es-MX,es;q=0.9,en;q=0.8")
        .header("Cache-Control", "no-cache");

    if let (Route::Proxy, Some(key)) = (route, worker_key) {
        request = request.header(WORKER_KEY_HEADER, key);
    }
    if let Some(token) = bearer {
        request = request.header("Authorization", format!("Bearer {}", token));
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_headers_always_present() {
        let req = decorate(HttpRequest::get("https://x/"), Route::Direct, None, None);
        assert_eq!(req.header_value("user-agent"), Some(BROWSER_USER_AGENT));
        assert!(req.header_value("accept").unwrap().starts_with("application/json"));
        assert!(req.header_value("authorization").is_none());
    }

    #[test]
    fn worker_key_only_through_proxy() {
        let direct = decorate(HttpRequest::get("https://x/"), Route::Direct, Some("wk"), None);
        assert!(direct.header_value(WORKER_KEY_HEADER).is_none());
        let proxied = decorate(HttpRequest::get("https://x/"), Route::Proxy, Some("wk"), None);
        assert_eq!(proxied.header_value(WORKER_KEY_HEADER), Some("wk"));
    }

    #[test]
    fn bearer_attached() {
        let req = decorate(HttpRequest::get("https://x/"), Route::Direct, None, Some("APP_USR-1"));
        assert_eq!(req.header_value("Authorization"), Some("Bearer APP_USR-1"));
    }
}
