//! Skip filters.
//!
//! # Responsibilities
//! - Decide whether a request bypasses the relay and continues to the next handler
//! - Provide stock filters (non-upgrade requests, path prefixes) and composition
//!
//! # Design Decisions
//! - Filters see the request before anything is copied or allocated
//! - Path matching is case-sensitive
//! - No regex to guarantee O(n) matching

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;

use crate::relay::handshake::is_websocket_upgrade;

/// Predicate selecting requests the relay should not handle.
pub trait Filter: Send + Sync + std::fmt::Debug {
    /// Returns true if the request should skip the relay.
    fn skip(&self, req: &Request<Body>) -> bool;
}

/// Wrap a closure as a filter.
pub fn from_fn<F>(f: F) -> Arc<dyn Filter>
where
    F: Fn(&Request<Body>) -> bool + Send + Sync + 'static,
{
    Arc::new(FnFilter(f))
}

/// A filter backed by a closure.
pub struct FnFilter<F>(F);

impl<F> std::fmt::Debug for FnFilter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnFilter")
    }
}

impl<F> Filter for FnFilter<F>
where
    F: Fn(&Request<Body>) -> bool + Send + Sync,
{
    fn skip(&self, req: &Request<Body>) -> bool {
        (self.0)(req)
    }
}

/// Skips requests that do not ask for a WebSocket upgrade.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonUpgradeFilter;

impl Filter for NonUpgradeFilter {
    fn skip(&self, req: &Request<Body>) -> bool {
        !is_websocket_upgrade(req.headers())
    }
}

/// Skips requests whose path starts with a prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixFilter {
    prefix: String,
}

impl PathPrefixFilter {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Filter for PathPrefixFilter {
    fn skip(&self, req: &Request<Body>) -> bool {
        req.uri().path().starts_with(&self.prefix)
    }
}

/// Skips if any inner filter skips (OR semantics).
#[derive(Debug)]
pub struct AnyFilter {
    filters: Vec<Arc<dyn Filter>>,
}

impl AnyFilter {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }
}

impl Filter for AnyFilter {
    fn skip(&self, req: &Request<Body>) -> bool {
        self.filters.iter().any(|f| f.skip(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upgrade_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .body(Body::default())
            .unwrap()
    }

    #[test]
    fn test_non_upgrade_filter() {
        let filter = NonUpgradeFilter;
        assert!(!filter.skip(&upgrade_request("/ws")));

        let plain = Request::builder().uri("/ws").body(Body::default()).unwrap();
        assert!(filter.skip(&plain));
    }

    #[test]
    fn test_path_prefix_filter() {
        let filter = PathPrefixFilter::new("/ws/internal");
        assert!(filter.skip(&upgrade_request("http://relay.test/ws/internal/x")));
        assert!(!filter.skip(&upgrade_request("http://relay.test/ws/public")));
        assert!(!filter.skip(&upgrade_request("http://relay.test/WS/internal")));
    }

    #[test]
    fn test_any_filter() {
        let filter = AnyFilter::new(vec![
            Arc::new(NonUpgradeFilter),
            Arc::new(PathPrefixFilter::new("/skip")),
        ]);
        assert!(filter.skip(&upgrade_request("/skip/me")));
        assert!(!filter.skip(&upgrade_request("/ws")));
        assert!(!AnyFilter::new(Vec::new()).skip(&upgrade_request("/ws")));
    }

    #[test]
    fn test_fn_filter() {
        let filter = from_fn(|req| req.headers().contains_key("x-bypass"));
        let req = Request::builder()
            .header("x-bypass", "1")
            .body(Body::default())
            .unwrap();
        assert!(filter.skip(&req));
        assert!(!filter.skip(&upgrade_request("/ws")));
    }
}
