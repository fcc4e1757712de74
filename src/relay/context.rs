//! Per-session request metadata.
//!
//! A `ConnectionContext` carries copies of everything the upgrade request
//! said about itself (locals, route params, query, cookies, headers) plus the
//! upgraded socket. Contexts are recycled through [`ContextPool`](super::pool::ContextPool).

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio_tungstenite::WebSocketStream;

/// The framed duplex connection produced by a successful upgrade.
pub type RelaySocket = WebSocketStream<TokioIo<Upgraded>>;

/// A value stored under a string key for the lifetime of one request/session.
pub type LocalValue = Arc<dyn Any + Send + Sync>;

/// Request-scoped values set by earlier middleware.
///
/// Insert into the request extensions before the relay runs; the relay copies
/// every entry into the session's context.
#[derive(Clone, Default)]
pub struct Locals(HashMap<String, LocalValue>);

impl Locals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.0.insert(key.into(), Arc::new(value));
    }

    pub fn get(&self, key: &str) -> Option<&LocalValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &LocalValue)> {
        self.0.iter()
    }
}

impl std::fmt::Debug for Locals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Metadata and socket for one upgraded session.
#[derive(Default)]
pub struct ConnectionContext {
    conn: Option<RelaySocket>,
    locals: HashMap<String, LocalValue>,
    params: HashMap<String, String>,
    queries: HashMap<String, String>,
    cookies: HashMap<String, String>,
    headers: HashMap<String, String>,
}

impl ConnectionContext {
    /// Empty every metadata map, keeping their allocations.
    pub(crate) fn reset(&mut self) {
        self.locals.clear();
        self.params.clear();
        self.queries.clear();
        self.cookies.clear();
        self.headers.clear();
    }

    /// Drop the socket handle, closing it if still held.
    pub(crate) fn clear_conn(&mut self) {
        self.conn = None;
    }

    pub(crate) fn set_conn(&mut self, conn: RelaySocket) {
        self.conn = Some(conn);
    }

    /// Move the socket out, leaving the context without one.
    pub(crate) fn take_conn(&mut self) -> Option<RelaySocket> {
        self.conn.take()
    }

    pub fn has_conn(&self) -> bool {
        self.conn.is_some()
    }

    pub(crate) fn insert_local(&mut self, key: String, value: LocalValue) {
        self.locals.insert(key, value);
    }

    pub(crate) fn insert_param(&mut self, key: String, value: String) {
        self.params.insert(key, value);
    }

    pub(crate) fn insert_query(&mut self, key: String, value: String) {
        self.queries.insert(key, value);
    }

    pub(crate) fn insert_cookie(&mut self, key: String, value: String) {
        self.cookies.insert(key, value);
    }

    /// Header names are stored lowercase.
    pub(crate) fn insert_header(&mut self, key: String, value: String) {
        self.headers.insert(key.to_ascii_lowercase(), value);
    }

    /// A local value by key.
    pub fn local(&self, key: &str) -> Option<&LocalValue> {
        self.locals.get(key)
    }

    /// A local value downcast to `T`.
    pub fn local_as<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.locals.get(key).and_then(|v| (**v).downcast_ref::<T>())
    }

    /// A route parameter.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// A route parameter, or `default` if absent.
    pub fn param_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.param(key).unwrap_or(default)
    }

    /// A query-string parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.queries.get(key).map(String::as_str)
    }

    pub fn query_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.query(key).unwrap_or(default)
    }

    /// A cookie value.
    pub fn cookie(&self, key: &str) -> Option<&str> {
        self.cookies.get(key).map(String::as_str)
    }

    pub fn cookie_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.cookie(key).unwrap_or(default)
    }

    /// A request header. Lookup is case-insensitive.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn header_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.header(key).unwrap_or(default)
    }

    /// True if no metadata is held.
    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
            && self.params.is_empty()
            && self.queries.is_empty()
            && self.cookies.is_empty()
            && self.headers.is_empty()
    }
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("connected", &self.conn.is_some())
            .field("locals", &self.locals.keys().collect::<Vec<_>>())
            .field("params", &self.params)
            .field("queries", &self.queries)
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .field("headers", &self.headers.len())
            .finish()
    }
}
