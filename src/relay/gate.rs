//! Upgrade gate: the relay's entry point.
//!
//! # Responsibilities
//! - Run the skip filter and hand skipped requests back to the host
//! - Copy request metadata into a pooled context
//! - Check origin and handshake, answer with `101 Switching Protocols`
//! - Spawn the session: finish the upgrade, dial the backend, bridge
//!
//! # Design Decisions
//! - `handle` returns as soon as the 101 response is ready; the session runs
//!   on its own task with a child of the relay's cancellation token, so
//!   `close_sessions` reaches every session, including ones not yet started
//! - Config and backend address are swapped atomically; a session keeps the
//!   values it started with
//! - Nothing here is fatal to the host: every failure is scoped to one request
//!   or one session

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{FromRequestParts, RawPathParams, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use hyper::upgrade::{OnUpgrade, Upgraded};
use hyper_util::rt::TokioIo;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::ResolvedConfig;
use crate::http::request::{request_id, X_REQUEST_ID};
use crate::net::{SessionGuard, SessionState, SessionTracker};
use crate::observability::{metrics, spans};
use crate::relay::bridge::{Bridge, BridgeStats};
use crate::relay::context::{ConnectionContext, Locals};
use crate::relay::dialer::dial;
use crate::relay::error::RelayError;
use crate::relay::handshake::{
    check_origin, offers_compression, select_subprotocol, switching_protocols, validate_upgrade,
};
use crate::relay::pool::{ContextPool, PooledContext};

/// Outcome of offering a request to the relay.
#[derive(Debug)]
pub enum Gate {
    /// The filter skipped the request; pass it on unchanged.
    Skipped(Request<Body>),
    /// The upgrade was accepted; send this response.
    Upgraded(Response<Body>),
}

/// A relay from upgraded client connections to one TCP backend.
#[derive(Debug, Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

#[derive(Debug)]
struct RelayInner {
    config: ArcSwap<ResolvedConfig>,
    backend: ArcSwap<String>,
    pool: Arc<ContextPool>,
    sessions: SessionTracker,
    /// Parent of every session's token.
    shutdown: CancellationToken,
}

impl Relay {
    pub fn new(config: ResolvedConfig, backend: impl Into<String>) -> Self {
        let pool = Arc::new(ContextPool::new(config.max_sessions));
        Self {
            inner: Arc::new(RelayInner {
                config: ArcSwap::from_pointee(config),
                backend: ArcSwap::from_pointee(backend.into()),
                pool,
                sessions: SessionTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Replace the configuration for sessions started from now on.
    pub fn update_config(&self, config: ResolvedConfig) {
        self.inner.pool.set_max_live(config.max_sessions);
        self.inner.config.store(Arc::new(config));
    }

    /// Replace the backend address for sessions started from now on.
    pub fn set_backend(&self, backend: impl Into<String>) {
        self.inner.backend.store(Arc::new(backend.into()));
    }

    pub fn config(&self) -> Arc<ResolvedConfig> {
        self.inner.config.load_full()
    }

    pub fn backend(&self) -> Arc<String> {
        self.inner.backend.load_full()
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.inner.sessions
    }

    pub fn pool(&self) -> &Arc<ContextPool> {
        &self.inner.pool
    }

    /// Cancel every live session. Each one sends Close(1001) and tears down.
    pub fn close_sessions(&self) {
        self.inner.shutdown.cancel();
    }

    /// Offer a request to the relay.
    ///
    /// On `Ok(Gate::Upgraded)` the session is already running in the background.
    /// Errors are request-scoped; turn them into a response with `IntoResponse`.
    pub async fn handle(&self, request: Request<Body>) -> Result<Gate, RelayError> {
        let result = self.admit(request).await;
        if let Err(e) = &result {
            metrics::record_rejection(e.kind());
        }
        result
    }

    async fn admit(&self, request: Request<Body>) -> Result<Gate, RelayError> {
        let config = self.config();
        if let Some(filter) = &config.filter {
            if filter.skip(&request) {
                return Ok(Gate::Skipped(request));
            }
        }

        let mut ctx = self.inner.pool.acquire()?;
        let (mut parts, _body) = request.into_parts();
        populate_context(&mut ctx, &mut parts).await;

        let origin = parts.headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
        if !check_origin(&config.origins, origin) {
            return Err(RelayError::OriginRejected {
                origin: origin.map(str::to_owned),
            });
        }

        let key = validate_upgrade(&parts)?;
        let protocol = select_subprotocol(&config.subprotocols, &parts.headers);
        if config.enable_compression && offers_compression(&parts.headers) {
            tracing::debug!("Client offered permessage-deflate; continuing uncompressed");
        }

        let on_upgrade = parts
            .extensions
            .remove::<OnUpgrade>()
            .ok_or(RelayError::BadHandshake("connection cannot be upgraded"))?;
        let response = switching_protocols(&key, protocol.as_deref())?;

        let backend = self.backend();
        let guard = self.inner.sessions.track();
        let span = spans::session_span(guard.id(), ctx.header(X_REQUEST_ID), &backend);
        tracing::debug!(
            session_id = %guard.id(),
            subprotocol = protocol.as_deref().unwrap_or(""),
            "Upgrade accepted"
        );
        tokio::spawn(
            self.clone()
                .run_session(ctx, on_upgrade, config, backend, guard)
                .instrument(span),
        );

        Ok(Gate::Upgraded(response))
    }

    async fn run_session(
        self,
        mut ctx: PooledContext,
        on_upgrade: OnUpgrade,
        config: Arc<ResolvedConfig>,
        backend: Arc<String>,
        guard: SessionGuard,
    ) {
        let cancel = self.inner.shutdown.child_token();
        let result = run_connection(&mut ctx, on_upgrade, &config, &backend, &guard, cancel).await;

        match result {
            Ok(stats) => {
                metrics::record_bytes(metrics::DIRECTION_INBOUND, stats.inbound_bytes);
                metrics::record_bytes(metrics::DIRECTION_OUTBOUND, stats.outbound_bytes);
                tracing::info!(
                    inbound_bytes = stats.inbound_bytes,
                    outbound_bytes = stats.outbound_bytes,
                    inbound_frames = stats.inbound_frames,
                    outbound_frames = stats.outbound_frames,
                    "Session closed"
                );
            }
            Err(e @ RelayError::Dial { .. }) => {
                metrics::record_dial_failure();
                tracing::warn!(error = %e, "Backend unreachable, session dropped");
            }
            Err(e) if e.is_stream() => {
                tracing::info!(error = %e, "Session ended by stream failure");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session failed");
            }
        }
        // ctx and guard drop here: context back to the pool, session unregistered.
    }
}

/// Upgrade, dial and bridge one session.
async fn run_connection<U>(
    ctx: &mut ConnectionContext,
    upgrade: U,
    config: &ResolvedConfig,
    backend: &str,
    guard: &SessionGuard,
    cancel: CancellationToken,
) -> Result<BridgeStats, RelayError>
where
    U: Future<Output = hyper::Result<Upgraded>>,
{
    let upgraded = if config.handshake_timeout.is_zero() {
        upgrade.await.map_err(RelayError::Upgrade)?
    } else {
        tokio::time::timeout(config.handshake_timeout, upgrade)
            .await
            .map_err(|_| RelayError::HandshakeTimeout(config.handshake_timeout))?
            .map_err(RelayError::Upgrade)?
    };

    let socket =
        WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, Some(config.socket_config())).await;
    ctx.set_conn(socket);

    guard.set_state(SessionState::Dialing);
    let stream = match dial(backend, &cancel).await {
        Ok(stream) => stream,
        Err(e) => {
            // Drop the socket without sending anything.
            ctx.clear_conn();
            return Err(e);
        }
    };

    let Some(socket) = ctx.take_conn() else {
        return Ok(BridgeStats::default());
    };
    guard.set_state(SessionState::Bridging);
    tracing::debug!("Bridging");
    Bridge::from_config(config).run(socket, stream, cancel).await
}

/// Copy locals, route params, query, cookies and headers into `ctx`.
async fn populate_context(ctx: &mut ConnectionContext, parts: &mut Parts) {
    if let Some(locals) = parts.extensions.get::<Locals>() {
        for (key, value) in locals.iter() {
            ctx.insert_local(key.clone(), Arc::clone(value));
        }
    }

    if let Ok(params) = RawPathParams::from_request_parts(parts, &()).await {
        for (key, value) in params.iter() {
            ctx.insert_param(key.to_owned(), value.to_owned());
        }
    }

    if let Some(query) = parts.uri.query() {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            ctx.insert_query(key.into_owned(), value.into_owned());
        }
    }

    for value in parts.headers.get_all(header::COOKIE) {
        let Ok(cookies) = value.to_str() else { continue };
        for pair in cookies.split(';') {
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    ctx.insert_cookie(name.to_owned(), value.trim().to_owned());
                }
            }
        }
    }

    for name in parts.headers.keys() {
        let joined = parts
            .headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
            .collect::<Vec<_>>()
            .join(", ");
        ctx.insert_header(name.as_str().to_owned(), joined);
    }
}

/// Axum middleware running the relay in front of the wrapped routes.
///
/// ```ignore
/// Router::new()
///     .route("/ws", any(fallback))
///     .route_layer(axum::middleware::from_fn_with_state(relay, relay_layer))
/// ```
pub async fn relay_layer(State(relay): State<Relay>, request: Request, next: Next) -> Response {
    let id = request_id(&request).map(str::to_owned);
    match relay.handle(request).await {
        Ok(Gate::Skipped(request)) => next.run(request).await,
        Ok(Gate::Upgraded(response)) => response,
        Err(e) => {
            let request_id = id.as_deref().unwrap_or(spans::UNKNOWN_REQUEST_ID);
            if e.is_rejection() {
                tracing::warn!(request_id, error = %e, "Upgrade rejected");
            } else {
                tracing::error!(request_id, error = %e, "Upgrade failed");
            }
            e.into_response()
        }
    }
}
