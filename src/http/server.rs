//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router: relay path plus health and status endpoints
//! - Wire up middleware (request ID, tracing)
//! - Apply configuration updates to the running relay, keeping command-line overrides
//! - Graceful shutdown: stop accepting, close sessions, drain

use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderName, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{ConfigOverrides, ServerConfig};
use crate::http::request::{UuidRequestId, X_REQUEST_ID};
use crate::lifecycle::Shutdown;
use crate::net::connection::SessionSnapshot;
use crate::relay::{relay_layer, Relay};

/// HTTP server hosting the relay.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    relay: Relay,
    overrides: ConfigOverrides,
}

impl HttpServer {
    pub fn new(config: ServerConfig) -> Self {
        let relay = Relay::new(
            config.relay.to_relay_config().resolve(),
            config.backend.address.clone(),
        );
        let router = Self::build_router(&config, relay.clone());
        Self {
            router,
            config,
            relay,
            overrides: ConfigOverrides::default(),
        }
    }

    /// Values that win over every reloaded config.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ServerConfig, relay: Relay) -> Router {
        let request_id = HeaderName::from_static(X_REQUEST_ID);
        Router::new()
            .route(&config.listener.path, any(not_upgraded))
            .route_layer(middleware::from_fn_with_state(relay.clone(), relay_layer))
            .route("/health", get(health))
            .route("/status", get(status))
            .route("/sessions", get(sessions))
            .with_state(relay)
            .layer(PropagateRequestIdLayer::new(request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(request_id, UuidRequestId))
    }

    /// Run the server until `shutdown` fires, then close sessions and drain.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ServerConfig>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            path = %self.config.listener.path,
            backend = %self.config.backend.address,
            "Relay server starting"
        );

        let updates = tokio::spawn(apply_updates(self.relay.clone(), config_updates, self.overrides.clone()));

        let relay = self.relay.clone();
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                tracing::info!("Shutdown signal received");
                relay.close_sessions();
            })
            .await?;

        let drain_timeout = Duration::from_secs(self.config.listener.drain_timeout_secs);
        if !self.relay.sessions().wait_for_drain(drain_timeout).await {
            tracing::warn!(
                remaining = self.relay.sessions().active_count(),
                "Sessions still open after drain timeout"
            );
        }
        updates.abort();

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }
}

/// Swap reloaded relay settings and backend address into the live relay.
async fn apply_updates(
    relay: Relay,
    mut updates: mpsc::UnboundedReceiver<ServerConfig>,
    overrides: ConfigOverrides,
) {
    while let Some(mut config) = updates.recv().await {
        overrides.apply(&mut config);
        relay.update_config(config.relay.to_relay_config().resolve());
        if config.backend.address != *relay.backend() {
            tracing::info!(
                old = %relay.backend(),
                new = %config.backend.address,
                "Backend address changed"
            );
            relay.set_backend(config.backend.address);
        }
        tracing::info!("Relay configuration reloaded");
    }
}

/// Reached only when the relay's filter skipped the request.
async fn not_upgraded() -> impl IntoResponse {
    (StatusCode::BAD_REQUEST, "Not a WebSocket upgrade request")
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Serialize)]
struct StatusReport {
    backend: String,
    active_sessions: usize,
    live_contexts: usize,
    idle_contexts: usize,
    max_sessions: usize,
    origins: Vec<String>,
    subprotocols: Vec<String>,
}

async fn status(State(relay): State<Relay>) -> Json<StatusReport> {
    let config = relay.config();
    Json(StatusReport {
        backend: relay.backend().to_string(),
        active_sessions: relay.sessions().active_count(),
        live_contexts: relay.pool().live(),
        idle_contexts: relay.pool().idle(),
        max_sessions: config.max_sessions,
        origins: config.origins.clone(),
        subprotocols: config.subprotocols.clone(),
    })
}

async fn sessions(State(relay): State<Relay>) -> Json<Vec<SessionSnapshot>> {
    Json(relay.sessions().snapshot())
}
