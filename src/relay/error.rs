//! Relay error taxonomy.
//!
//! Every variant is local to one session. Pre-upgrade variants turn into an
//! HTTP response; the rest end the session and are only logged.

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum RelayError {
    /// The request is not a well-formed WebSocket upgrade.
    #[error("bad handshake: {0}")]
    BadHandshake(&'static str),

    /// The Origin header is not in the allow-list.
    #[error("origin rejected: {}", .origin.as_deref().unwrap_or("<none>"))]
    OriginRejected { origin: Option<String> },

    /// The connection was not handed over within the handshake timeout.
    #[error("handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    /// The HTTP layer failed to hand over the upgraded connection.
    #[error("upgrade failed: {0}")]
    Upgrade(#[source] hyper::Error),

    /// The backend could not be reached.
    #[error("failed to dial backend {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing the framed client connection failed.
    #[error("client stream failed: {0}")]
    Socket(#[source] tungstenite::Error),

    /// Reading or writing the backend connection failed.
    #[error("backend stream failed: {0}")]
    Backend(#[source] std::io::Error),

    /// No connection context is available.
    #[error("session limit of {limit} reached")]
    PoolExhausted { limit: usize },

    /// A copy task panicked or was aborted.
    #[error("copy task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RelayError {
    /// Errors raised while copying an established session.
    pub fn is_stream(&self) -> bool {
        matches!(self, RelayError::Socket(_) | RelayError::Backend(_) | RelayError::Join(_))
    }

    /// Errors raised before the connection was upgraded.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            RelayError::BadHandshake(_) | RelayError::OriginRejected { .. } | RelayError::PoolExhausted { .. }
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::BadHandshake(_) => "bad_handshake",
            RelayError::OriginRejected { .. } => "origin_rejected",
            RelayError::HandshakeTimeout(_) => "handshake_timeout",
            RelayError::Upgrade(_) => "upgrade",
            RelayError::Dial { .. } => "dial",
            RelayError::Socket(_) => "socket",
            RelayError::Backend(_) => "backend",
            RelayError::PoolExhausted { .. } => "pool_exhausted",
            RelayError::Join(_) => "join",
        }
    }

    /// HTTP status reported to the client when the request is rejected.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::BadHandshake(_) | RelayError::OriginRejected { .. } => StatusCode::UPGRADE_REQUIRED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut response = Response::new(Body::from(
            status.canonical_reason().unwrap_or("Error"),
        ));
        *response.status_mut() = status;
        if status == StatusCode::UPGRADE_REQUIRED {
            let headers = response.headers_mut();
            headers.insert(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
            headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_upgrade_required() {
        let response = RelayError::OriginRejected { origin: Some("https://evil.test".into()) }.into_response();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
        assert_eq!(response.headers()[header::SEC_WEBSOCKET_VERSION], "13");

        let response = RelayError::BadHandshake("missing key").into_response();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    }

    #[test]
    fn exhaustion_maps_to_internal_error() {
        let err = RelayError::PoolExhausted { limit: 4 };
        assert!(err.is_rejection());
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn origin_display() {
        let err = RelayError::OriginRejected { origin: None };
        assert_eq!(err.to_string(), "origin rejected: <none>");
    }
}
