//! Server side of the RFC 6455 opening handshake.
//!
//! # Responsibilities
//! - Recognise and validate upgrade requests
//! - Check the Origin header against the allow-list
//! - Pick a subprotocol and build the `101 Switching Protocols` response
//!
//! # Design Decisions
//! - Origin comparison is byte-exact (no case folding, no normalization)
//! - Subprotocol choice follows server preference order
//! - Compression offers are declined: the framing layer has no
//!   permessage-deflate support, and RFC 7692 lets a server ignore the offer

use axum::body::Body;
use axum::http::{header, request::Parts, HeaderMap, HeaderValue, Method, Response, StatusCode};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

use crate::config::relay::WILDCARD_ORIGIN;
use crate::relay::error::RelayError;

/// Extension token for per-message compression.
pub const PERMESSAGE_DEFLATE: &str = "permessage-deflate";

/// True if the headers ask for a WebSocket upgrade.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    header_contains_token(headers, header::CONNECTION, "upgrade")
        && header_contains_token(headers, header::UPGRADE, "websocket")
}

/// Origin check. A leading wildcard entry accepts anything, including a missing
/// header; otherwise the origin must equal one entry exactly.
pub fn check_origin(allowed: &[String], origin: Option<&str>) -> bool {
    if allowed.first().map(String::as_str) == Some(WILDCARD_ORIGIN) {
        return true;
    }
    let origin = origin.unwrap_or("");
    allowed.iter().any(|o| o == origin)
}

/// Validate the upgrade request and return its `Sec-WebSocket-Key`.
pub fn validate_upgrade(parts: &Parts) -> Result<String, RelayError> {
    if parts.method != Method::GET {
        return Err(RelayError::BadHandshake("upgrade request must use GET"));
    }
    if !header_contains_token(&parts.headers, header::CONNECTION, "upgrade") {
        return Err(RelayError::BadHandshake("'upgrade' token not found in 'Connection' header"));
    }
    if !header_contains_token(&parts.headers, header::UPGRADE, "websocket") {
        return Err(RelayError::BadHandshake("'websocket' token not found in 'Upgrade' header"));
    }
    match parts.headers.get(header::SEC_WEBSOCKET_VERSION) {
        Some(v) if v.as_bytes() == b"13" => {}
        _ => return Err(RelayError::BadHandshake("unsupported version: 13 not found in 'Sec-Websocket-Version' header")),
    }
    match parts
        .headers
        .get(header::SEC_WEBSOCKET_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
    {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => Err(RelayError::BadHandshake("'Sec-WebSocket-Key' header is missing or blank")),
    }
}

/// First configured subprotocol the client also offered.
pub fn select_subprotocol(supported: &[String], headers: &HeaderMap) -> Option<String> {
    let offered: Vec<&str> = headers
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    supported
        .iter()
        .find(|p| offered.contains(&p.as_str()))
        .cloned()
}

/// True if the client offered per-message compression.
pub fn offers_compression(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::SEC_WEBSOCKET_EXTENSIONS)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|ext| ext.split(';').next())
        .any(|name| name.trim().eq_ignore_ascii_case(PERMESSAGE_DEFLATE))
}

/// Build the `101 Switching Protocols` response for a validated request.
pub fn switching_protocols(key: &str, protocol: Option<&str>) -> Result<Response<Body>, RelayError> {
    let accept = HeaderValue::from_str(&derive_accept_key(key.as_bytes()))
        .map_err(|_| RelayError::BadHandshake("cannot encode accept key"))?;

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    if let Some(protocol) = protocol {
        let value = HeaderValue::from_str(protocol)
            .map_err(|_| RelayError::BadHandshake("subprotocol is not a valid header value"))?;
        headers.insert(header::SEC_WEBSOCKET_PROTOCOL, value);
    }
    Ok(response)
}

fn header_contains_token(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}
