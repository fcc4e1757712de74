//! Session spans.

use tracing::Span;

use crate::net::SessionId;

/// Placeholder logged when a request carried no id.
pub const UNKNOWN_REQUEST_ID: &str = "unknown";

/// Span wrapping everything a session logs after the upgrade.
pub fn session_span(id: SessionId, request_id: Option<&str>, backend: &str) -> Span {
    tracing::info_span!(
        "session",
        session_id = %id,
        request_id = request_id.unwrap_or(UNKNOWN_REQUEST_ID),
        backend = backend,
    )
}
