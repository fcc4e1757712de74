//! Backend dialer.
//!
//! # Design Decisions
//! - No timeout of its own; the session's cancellation token bounds the dial
//! - Nagle disabled so small frames reach the backend without delay

use std::io;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::relay::error::RelayError;

/// Open a TCP connection to `addr`, giving up if `cancel` fires first.
pub async fn dial(addr: &str, cancel: &CancellationToken) -> Result<TcpStream, RelayError> {
    let stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(RelayError::Dial {
                addr: addr.to_string(),
                source: io::Error::new(io::ErrorKind::Interrupted, "session cancelled while dialing"),
            });
        }
        res = TcpStream::connect(addr) => res.map_err(|source| RelayError::Dial {
            addr: addr.to_string(),
            source,
        })?,
    };

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(backend = %addr, error = %e, "Failed to set TCP_NODELAY");
    }
    tracing::debug!(backend = %addr, "Backend connected");
    Ok(stream)
}
