//! Bidirectional copy between a framed client socket and a raw backend stream.
//!
//! # Responsibilities
//! - Forward text/binary payloads from the client to the backend, in order
//! - Forward backend bytes to the client as binary frames
//! - Tear down both directions as soon as either one ends
//!
//! # Data Flow
//! ```text
//! Client ──frames──▶ inbound task ──bytes──▶ Backend
//! Client ◀──binary── outbound task ◀──bytes── Backend
//!                  └── teardown watch ──┘
//! ```
//!
//! # Design Decisions
//! - Each direction is its own task in a `JoinSet`; the first to finish
//!   publishes a teardown reason that the sibling observes at its next await
//! - Both directions watch the cancellation token at every await, so a
//!   direction stuck on a slow peer still stops when the session is cancelled
//! - Control frames never reach the backend; the framing layer answers pings
//! - A close frame is only sent for clean endings (1000) and session
//!   cancellation (1001); faults drop the connection
//! - No message buffering: one backend read becomes one frame

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::config::ResolvedConfig;
use crate::relay::buffer::BufferPool;
use crate::relay::error::RelayError;
use crate::relay::frame::{close_code_of, close_message, is_unexpected_close, CloseCode, MessageType};

/// Upper bound on flushing a close frame during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Close codes that end a session without a warning.
const EXPECTED_CLOSE: [CloseCode; 2] = [CloseCode::NormalClosure, CloseCode::GoingAway];

/// Why a bridge is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Teardown {
    Running,
    /// One direction ended normally (peer close or backend EOF).
    Clean,
    /// One direction failed.
    Fault,
    /// The session was cancelled.
    Cancelled,
}

/// Byte and frame counts for a finished bridge.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStats {
    /// Payload bytes written to the backend.
    pub inbound_bytes: u64,
    /// Data frames received from the client.
    pub inbound_frames: u64,
    /// Bytes read from the backend.
    pub outbound_bytes: u64,
    /// Binary frames sent to the client.
    pub outbound_frames: u64,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    bytes: u64,
    frames: u64,
}

impl Counts {
    fn add(&mut self, n: usize) {
        self.bytes += n as u64;
        self.frames += 1;
    }
}

enum Direction {
    Inbound(Counts),
    Outbound(Counts),
}

/// Copies between one client socket and one backend connection.
#[derive(Debug, Clone)]
pub struct Bridge {
    chunk_size: usize,
    pool: Option<BufferPool>,
}

impl Bridge {
    /// A bridge reading at most `chunk_size` bytes from the backend per frame.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            pool: None,
        }
    }

    /// Take backend read buffers from `pool` instead of allocating per session.
    pub fn with_pool(mut self, pool: BufferPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        let bridge = Self::new(config.write_buffer_size);
        match &config.write_buffer_pool {
            Some(pool) => bridge.with_pool(pool.clone()),
            None => bridge,
        }
    }

    /// Run until either side ends. Returns the first error, if any.
    pub async fn run<S, B>(
        self,
        socket: WebSocketStream<S>,
        backend: B,
        cancel: CancellationToken,
    ) -> Result<BridgeStats, RelayError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = socket.split();
        let (reader, writer) = tokio::io::split(backend);
        let (teardown_tx, teardown_rx) = watch::channel(Teardown::Running);
        let teardown_tx = Arc::new(teardown_tx);

        let mut tasks = JoinSet::new();

        let tx = Arc::clone(&teardown_tx);
        let rx = teardown_rx.clone();
        let token = cancel.clone();
        tasks.spawn(async move {
            let res = inbound(stream, writer, rx, &token).await;
            publish(&tx, outcome(&res, &token));
            res.map(Direction::Inbound)
        });

        let tx = Arc::clone(&teardown_tx);
        let buf = ReadBuffer::new(self.chunk_size, self.pool);
        tasks.spawn(async move {
            let res = outbound(sink, reader, buf, teardown_rx, &tx, &cancel).await;
            publish(&tx, outcome(&res, &cancel));
            res.map(Direction::Outbound)
        });

        let mut stats = BridgeStats::default();
        let mut first_err = None;
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(RelayError::from).and_then(|res| res) {
                Ok(Direction::Inbound(c)) => {
                    stats.inbound_bytes = c.bytes;
                    stats.inbound_frames = c.frames;
                }
                Ok(Direction::Outbound(c)) => {
                    stats.outbound_bytes = c.bytes;
                    stats.outbound_frames = c.frames;
                }
                Err(e) => {
                    // A panicked task never published; make sure the sibling stops.
                    publish(&teardown_tx, Teardown::Fault);
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }
}

fn outcome<T>(res: &Result<T, RelayError>, cancel: &CancellationToken) -> Teardown {
    match res {
        Err(_) => Teardown::Fault,
        Ok(_) if cancel.is_cancelled() => Teardown::Cancelled,
        Ok(_) => Teardown::Clean,
    }
}

/// Record the teardown reason unless one was already recorded.
fn publish(tx: &watch::Sender<Teardown>, reason: Teardown) {
    tx.send_if_modified(|current| {
        if *current == Teardown::Running {
            *current = reason;
            true
        } else {
            false
        }
    });
}

async fn wait_for_teardown(rx: &mut watch::Receiver<Teardown>) -> Teardown {
    match rx.wait_for(|t| *t != Teardown::Running).await {
        Ok(reason) => *reason,
        Err(_) => Teardown::Fault,
    }
}

enum Step<T> {
    Stop(Teardown),
    Cancelled,
    Done(T),
}

/// Client frames to backend bytes.
async fn inbound<S, W>(
    mut stream: SplitStream<WebSocketStream<S>>,
    mut writer: W,
    mut teardown: watch::Receiver<Teardown>,
    cancel: &CancellationToken,
) -> Result<Counts, RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut counts = Counts::default();
    loop {
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            reason = wait_for_teardown(&mut teardown) => Step::Stop(reason),
            next = forward_frame(&mut stream, &mut writer, &mut counts) => Step::Done(next?),
        };
        match step {
            Step::Done(true) => continue,
            _ => return Ok(counts),
        }
    }
}

/// Forward one frame. Returns false once the client has closed.
async fn forward_frame<S, W>(
    stream: &mut SplitStream<WebSocketStream<S>>,
    writer: &mut W,
    counts: &mut Counts,
) -> Result<bool, RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let message = match stream.next().await {
        None => return Ok(false),
        Some(Ok(message)) => message,
        Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)) => return Ok(false),
        Some(Err(e)) => return Err(RelayError::Socket(e)),
    };

    if let Message::Close(frame) = &message {
        if is_unexpected_close(frame.as_ref(), &EXPECTED_CLOSE) {
            tracing::warn!(code = close_code_of(frame.as_ref()), "Client closed with unexpected code");
        } else {
            tracing::debug!(code = close_code_of(frame.as_ref()), "Client closed");
        }
        return Ok(false);
    }
    // Pings and pongs are handled by the framing layer.
    if !MessageType::of(&message).is_some_and(MessageType::is_data) {
        return Ok(true);
    }

    let data = message.into_data();
    writer.write_all(&data).await.map_err(RelayError::Backend)?;
    counts.add(data.len());
    Ok(true)
}

/// Backend bytes to client binary frames.
async fn outbound<S, R>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut reader: R,
    mut buf: ReadBuffer,
    mut teardown: watch::Receiver<Teardown>,
    teardown_tx: &watch::Sender<Teardown>,
    cancel: &CancellationToken,
) -> Result<Counts, RelayError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let mut counts = Counts::default();
    loop {
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            reason = wait_for_teardown(&mut teardown) => Step::Stop(reason),
            read = reader.read(buf.chunk()) => Step::Done(read.map_err(RelayError::Backend)?),
        };

        let n = match step {
            Step::Done(n) => n,
            Step::Cancelled => {
                going_away(&mut sink, teardown_tx).await;
                return Ok(counts);
            }
            Step::Stop(Teardown::Clean) => {
                // Flush the framing layer's reply to the client's close.
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
                return Ok(counts);
            }
            Step::Stop(_) => return Ok(counts),
        };

        if n == 0 {
            tracing::debug!("Backend closed");
            send_close(&mut sink, CloseCode::NormalClosure).await;
            return Ok(counts);
        }

        let frame = Message::Binary(Bytes::copy_from_slice(&buf.chunk()[..n]));
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            reason = wait_for_teardown(&mut teardown) => Step::Stop(reason),
            res = sink.send(frame) => Step::Done(res.map_err(RelayError::Socket)?),
        };
        match sent {
            Step::Done(()) => counts.add(n),
            Step::Cancelled => {
                going_away(&mut sink, teardown_tx).await;
                return Ok(counts);
            }
            Step::Stop(_) => return Ok(counts),
        }
    }
}

/// Cancellation: record the reason and tell the client the relay is going away.
async fn going_away<S>(sink: &mut SplitSink<WebSocketStream<S>, Message>, teardown_tx: &watch::Sender<Teardown>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    publish(teardown_tx, Teardown::Cancelled);
    send_close(sink, CloseCode::GoingAway).await;
}

async fn send_close<S>(sink: &mut SplitSink<WebSocketStream<S>, Message>, code: CloseCode)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let closing = async {
        sink.send(close_message(code, "")).await?;
        sink.close().await
    };
    match tokio::time::timeout(CLOSE_TIMEOUT, closing).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(code = %code, error = %e, "Close frame not delivered"),
        Err(_) => tracing::debug!(code = %code, "Timed out sending close frame"),
    }
}

/// Backend read buffer, returned to its pool on drop.
struct ReadBuffer {
    buf: BytesMut,
    limit: usize,
    pool: Option<BufferPool>,
}

impl ReadBuffer {
    fn new(chunk_size: usize, pool: Option<BufferPool>) -> Self {
        let buf = match &pool {
            Some(pool) => pool.acquire(),
            None => BytesMut::zeroed(chunk_size),
        };
        let limit = chunk_size.min(buf.len()).max(1);
        Self { buf, limit, pool }
    }

    fn chunk(&mut self) -> &mut [u8] {
        &mut self.buf[..self.limit]
    }
}

impl Drop for ReadBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.buf));
        }
    }
}
