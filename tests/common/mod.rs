//! Shared utilities for integration and load testing.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use ws_relay::config::ServerConfig;
use ws_relay::{HttpServer, Relay, Shutdown};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A relay server running on an ephemeral port.
pub struct RunningRelay {
    pub addr: SocketAddr,
    pub relay: Relay,
    pub shutdown: Shutdown,
}

impl RunningRelay {
    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    #[allow(dead_code)]
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Start the relay with `config` on 127.0.0.1 and an OS-assigned port.
pub async fn spawn_relay(config: ServerConfig) -> RunningRelay {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let (_, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config);
    let relay = server.relay().clone();
    let server_shutdown = shutdown.clone();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    RunningRelay { addr, relay, shutdown }
}

/// Default config pointing at `backend`.
pub fn config_for(backend: SocketAddr) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.backend.address = backend.to_string();
    config
}

/// A backend that records every byte it receives.
pub struct RecordingBackend {
    pub addr: SocketAddr,
    pub accepted: Arc<AtomicUsize>,
    pub received: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl RecordingBackend {
    /// Wait until `n` bytes have arrived, across connections, and return them.
    #[allow(dead_code)]
    pub async fn recv_bytes(&mut self, n: usize) -> Vec<u8> {
        let mut out = Vec::new();
        while out.len() < n {
            let chunk = tokio::time::timeout(Duration::from_secs(5), self.received.recv())
                .await
                .expect("backend received nothing")
                .expect("backend channel closed");
            out.extend_from_slice(&chunk);
        }
        out
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

pub async fn start_recording_backend() -> RecordingBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let (tx, received) = mpsc::unbounded_channel();

    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let _ = tx.send(buf[..n].to_vec());
                        }
                    }
                }
            });
        }
    });

    RecordingBackend { addr, accepted, received }
}

/// A backend that writes `chunks` with `gap` between them, then closes.
#[allow(dead_code)]
pub async fn start_chunk_backend(chunks: Vec<&'static [u8]>, gap: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let chunks = chunks.clone();
            tokio::spawn(async move {
                for chunk in chunks {
                    tokio::time::sleep(gap).await;
                    if socket.write_all(chunk).await.is_err() {
                        return;
                    }
                }
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// A backend that echoes everything back.
#[allow(dead_code)]
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.into_split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Open a WebSocket, optionally sending an Origin header and offered subprotocols.
pub async fn connect_with(
    url: &str,
    origin: Option<&str>,
    protocols: Option<&str>,
) -> Result<(Client, tungstenite::handshake::client::Response), tungstenite::Error> {
    let mut request = url.into_client_request()?;
    if let Some(origin) = origin {
        request
            .headers_mut()
            .insert("Origin", HeaderValue::from_str(origin).unwrap());
    }
    if let Some(protocols) = protocols {
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_str(protocols).unwrap());
    }
    tokio_tungstenite::connect_async(request).await
}

pub async fn connect(url: &str, origin: Option<&str>) -> Result<Client, tungstenite::Error> {
    connect_with(url, origin, None).await.map(|(ws, _)| ws)
}

/// Everything the client receives until the connection ends.
#[allow(dead_code)]
pub async fn drain(client: &mut Client) -> Vec<Message> {
    let mut messages = Vec::new();
    loop {
        match tokio::time::timeout(Duration::from_secs(5), client.next()).await {
            Ok(Some(Ok(message))) => messages.push(message),
            Ok(Some(Err(_))) | Ok(None) => return messages,
            Err(_) => panic!("connection did not end"),
        }
    }
}

/// Poll `check` until it holds or a few seconds pass.
#[allow(dead_code)]
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
