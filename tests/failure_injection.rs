//! Failure injection tests for the relay.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use ws_relay::relay::frame::close_code_of;

mod common;

#[tokio::test]
async fn shutdown_sends_going_away() {
    let backend = common::start_recording_backend().await;
    let relay = common::spawn_relay(common::config_for(backend.addr)).await;

    let mut client = common::connect(&relay.ws_url("/ws"), None).await.unwrap();
    assert!(common::eventually(|| backend.accepted() == 1).await);

    relay.shutdown.trigger();

    let messages = common::drain(&mut client).await;
    let close = messages.iter().find_map(|m| match m {
        Message::Close(frame) => Some(close_code_of(frame.as_ref())),
        _ => None,
    });
    assert_eq!(close, Some(1001));

    let sessions = relay.relay.sessions().clone();
    assert!(sessions.wait_for_drain(Duration::from_secs(3)).await);
}

#[tokio::test]
async fn session_limit_rejects_with_500() {
    let backend = common::start_recording_backend().await;
    let mut config = common::config_for(backend.addr);
    config.relay.max_sessions = 1;
    let relay = common::spawn_relay(config).await;

    let _first = common::connect(&relay.ws_url("/ws"), None).await.unwrap();
    assert!(common::eventually(|| backend.accepted() == 1).await);

    match common::connect(&relay.ws_url("/ws"), None).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 500),
        Err(other) => panic!("expected HTTP rejection, got {}", other),
        Ok(_) => panic!("second session should exceed the limit"),
    }
    assert_eq!(backend.accepted(), 1);

    relay.shutdown.trigger();
}

#[tokio::test]
async fn client_close_releases_backend() {
    let mut backend = common::start_recording_backend().await;
    let relay = common::spawn_relay(common::config_for(backend.addr)).await;

    let mut client = common::connect(&relay.ws_url("/ws"), None).await.unwrap();
    client.send(Message::text("bye")).await.unwrap();
    assert_eq!(backend.recv_bytes(3).await, b"bye");

    client.close(None).await.unwrap();
    while let Some(Ok(_)) = client.next().await {}

    let sessions = relay.relay.sessions().clone();
    assert!(sessions.wait_for_drain(Duration::from_secs(3)).await);
    assert!(common::eventually(|| relay.relay.pool().live() == 0).await);
    assert_eq!(relay.relay.pool().idle(), 1, "context returns to the pool");

    relay.shutdown.trigger();
}

#[tokio::test]
async fn client_vanishing_ends_session() {
    let backend = common::start_recording_backend().await;
    let relay = common::spawn_relay(common::config_for(backend.addr)).await;

    let client = common::connect(&relay.ws_url("/ws"), None).await.unwrap();
    assert!(common::eventually(|| backend.accepted() == 1).await);

    // No closing handshake.
    drop(client);

    let sessions = relay.relay.sessions().clone();
    assert!(sessions.wait_for_drain(Duration::from_secs(3)).await);

    relay.shutdown.trigger();
}
