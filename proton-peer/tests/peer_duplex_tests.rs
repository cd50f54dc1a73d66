// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for peer over duplex channels

mod common;

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::{echo_responder, record_events, test_key};
use proton_peer::{
    ClientPeer, CompletionSource, ConnectionState, MockChannel, Operation, OperationResponse,
    PeerConfig, PeerEvent, PeerSession, ProtocolCodec, ReturnCode, SendOptions,
};

fn mock_peer(config: PeerConfig) -> (Arc<MockChannel>, Arc<ClientPeer>) {
    let channel = Arc::new(MockChannel::new());
    let peer = ClientPeer::with_channel(config, channel.clone()).unwrap();
    (channel, peer)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_with_service_loop() {
    let (channel, peer) = mock_peer(PeerConfig::default());
    echo_responder(&channel, None);
    peer.connect().unwrap();
    let service = peer.spawn_service(Duration::from_millis(5));

    let done = peer.request("5", b"ping".to_vec(), SendOptions::new()).await;

    assert!(done.is_ok(), "{:?}", done);
    assert_eq!(done.response.parameters, b"ping");
    service.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_requests_correlate() {
    let (channel, peer) = mock_peer(PeerConfig::default());
    echo_responder(&channel, None);
    peer.connect().unwrap();
    let service = peer.spawn_service(Duration::from_millis(5));

    let tasks: Vec<_> = (0..16u8)
        .map(|i| {
            let peer = peer.clone();
            tokio::spawn(async move {
                let done = peer.request("echo", vec![i], SendOptions::new()).await;
                (i, done)
            })
        })
        .collect();

    for task in tasks {
        let (i, done) = task.await.unwrap();
        assert!(done.is_ok());
        assert_eq!(done.response.parameters, vec![i]);
    }
    assert_eq!(peer.pending_count(), 0);
    service.abort();
}

#[test]
fn test_encrypted_duplex_round_trip() {
    let (channel, peer) = mock_peer(PeerConfig::default());
    echo_responder(&channel, Some(test_key()));
    peer.set_session(PeerSession::new().with_key(test_key(), "k"));
    peer.connect().unwrap();

    let op = peer.send_operation("5", b"secret".to_vec(), SendOptions::new().encrypted(true));
    let sent = channel.sent_frames();
    assert!(!sent[0]
        .windows(b"secret".len())
        .any(|w| w == b"secret"), "plaintext on the wire");

    peer.service(Instant::now());
    let done = op.completion().unwrap();
    assert!(done.is_ok());
    assert!(done.options.encrypted);
    assert_eq!(done.response.parameters, b"secret");
}

#[test]
fn test_encrypted_send_without_key_fails_fast() {
    let (_channel, peer) = mock_peer(PeerConfig::default());
    peer.connect().unwrap();

    let op = peer.send_operation("5", vec![], SendOptions::new().encrypted(true));
    let done = op.completion().unwrap();
    assert_eq!(done.source, CompletionSource::EncodeFailure);
    assert_eq!(done.response.return_code, ReturnCode::OPERATION_INVALID);
}

#[test]
fn test_huge_timeout_does_not_expire() {
    let (_channel, peer) = mock_peer(PeerConfig::default());
    peer.connect().unwrap();

    let op = peer.send_operation(
        "5",
        vec![],
        SendOptions::new().timeout(Duration::from_secs(u64::MAX)),
    );
    peer.service(Instant::now() + Duration::from_secs(24 * 60 * 60));

    assert!(!op.is_completed());
    assert_eq!(peer.pending_count(), 1);
}

#[test]
fn test_undecodable_inbound_frame_is_reported() {
    let (channel, peer) = mock_peer(PeerConfig::default());
    let events = record_events(&peer);
    peer.connect().unwrap();

    let op = peer.send_operation(
        "5",
        vec![],
        SendOptions::new().timeout(Duration::from_secs(5)),
    );
    channel.push_inbound(vec![1, 2, 3]);
    peer.service(Instant::now());

    assert!(!op.is_completed());
    assert!(events
        .lock()
        .iter()
        .any(|e| matches!(e, PeerEvent::Error { .. })));

    peer.service(op.deadline());
    assert_eq!(op.completion().unwrap().source, CompletionSource::Timeout);
}

#[test]
fn test_unmatched_response_is_dropped() {
    let (channel, peer) = mock_peer(PeerConfig::default());
    peer.connect().unwrap();

    let codec = ProtocolCodec::new();
    let mut stray = proton_peer::OperationRequest::new("5", vec![]);
    stray.request_id = 4242;
    let frame = codec
        .encode_operation(
            &Operation::Response(OperationResponse::ok(&stray, vec![])),
            &SendOptions::new(),
            None,
        )
        .unwrap();
    channel.push_inbound(frame);
    peer.service(Instant::now());

    assert_eq!(peer.pending_count(), 0);
}

#[test]
fn test_disconnect_fails_outstanding_operations() {
    let (_channel, peer) = mock_peer(PeerConfig::default());
    peer.connect().unwrap();
    let op = peer.send_operation("5", vec![], SendOptions::new());

    peer.disconnect().unwrap();

    let done = op.completion().unwrap();
    assert_eq!(done.source, CompletionSource::ChannelClosed);
    assert_eq!(peer.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn test_peer_reconnects_after_failures() {
    let config = PeerConfig::default().with_reconnect(true, Duration::from_millis(200));
    let (channel, peer) = mock_peer(config);
    let events = record_events(&peer);
    channel.fail_next_connects(2);

    assert!(peer.connect().is_err());
    let mut now = Instant::now();
    for _ in 0..2 {
        now += Duration::from_millis(200);
        peer.service(now);
    }

    assert_eq!(peer.connection_state(), ConnectionState::Connected);
    assert_eq!(channel.connect_attempts(), 3);
    let connected = events
        .lock()
        .iter()
        .filter(|e| **e == PeerEvent::Connected)
        .count();
    assert_eq!(connected, 1);
}

fn write_prefixed(stream: &mut TcpStream, frame: &[u8]) -> std::io::Result<()> {
    stream.write_all(&(frame.len() as u32).to_be_bytes())?;
    stream.write_all(frame)
}

fn read_prefixed(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len)?;
    let mut frame = vec![0u8; u32::from_be_bytes(len) as usize];
    stream.read_exact(&mut frame)?;
    Ok(frame)
}

/// Echo server speaking length-prefixed frames; serves one connection.
fn spawn_tcp_echo() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let codec = ProtocolCodec::new();
        while let Ok(frame) = read_prefixed(&mut stream) {
            let Ok((header, Operation::Request(req))) = codec.decode_operation(&frame, None) else {
                continue;
            };
            let response = OperationResponse::ok(&req, req.parameters.clone());
            let reply = codec
                .encode_operation(&response.into(), &header.send_options(), None)
                .unwrap();
            if write_prefixed(&mut stream, &reply).is_err() {
                break;
            }
        }
    });
    format!("tcp://{}", addr)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tcp_duplex_end_to_end() {
    let url = spawn_tcp_echo();
    let peer = ClientPeer::duplex(PeerConfig::duplex(url)).unwrap();
    let connecting = peer.clone();
    tokio::task::spawn_blocking(move || connecting.connect())
        .await
        .unwrap()
        .unwrap();
    let service = peer.spawn_service(Duration::from_millis(5));

    let done = peer
        .request(
            "5",
            b"over tcp".to_vec(),
            SendOptions::new().timeout(Duration::from_secs(5)),
        )
        .await;

    assert!(done.is_ok(), "{:?}", done);
    assert_eq!(done.response.parameters, b"over tcp");
    let stats = peer.statistics();
    assert_eq!(stats.packets_sent(), 1);
    assert_eq!(stats.packets_received(), 1);
    service.abort();
}

/// WebSocket echo server; serves one connection.
fn spawn_ws_echo() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let Ok((stream, _)) = listener.accept() else {
            return;
        };
        let Ok(mut socket) = tungstenite::accept(stream) else {
            return;
        };
        let codec = ProtocolCodec::new();
        while let Ok(message) = socket.read() {
            let tungstenite::Message::Binary(frame) = message else {
                continue;
            };
            let Ok((header, Operation::Request(req))) = codec.decode_operation(&frame, None) else {
                continue;
            };
            let response = OperationResponse::ok(&req, req.parameters.clone());
            let reply = codec
                .encode_operation(&response.into(), &header.send_options(), None)
                .unwrap();
            if socket.send(tungstenite::Message::Binary(reply)).is_err() {
                break;
            }
        }
    });
    format!("ws://{}/proton/ws", addr)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_websocket_duplex_end_to_end() {
    let url = spawn_ws_echo();
    let peer = ClientPeer::duplex(PeerConfig::duplex(url)).unwrap();
    let connecting = peer.clone();
    tokio::task::spawn_blocking(move || connecting.connect())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(peer.connection_state(), ConnectionState::Connected);
    let service = peer.spawn_service(Duration::from_millis(5));

    let done = peer
        .request(
            "ws",
            vec![1, 2, 3],
            SendOptions::new().timeout(Duration::from_secs(5)),
        )
        .await;

    assert!(done.is_ok(), "{:?}", done);
    assert_eq!(done.response.parameters, vec![1, 2, 3]);
    service.abort();
}
