// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Common Test Utilities
//!
//! Shared helpers used across test modules. Not every test binary uses
//! every helper.

#![allow(dead_code)]

pub mod host;
pub mod server;
pub mod strategies;
pub mod tls;

use std::sync::Arc;

use parking_lot::Mutex;
use proton_peer::{
    EncryptionKey, MockChannel, Operation, OperationResponse, PeerEvent, ProtocolCodec,
};

/// Makes `channel` answer every request with an OK response echoing its
/// parameters, encrypted like the request.
pub fn echo_responder(channel: &MockChannel, key: Option<EncryptionKey>) {
    let codec = ProtocolCodec::new();
    channel.set_responder(move |frame| {
        let (header, operation) = codec.decode_operation(frame, key.as_ref()).ok()?;
        let Operation::Request(request) = operation else {
            return None;
        };
        let response = OperationResponse::ok(&request, request.parameters.clone());
        codec
            .encode_operation(&response.into(), &header.send_options(), key.as_ref())
            .ok()
    });
}

/// Records every peer event.
pub fn record_events(peer: &proton_peer::ClientPeer) -> Arc<Mutex<Vec<PeerEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    peer.on_event(move |event| sink.lock().push(event));
    events
}

/// A fixed 32-byte test key.
pub fn test_key() -> EncryptionKey {
    EncryptionKey::from_bytes([7u8; 32])
}
