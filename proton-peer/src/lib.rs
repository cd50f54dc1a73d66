// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Proton Peer
//!
//! Client-side RPC peer that exchanges framed, optionally encrypted
//! operation requests and responses with a server.
//!
//! # Architecture
//!
//! - **Protocol codec**: header + provider-selected serialization + optional encryption
//! - **Pending operations**: one in-flight request, completed exactly once
//! - **Transport channels**: exchange (HTTP), socket (TCP/TLS/UDP), WebSocket,
//!   and a handle-addressed bridge for hosts that only expose global callbacks
//! - **Reconnect controller**: fixed-interval automatic reconnection
//! - **Client peer**: the public surface (send operation, ping, server time)
//! - **Peer factory**: shared defaults and one service tick for many peers
//!
//! All cryptographic operations use the audited `ring` crate, except the
//! XChaCha20-Poly1305 provider.

pub mod bridge;
pub mod channel;
pub mod error;
pub mod events;
pub mod peer;
pub mod pending;
pub mod protocol;
pub mod reconnect;
pub mod statistics;

pub use bridge::{BridgeHandle, BridgeRegistry, BridgeSubscribers, NativeSocketBridge};
pub use channel::{
    CertificatePolicy, ChannelBuilder, ChannelConfig, ChannelEvent, ChannelListener,
    ConnectionState, MockChannel, PlatformCapabilities, TransportChannel, TransportResult,
};
pub use error::NetworkError;
pub use events::{CallbackHandler, EventDispatcher, EventHandler, PeerEvent};
pub use peer::{ClientPeer, PeerConfig, PeerFactory, PeerSession};
pub use pending::{
    Completion, CompletionSource, PendingOperation, PendingTable, MAX_OPERATION_TIMEOUT,
};
pub use protocol::{
    CodecError, EncryptionKey, Header, Operation, OperationRequest, OperationResponse,
    OperationType, ProtocolCodec, Reliability, ReturnCode, SendOptions,
};
pub use reconnect::{ReconnectConfig, ReconnectController};
pub use statistics::{NetworkStatistics, StatisticsSnapshot};
