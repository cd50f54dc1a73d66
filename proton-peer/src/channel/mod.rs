// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Transport Channels
//!
//! Platform-agnostic abstraction over the byte pipes a peer talks through.
//!
//! # Channel Variants
//!
//! - [`ExchangeChannel`]: one HTTP round trip per operation, no connection
//! - [`WebSocketChannel`], [`TcpChannel`], [`UdpChannel`]: native duplex sockets
//! - [`BridgeChannel`]: duplex over a handle-addressed host bridge
//! - [`MockChannel`]: in-memory, for tests
//!
//! Duplex channels report activity to a single [`ChannelListener`]. Events
//! fire either from inside [`TransportChannel::poll`] (native sockets, mock)
//! or from whatever thread the host bridge calls back on.

mod address;
mod bridge;
mod builder;
mod exchange;
mod mock;
mod socket;
mod tls;
mod websocket;

pub use address::{Endpoint, Scheme};
pub use bridge::BridgeChannel;
pub use builder::{ChannelBuilder, PlatformCapabilities};
pub use exchange::{ExchangeChannel, ExchangeHeaders, API_PATH, PING_PATH, SERVER_TIME_PATH};
pub use mock::MockChannel;
pub use socket::{TcpChannel, UdpChannel, STREAM_PREFIX_LEN};
pub use tls::{verify_pin, CertificatePolicy, PinnedCertificate};
pub use websocket::WebSocketChannel;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::NetworkError;
use crate::statistics::NetworkStatistics;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, NetworkError>;

/// Connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected to any server.
    Disconnected,
    /// Connection in progress.
    Connecting,
    /// Connected and ready.
    Connected,
    /// Connection lost, a retry is scheduled.
    Reconnecting { attempt: u32 },
}

/// Activity reported by a duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Disconnected { reason: String },
    Error { code: i32, message: String },
    /// One complete frame.
    Received(Vec<u8>),
}

/// Receives [`ChannelEvent`]s from a channel.
pub trait ChannelListener: Send + Sync {
    fn on_event(&self, event: ChannelEvent);
}

/// Configuration for duplex channels.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Server URL (`ws://`, `wss://`, `tcp://`, `tls://`, `udp://`).
    pub url: String,
    pub connect_timeout: Duration,
    /// Write timeout once connected.
    pub io_timeout: Duration,
    /// How long a single `poll` may wait for inbound data.
    pub poll_timeout: Duration,
    pub certificate_policy: CertificatePolicy,
    /// Largest inbound frame accepted on stream transports.
    pub max_frame_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
            poll_timeout: Duration::from_millis(5),
            certificate_policy: CertificatePolicy::default(),
            max_frame_size: 1024 * 1024,
        }
    }
}

impl ChannelConfig {
    /// Config for `url` with default timeouts.
    pub fn new(url: &str) -> Self {
        ChannelConfig {
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn with_certificate_policy(mut self, policy: CertificatePolicy) -> Self {
        self.certificate_policy = policy;
        self
    }
}

/// Duplex channel contract.
///
/// All methods take `&self`: channels are shared through `Arc` between the
/// application, the reconnect controller and the service loop.
pub trait TransportChannel: Send + Sync {
    /// Opens the connection. Synchronous channels fire
    /// [`ChannelEvent::Connected`] before returning `Ok`; bridged channels
    /// return once the request is issued and fire it later.
    ///
    /// A returned error is not also reported as an event.
    fn connect(&self) -> TransportResult<()>;

    /// Requests closure. Safe to call when not connected.
    fn disconnect(&self) -> TransportResult<()>;

    fn is_connected(&self) -> bool;

    /// Sends one frame and returns the number of bytes written.
    fn send(&self, frame: &[u8]) -> TransportResult<usize>;

    /// Drives pending inbound I/O and fires events for it. Returns the
    /// number of events fired. Callback-driven channels do nothing here.
    fn poll(&self) -> TransportResult<usize> {
        Ok(0)
    }

    fn set_listener(&self, listener: Arc<dyn ChannelListener>);

    fn statistics(&self) -> Arc<NetworkStatistics>;

    /// Short transport name for logs.
    fn kind(&self) -> &'static str;
}

/// Holds a channel's listener.
///
/// Emitting clones the listener out of the lock first, so listeners may
/// call back into the channel.
#[derive(Default)]
pub(crate) struct ListenerSlot {
    listener: RwLock<Option<Arc<dyn ChannelListener>>>,
}

impl ListenerSlot {
    pub(crate) fn set(&self, listener: Arc<dyn ChannelListener>) {
        *self.listener.write() = Some(listener);
    }

    pub(crate) fn emit(&self, event: ChannelEvent) {
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener.on_event(event);
        }
    }

    pub(crate) fn emit_all(&self, events: Vec<ChannelEvent>) -> usize {
        let count = events.len();
        for event in events {
            self.emit(event);
        }
        count
    }
}
