// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! WebSocket Channel
//!
//! Native duplex channel using tungstenite. One binary message carries one
//! frame, so no length prefix is added.

use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::address::{Endpoint, Scheme};
use super::tls;
use super::{
    ChannelConfig, ChannelEvent, ChannelListener, ListenerSlot, TransportChannel, TransportResult,
};
use crate::error::NetworkError;
use crate::statistics::NetworkStatistics;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

const MIN_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// WebSocket channel for `ws://` and `wss://` servers.
///
/// # Example
///
/// ```ignore
/// use proton_peer::channel::{ChannelConfig, WebSocketChannel};
///
/// let channel = WebSocketChannel::new(ChannelConfig::new("wss://game.example.com/ws"), stats)?;
/// channel.connect()?;
/// channel.send(&frame)?;
/// ```
pub struct WebSocketChannel {
    config: ChannelConfig,
    endpoint: Endpoint,
    socket: Mutex<Option<Socket>>,
    listener: ListenerSlot,
    stats: Arc<NetworkStatistics>,
}

impl WebSocketChannel {
    pub fn new(config: ChannelConfig, stats: Arc<NetworkStatistics>) -> TransportResult<Self> {
        let endpoint = Endpoint::parse(&config.url)?;
        if !matches!(endpoint.scheme, Scheme::Ws | Scheme::Wss) {
            return Err(NetworkError::InvalidAddress(
                "Invalid URL scheme (expected ws:// or wss://)".into(),
            ));
        }
        Ok(WebSocketChannel {
            config,
            endpoint,
            socket: Mutex::new(None),
            listener: ListenerSlot::default(),
            stats,
        })
    }

    fn open(&self) -> TransportResult<Socket> {
        let addr = self
            .endpoint
            .authority()
            .to_socket_addrs()
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?
            .next()
            .ok_or_else(|| {
                NetworkError::ConnectionFailed(format!("no address for {}", self.endpoint.host))
            })?;

        let tcp_stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout)?;
        tcp_stream.set_read_timeout(Some(self.config.connect_timeout))?;
        tcp_stream.set_write_timeout(Some(self.config.io_timeout))?;
        let control = tcp_stream.try_clone()?;

        let stream = if self.endpoint.scheme.is_secure() {
            tls::connect_stream(
                self.endpoint.server_name(),
                tcp_stream,
                &self.config.certificate_policy,
            )?
        } else {
            MaybeTlsStream::Plain(tcp_stream)
        };

        let request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| {
                NetworkError::ConnectionFailed(format!("Invalid WebSocket request: {}", e))
            })?;

        let (socket, _response) = tungstenite::client(request, stream).map_err(|e| {
            NetworkError::ConnectionFailed(format!("WebSocket handshake failed: {}", e))
        })?;

        control.set_read_timeout(Some(self.config.poll_timeout.max(MIN_POLL_TIMEOUT)))?;
        Ok(socket)
    }
}

impl TransportChannel for WebSocketChannel {
    fn connect(&self) -> TransportResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let socket = self.open().inspect_err(|e| {
            warn!(url = %self.config.url, error = %e, "websocket connect failed");
        })?;
        *self.socket.lock() = Some(socket);

        info!(url = %self.config.url, "websocket channel connected");
        self.listener.emit(ChannelEvent::Connected);
        Ok(())
    }

    fn disconnect(&self) -> TransportResult<()> {
        let previous = self.socket.lock().take();
        if let Some(mut socket) = previous {
            let _ = socket.close(None);
            let _ = socket.flush();
            self.listener.emit(ChannelEvent::Disconnected {
                reason: "closed by client".into(),
            });
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.lock().is_some()
    }

    fn send(&self, frame: &[u8]) -> TransportResult<usize> {
        let result = {
            let mut guard = self.socket.lock();
            let socket = guard.as_mut().ok_or(NetworkError::NotConnected)?;
            let result = socket.send(Message::Binary(frame.to_vec()));
            if matches!(
                result,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed)
            ) {
                *guard = None;
            }
            result
        };

        match result {
            Ok(()) => {
                self.stats.record_sent(frame.len());
                debug!(bytes = frame.len(), "websocket frame sent");
                Ok(frame.len())
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                self.listener.emit(ChannelEvent::Disconnected {
                    reason: "connection closed".into(),
                });
                Err(NetworkError::ConnectionClosed)
            }
            Err(e) => Err(NetworkError::SendFailed(e.to_string())),
        }
    }

    fn poll(&self) -> TransportResult<usize> {
        let mut events = Vec::new();
        let mut closed: Option<String> = None;

        {
            let mut guard = self.socket.lock();
            let Some(socket) = guard.as_mut() else {
                return Ok(0);
            };

            loop {
                match socket.read() {
                    Ok(Message::Binary(data)) => {
                        self.stats.record_received(data.len());
                        events.push(ChannelEvent::Received(data));
                    }
                    Ok(Message::Close(frame)) => {
                        closed = Some(
                            frame
                                .map(|f| f.reason.to_string())
                                .filter(|r| !r.is_empty())
                                .unwrap_or_else(|| "closed by server".into()),
                        );
                        break;
                    }
                    Ok(Message::Text(_)) => {
                        events.push(ChannelEvent::Error {
                            code: 0,
                            message: "unexpected text message".into(),
                        });
                    }
                    // tungstenite queues the pong itself; flushed on the next write
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                    Err(tungstenite::Error::Io(ref e))
                        if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                    {
                        break;
                    }
                    Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                        closed = Some("connection closed".into());
                        break;
                    }
                    Err(e) => {
                        closed = Some(e.to_string());
                        break;
                    }
                }
            }

            if closed.is_some() {
                *guard = None;
            }
        }

        if let Some(reason) = closed {
            warn!(url = %self.config.url, %reason, "websocket channel closed");
            events.push(ChannelEvent::Disconnected { reason });
        }
        Ok(self.listener.emit_all(events))
    }

    fn set_listener(&self, listener: Arc<dyn ChannelListener>) {
        self.listener.set(listener);
    }

    fn statistics(&self) -> Arc<NetworkStatistics> {
        self.stats.clone()
    }

    fn kind(&self) -> &'static str {
        "websocket"
    }
}
