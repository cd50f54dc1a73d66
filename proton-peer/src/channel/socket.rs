// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Native Socket Channels
//!
//! `TcpChannel` carries frames over a plain or TLS stream with a 4-byte
//! big-endian length prefix. `UdpChannel` carries one frame per datagram.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;

use super::address::{Endpoint, Scheme};
use super::tls;
use super::{
    ChannelConfig, ChannelEvent, ChannelListener, ListenerSlot, TransportChannel, TransportResult,
};
use crate::error::NetworkError;
use crate::statistics::NetworkStatistics;

/// Size of the stream frame length prefix.
pub const STREAM_PREFIX_LEN: usize = 4;

const READ_CHUNK: usize = 8 * 1024;
const MAX_DATAGRAM: usize = 64 * 1024;
const MIN_POLL_TIMEOUT: Duration = Duration::from_millis(1);

fn resolve(endpoint: &Endpoint) -> Result<SocketAddr, NetworkError> {
    endpoint
        .authority()
        .to_socket_addrs()
        .map_err(|e| NetworkError::ConnectionFailed(format!("{}: {}", endpoint.authority(), e)))?
        .next()
        .ok_or_else(|| NetworkError::ConnectionFailed(format!("no address for {}", endpoint.host)))
}

/// Read outcome that ends a poll pass.
fn is_idle(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

struct StreamState {
    stream: MaybeTlsStream<TcpStream>,
    /// Second handle on the same socket, for timeouts and shutdown.
    control: TcpStream,
    buffer: Vec<u8>,
}

/// Length-prefixed frames over TCP, optionally TLS-wrapped (`tls://`).
pub struct TcpChannel {
    config: ChannelConfig,
    endpoint: Endpoint,
    state: Mutex<Option<StreamState>>,
    listener: ListenerSlot,
    stats: Arc<NetworkStatistics>,
}

impl TcpChannel {
    pub fn new(config: ChannelConfig, stats: Arc<NetworkStatistics>) -> TransportResult<Self> {
        let endpoint = Endpoint::parse(&config.url)?;
        if !matches!(endpoint.scheme, Scheme::Tcp | Scheme::Tls) {
            return Err(NetworkError::InvalidAddress(format!(
                "expected tcp:// or tls://, got {}",
                config.url
            )));
        }
        Ok(TcpChannel {
            config,
            endpoint,
            state: Mutex::new(None),
            listener: ListenerSlot::default(),
            stats,
        })
    }

    fn open(&self) -> TransportResult<StreamState> {
        let addr = resolve(&self.endpoint)?;
        let tcp = TcpStream::connect_timeout(&addr, self.config.connect_timeout)?;
        tcp.set_nodelay(true)?;
        tcp.set_read_timeout(Some(self.config.connect_timeout))?;
        tcp.set_write_timeout(Some(self.config.io_timeout))?;
        let control = tcp.try_clone()?;

        let stream = if self.endpoint.scheme.is_secure() {
            tls::connect_stream(
                self.endpoint.server_name(),
                tcp,
                &self.config.certificate_policy,
            )?
        } else {
            MaybeTlsStream::Plain(tcp)
        };

        control.set_read_timeout(Some(self.config.poll_timeout.max(MIN_POLL_TIMEOUT)))?;

        Ok(StreamState {
            stream,
            control,
            buffer: Vec::new(),
        })
    }

    /// Splits complete frames off the read buffer.
    fn drain_frames(
        &self,
        buffer: &mut Vec<u8>,
        events: &mut Vec<ChannelEvent>,
    ) -> Result<(), String> {
        loop {
            if buffer.len() < STREAM_PREFIX_LEN {
                return Ok(());
            }
            let mut prefix = [0u8; STREAM_PREFIX_LEN];
            prefix.copy_from_slice(&buffer[..STREAM_PREFIX_LEN]);
            let len = u32::from_be_bytes(prefix) as usize;
            if len > self.config.max_frame_size {
                return Err(format!("frame of {} bytes exceeds limit", len));
            }
            if buffer.len() < STREAM_PREFIX_LEN + len {
                return Ok(());
            }
            let frame: Vec<u8> = buffer
                .drain(..STREAM_PREFIX_LEN + len)
                .skip(STREAM_PREFIX_LEN)
                .collect();
            self.stats.record_received(STREAM_PREFIX_LEN + len);
            events.push(ChannelEvent::Received(frame));
        }
    }
}

impl TransportChannel for TcpChannel {
    fn connect(&self) -> TransportResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let state = self.open().inspect_err(|e| {
            warn!(url = %self.config.url, error = %e, "tcp connect failed");
        })?;
        *self.state.lock() = Some(state);

        info!(url = %self.config.url, "tcp channel connected");
        self.listener.emit(ChannelEvent::Connected);
        Ok(())
    }

    fn disconnect(&self) -> TransportResult<()> {
        let previous = self.state.lock().take();
        if let Some(state) = previous {
            let _ = state.control.shutdown(std::net::Shutdown::Both);
            self.listener.emit(ChannelEvent::Disconnected {
                reason: "closed by client".into(),
            });
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().is_some()
    }

    fn send(&self, frame: &[u8]) -> TransportResult<usize> {
        let len = u32::try_from(frame.len())
            .map_err(|_| NetworkError::SendFailed("frame too large".into()))?;
        let mut wire = Vec::with_capacity(STREAM_PREFIX_LEN + frame.len());
        wire.extend_from_slice(&len.to_be_bytes());
        wire.extend_from_slice(frame);

        let result = {
            let mut guard = self.state.lock();
            let state = guard.as_mut().ok_or(NetworkError::NotConnected)?;
            let result = state
                .stream
                .write_all(&wire)
                .and_then(|_| state.stream.flush());
            if result.is_err() {
                *guard = None;
            }
            result
        };

        match result {
            Ok(()) => {
                self.stats.record_sent(wire.len());
                debug!(bytes = wire.len(), "tcp frame sent");
                Ok(wire.len())
            }
            Err(e) => {
                self.listener.emit(ChannelEvent::Disconnected {
                    reason: e.to_string(),
                });
                Err(NetworkError::SendFailed(e.to_string()))
            }
        }
    }

    fn poll(&self) -> TransportResult<usize> {
        let mut events = Vec::new();
        let mut closed: Option<String> = None;

        {
            let mut guard = self.state.lock();
            let Some(state) = guard.as_mut() else {
                return Ok(0);
            };

            let mut chunk = [0u8; READ_CHUNK];
            loop {
                match state.stream.read(&mut chunk) {
                    Ok(0) => {
                        closed = Some("connection closed by server".into());
                        break;
                    }
                    Ok(n) => {
                        state.buffer.extend_from_slice(&chunk[..n]);
                        if let Err(reason) = self.drain_frames(&mut state.buffer, &mut events) {
                            closed = Some(reason);
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) if is_idle(e.kind()) => break,
                    Err(e) => {
                        closed = Some(e.to_string());
                        break;
                    }
                }
            }

            if closed.is_some() {
                let _ = state.control.shutdown(std::net::Shutdown::Both);
                *guard = None;
            }
        }

        if let Some(reason) = closed {
            warn!(url = %self.config.url, %reason, "tcp channel closed");
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
        if self.endpoint.scheme.is_secure() {
            "tls"
        } else {
            "tcp"
        }
    }
}

/// One frame per datagram over a connected UDP socket.
pub struct UdpChannel {
    config: ChannelConfig,
    endpoint: Endpoint,
    socket: RwLock<Option<UdpSocket>>,
    listener: ListenerSlot,
    stats: Arc<NetworkStatistics>,
}

impl UdpChannel {
    pub fn new(config: ChannelConfig, stats: Arc<NetworkStatistics>) -> TransportResult<Self> {
        let endpoint = Endpoint::parse(&config.url)?;
        if endpoint.scheme != Scheme::Udp {
            return Err(NetworkError::InvalidAddress(format!(
                "expected udp://, got {}",
                config.url
            )));
        }
        Ok(UdpChannel {
            config,
            endpoint,
            socket: RwLock::new(None),
            listener: ListenerSlot::default(),
            stats,
        })
    }

    fn open(&self) -> TransportResult<UdpSocket> {
        let addr = resolve(&self.endpoint)?;
        let local = if addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(local)?;
        socket.connect(addr)?;
        socket.set_read_timeout(Some(self.config.poll_timeout.max(MIN_POLL_TIMEOUT)))?;
        socket.set_write_timeout(Some(self.config.io_timeout))?;
        Ok(socket)
    }
}

impl TransportChannel for UdpChannel {
    fn connect(&self) -> TransportResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let socket = self.open().inspect_err(|e| {
            warn!(url = %self.config.url, error = %e, "udp connect failed");
        })?;
        *self.socket.write() = Some(socket);

        info!(url = %self.config.url, "udp channel connected");
        self.listener.emit(ChannelEvent::Connected);
        Ok(())
    }

    fn disconnect(&self) -> TransportResult<()> {
        let previous = self.socket.write().take();
        if previous.is_some() {
            self.listener.emit(ChannelEvent::Disconnected {
                reason: "closed by client".into(),
            });
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.read().is_some()
    }

    fn send(&self, frame: &[u8]) -> TransportResult<usize> {
        let sent = {
            let guard = self.socket.read();
            let socket = guard.as_ref().ok_or(NetworkError::NotConnected)?;
            socket
                .send(frame)
                .map_err(|e| NetworkError::SendFailed(e.to_string()))?
        };
        self.stats.record_sent(sent);
        debug!(bytes = sent, "udp datagram sent");
        Ok(sent)
    }

    fn poll(&self) -> TransportResult<usize> {
        let mut events = Vec::new();
        {
            let guard = self.socket.read();
            let Some(socket) = guard.as_ref() else {
                return Ok(0);
            };

            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                match socket.recv(&mut buf) {
                    Ok(n) => {
                        self.stats.record_received(n);
                        events.push(ChannelEvent::Received(buf[..n].to_vec()));
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) if is_idle(e.kind()) => break,
                    Err(e) => {
                        // ICMP port unreachable and friends; the socket stays usable.
                        events.push(ChannelEvent::Error {
                            code: e.raw_os_error().unwrap_or(-1),
                            message: e.to_string(),
                        });
                        break;
                    }
                }
            }
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
        "udp"
    }
}
