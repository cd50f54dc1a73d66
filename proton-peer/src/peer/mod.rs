// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Client Peer
//!
//! Composes the codec, pending-operation tracking, a transport channel and
//! the reconnect controller into the public RPC surface.
//!
//! # Example
//!
//! ```ignore
//! use proton_peer::{ClientPeer, PeerConfig, SendOptions};
//!
//! let peer = ClientPeer::exchange(PeerConfig::exchange("http://127.0.0.1:8080"))?;
//! let done = peer.request("5", b"hello".to_vec(), SendOptions::new()).await;
//! if done.response.is_ok() {
//!     println!("{:?}", done.response.parameters);
//! }
//! ```
//!
//! Operations always resolve: transport, protocol, crypto and timeout
//! failures become an `OPERATION_INVALID` response with a debug message.

mod config;
mod factory;

pub use config::{PeerConfig, PeerSession, DEFAULT_SERVER_ADDRESS, DEFAULT_SOCKET_ADDRESS};
pub use factory::PeerFactory;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::channel::{
    ChannelBuilder, ChannelEvent, ChannelListener, ConnectionState, ExchangeChannel,
    ExchangeHeaders, PlatformCapabilities, TransportChannel, TransportResult,
};
use crate::error::NetworkError;
use crate::events::{CallbackHandler, EventDispatcher, EventHandler, PeerEvent};
use crate::pending::{CompletionSource, Completion, PendingOperation, PendingTable};
use crate::protocol::{Operation, OperationRequest, ProtocolCodec, SendOptions};
use crate::reconnect::ReconnectController;
use crate::statistics::NetworkStatistics;

/// Debug message for an exchange response that cannot be decoded.
pub const MALFORMED_BODY_MESSAGE: &str = "Cannot read data body";

/// Duplex half of a peer.
struct Duplex {
    channel: Arc<dyn TransportChannel>,
    reconnect: ReconnectController,
    pending: PendingTable,
}

/// Client-side RPC peer.
///
/// Exchange peers send every operation as its own HTTP call. Duplex peers
/// multiplex operations over one persistent channel and need
/// [`ClientPeer::service`] (or [`ClientPeer::spawn_service`]) to be driven.
/// Ping and server time always use the exchange endpoints.
pub struct ClientPeer {
    config: PeerConfig,
    codec: ProtocolCodec,
    exchange: Arc<ExchangeChannel>,
    duplex: Option<Duplex>,
    session: RwLock<PeerSession>,
    stats: Arc<NetworkStatistics>,
    events: Arc<EventDispatcher>,
    next_request_id: AtomicU32,
}

impl std::fmt::Debug for ClientPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPeer")
            .field("server_address", &self.config.server_address)
            .field(
                "channel",
                &self.duplex.as_ref().map(|d| d.channel.kind()),
            )
            .field("state", &self.connection_state())
            .finish()
    }
}

impl ClientPeer {
    /// Peer sending operations over the exchange channel.
    pub fn exchange(config: PeerConfig) -> TransportResult<Arc<Self>> {
        let stats = Arc::new(NetworkStatistics::new());
        Self::build(config, stats, None)
    }

    /// Peer over the native duplex channel for `config.socket_address`.
    pub fn duplex(config: PeerConfig) -> TransportResult<Arc<Self>> {
        let stats = Arc::new(NetworkStatistics::new());
        let builder = ChannelBuilder::new(PlatformCapabilities::native(), stats);
        Self::duplex_with_builder(config, &builder)
    }

    /// Peer over the channel `builder` picks for `config.socket_address`.
    pub fn duplex_with_builder(
        config: PeerConfig,
        builder: &ChannelBuilder,
    ) -> TransportResult<Arc<Self>> {
        let channel = builder.build(config.channel_config())?;
        Self::with_channel(config, channel)
    }

    /// Peer over an already built duplex channel. Statistics are shared
    /// with the channel.
    pub fn with_channel(
        config: PeerConfig,
        channel: Arc<dyn TransportChannel>,
    ) -> TransportResult<Arc<Self>> {
        let stats = channel.statistics();
        Self::build(config, stats, Some(channel))
    }

    fn build(
        config: PeerConfig,
        stats: Arc<NetworkStatistics>,
        channel: Option<Arc<dyn TransportChannel>>,
    ) -> TransportResult<Arc<Self>> {
        let codec = ProtocolCodec::with_providers(config.serialization, config.encryption)?;
        let exchange = Arc::new(ExchangeChannel::new(
            &config.server_address,
            config.certificate_policy.clone(),
            config.connect_timeout,
            stats.clone(),
        )?);
        let events = Arc::new(EventDispatcher::new());

        let duplex = channel.map(|channel| Duplex {
            reconnect: ReconnectController::new(
                channel.clone(),
                config.reconnect_config(),
                events.clone(),
            ),
            pending: PendingTable::new(config.max_pending_operations),
            channel,
        });

        let peer = Arc::new_cyclic(|weak: &Weak<ClientPeer>| {
            if let Some(duplex) = &duplex {
                duplex.channel.set_listener(Arc::new(PeerListener {
                    peer: weak.clone(),
                }));
            }
            ClientPeer {
                config,
                codec,
                exchange,
                duplex,
                session: RwLock::new(PeerSession::default()),
                stats,
                events,
                next_request_id: AtomicU32::new(1),
            }
        });

        info!(
            server = %peer.config.server_address,
            channel = peer.duplex.as_ref().map(|d| d.channel.kind()).unwrap_or("exchange"),
            "peer created"
        );
        Ok(peer)
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn statistics(&self) -> Arc<NetworkStatistics> {
        self.stats.clone()
    }

    /// Current duplex state. Exchange peers are always `Disconnected`.
    pub fn connection_state(&self) -> ConnectionState {
        self.duplex
            .as_ref()
            .map(|d| d.reconnect.state())
            .unwrap_or(ConnectionState::Disconnected)
    }

    pub fn is_duplex(&self) -> bool {
        self.duplex.is_some()
    }

    /// Number of duplex operations awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.duplex.as_ref().map(|d| d.pending.len()).unwrap_or(0)
    }

    pub fn session(&self) -> PeerSession {
        self.session.read().clone()
    }

    pub fn set_session(&self, session: PeerSession) {
        *self.session.write() = session;
    }

    pub fn clear_session(&self) {
        *self.session.write() = PeerSession::default();
    }

    pub fn add_event_handler(&self, handler: Arc<dyn EventHandler>) {
        self.events.add_handler(handler);
    }

    /// Adds a closure as an event handler.
    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(PeerEvent) + Send + Sync + 'static,
    {
        self.events.add_handler(Arc::new(CallbackHandler::new(callback)));
    }

    // === Connection ===

    /// Connects the duplex channel. A no-op for exchange peers.
    pub fn connect(&self) -> TransportResult<()> {
        match &self.duplex {
            Some(duplex) => duplex.reconnect.connect(),
            None => Ok(()),
        }
    }

    /// Disconnects the duplex channel and stops automatic retries.
    pub fn disconnect(&self) -> TransportResult<()> {
        match &self.duplex {
            Some(duplex) => {
                let result = duplex.reconnect.disconnect();
                // Channels that were never connected emit no close event.
                duplex.pending.fail_all("disconnected by client");
                result
            }
            None => Ok(()),
        }
    }

    /// Disconnect, wait up to `max_wait` for the channel to close, connect.
    ///
    /// Blocks the calling thread. Must not be called from an event handler
    /// or any other code running on the thread that delivers channel events.
    pub fn reconnect(&self, max_wait: Duration) -> TransportResult<()> {
        match &self.duplex {
            Some(duplex) => duplex.reconnect.reconnect(max_wait),
            None => Ok(()),
        }
    }

    // === Operations ===

    fn allocate_request_id(&self) -> u32 {
        loop {
            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    fn prepare(
        &self,
        operation_code: &str,
        parameters: Vec<u8>,
        options: SendOptions,
    ) -> Arc<PendingOperation> {
        let mut request = OperationRequest::new(operation_code, parameters);
        request.request_id = self.allocate_request_id();
        let timeout = options.timeout.unwrap_or(self.config.default_timeout);
        Arc::new(PendingOperation::new(request, options, timeout))
    }

    /// Sends an operation and returns its handle without waiting.
    ///
    /// Duplex operations are written to the channel immediately. Exchange
    /// operations run as a task on the current tokio runtime; outside a
    /// runtime they fail at once.
    pub fn send_operation(
        self: &Arc<Self>,
        operation_code: &str,
        parameters: Vec<u8>,
        options: SendOptions,
    ) -> Arc<PendingOperation> {
        let operation = self.prepare(operation_code, parameters, options);

        match &self.duplex {
            Some(duplex) => self.send_duplex(duplex, &operation),
            None => match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let peer = self.clone();
                    let task_operation = operation.clone();
                    runtime.spawn(async move {
                        peer.execute_exchange(&task_operation).await;
                    });
                }
                Err(_) => {
                    operation.fail(
                        CompletionSource::TransportFailure,
                        "exchange calls need a tokio runtime",
                    );
                }
            },
        }

        operation
    }

    /// Sends an operation and waits for its completion.
    ///
    /// Duplex responses only arrive while the peer is being serviced.
    pub async fn request(
        &self,
        operation_code: &str,
        parameters: Vec<u8>,
        options: SendOptions,
    ) -> Completion {
        let operation = self.prepare(operation_code, parameters, options);
        match &self.duplex {
            Some(duplex) => self.send_duplex(duplex, &operation),
            None => self.execute_exchange(&operation).await,
        }
        operation.wait().await
    }

    fn send_duplex(&self, duplex: &Duplex, operation: &Arc<PendingOperation>) {
        let key = self.session.read().key.clone();
        let request = Operation::Request(operation.request().clone());
        let frame = match self
            .codec
            .encode_operation(&request, operation.options(), key.as_ref())
        {
            Ok(frame) => frame,
            Err(e) => {
                warn!(request_id = operation.request_id(), error = %e, "encode failed");
                operation.fail(CompletionSource::EncodeFailure, e.to_string());
                return;
            }
        };

        // Tracked before sending so a fast response finds its entry.
        if let Err(e) = duplex.pending.insert(operation.clone()) {
            warn!(request_id = operation.request_id(), error = %e, "operation rejected");
            operation.fail(CompletionSource::TransportFailure, e.to_string());
            return;
        }

        match duplex.channel.send(&frame) {
            Ok(written) => {
                operation.record_sent(written);
                debug!(
                    request_id = operation.request_id(),
                    operation_code = %operation.request().operation_code,
                    bytes = written,
                    "operation sent"
                );
            }
            Err(e) => {
                duplex.pending.remove(operation.request_id());
                warn!(request_id = operation.request_id(), error = %e, "send failed");
                operation.fail(CompletionSource::TransportFailure, e.to_string());
            }
        }
    }

    async fn execute_exchange(&self, operation: &PendingOperation) {
        let session = self.session();
        let options = *operation.options();
        let request = Operation::Request(operation.request().clone());

        let frame = match self
            .codec
            .encode_operation(&request, &options, session.key.as_ref())
        {
            Ok(frame) => frame,
            Err(e) => {
                warn!(request_id = operation.request_id(), error = %e, "encode failed");
                operation.fail(CompletionSource::EncodeFailure, e.to_string());
                return;
            }
        };

        let headers = ExchangeHeaders {
            session_id: session.session_id.clone(),
            token: session.token.clone(),
            encrypt_key: if options.encrypted {
                session.key_ref.clone()
            } else {
                None
            },
        };

        let sent = frame.len();
        let remaining = operation
            .deadline()
            .saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            operation.time_out();
            return;
        }

        let result = self.exchange.execute(frame, &headers, remaining).await;
        if matches!(
            result,
            Ok(_) | Err(NetworkError::Http(_)) | Err(NetworkError::ReceiveFailed(_))
        ) {
            operation.record_sent(sent);
        }

        match result {
            Ok(body) => {
                operation.record_received(body.len());
                match self.codec.decode_operation(&body, session.key.as_ref()) {
                    Ok((header, Operation::Response(response))) => {
                        operation.complete(response, header.send_options(), CompletionSource::Response);
                    }
                    Ok((_, Operation::Request(_))) => {
                        warn!(request_id = operation.request_id(), "server answered with a request");
                        operation.fail(CompletionSource::DecodeFailure, MALFORMED_BODY_MESSAGE);
                    }
                    Err(e) => {
                        warn!(
                            request_id = operation.request_id(),
                            bytes = body.len(),
                            error = %e,
                            "response body undecodable"
                        );
                        operation.fail(CompletionSource::DecodeFailure, MALFORMED_BODY_MESSAGE);
                    }
                }
            }
            Err(NetworkError::Timeout) => {
                operation.time_out();
            }
            Err(e) => {
                warn!(request_id = operation.request_id(), error = %e, "exchange call failed");
                operation.fail(CompletionSource::TransportFailure, e.to_string());
            }
        }
    }

    /// Liveness check against the exchange endpoint. Never fails.
    pub async fn ping(&self, timeout: Duration) -> bool {
        self.exchange.ping(timeout).await
    }

    /// Server clock in Unix milliseconds.
    ///
    /// Falls back to the local clock when the server cannot be asked.
    pub async fn server_time(&self, timeout: Duration) -> i64 {
        match self.exchange.server_time(timeout).await {
            Ok(millis) => millis,
            Err(e) => {
                warn!(error = %e, "server time unavailable, using local clock");
                local_time_millis()
            }
        }
    }

    // === Scheduling ===

    /// One cooperative service step: drive channel I/O, fire a due
    /// reconnect, time out expired operations.
    ///
    /// Call this once per host tick when not using
    /// [`ClientPeer::spawn_service`].
    pub fn service(&self, now: Instant) {
        let Some(duplex) = &self.duplex else {
            return;
        };

        if duplex.channel.is_connected() {
            if let Err(e) = duplex.channel.poll() {
                warn!(channel = duplex.channel.kind(), error = %e, "poll failed");
            }
        }
        duplex.reconnect.poll(now);

        let expired = duplex.pending.expire(now);
        if expired > 0 {
            debug!(expired, "pending operations timed out");
        }
    }

    /// Runs [`ClientPeer::service`] every `interval` on the current tokio
    /// runtime. The task ends once the peer is dropped.
    pub fn spawn_service(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let peer = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(peer) = peer.upgrade() else {
                    break;
                };
                peer.service(Instant::now());
            }
            debug!("service loop stopped");
        })
    }

    fn route_frame(&self, duplex: &Duplex, frame: &[u8]) {
        let key = self.session.read().key.clone();
        match self.codec.decode_operation(frame, key.as_ref()) {
            Ok((header, Operation::Response(response))) => {
                let response_id = response.response_id;
                if !duplex
                    .pending
                    .complete_response(response, header.send_options(), frame.len())
                {
                    debug!(response_id, "unmatched response dropped");
                }
            }
            Ok((_, Operation::Request(request))) => {
                debug!(
                    operation_code = %request.operation_code,
                    "server-initiated request ignored"
                );
            }
            Err(e) => {
                // No request id can be recovered; the operation times out.
                warn!(bytes = frame.len(), error = %e, "inbound frame undecodable");
                self.events.dispatch(PeerEvent::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    fn handle_channel_event(&self, duplex: &Duplex, event: ChannelEvent) {
        duplex.reconnect.handle_event(&event);
        match event {
            ChannelEvent::Received(frame) => self.route_frame(duplex, &frame),
            ChannelEvent::Disconnected { reason } => {
                duplex.pending.fail_all(&reason);
            }
            ChannelEvent::Error { code, message } => {
                warn!(code, %message, "channel error");
                self.events.dispatch(PeerEvent::Error { message });
            }
            ChannelEvent::Connected => {}
        }
    }
}

impl Drop for ClientPeer {
    fn drop(&mut self) {
        if let Some(duplex) = &self.duplex {
            duplex.pending.fail_all("peer dropped");
            if duplex.channel.is_connected() {
                let _ = duplex.channel.disconnect();
            }
        }
    }
}

/// Routes channel events back into the peer without keeping it alive.
struct PeerListener {
    peer: Weak<ClientPeer>,
}

impl ChannelListener for PeerListener {
    fn on_event(&self, event: ChannelEvent) {
        let Some(peer) = self.peer.upgrade() else {
            return;
        };
        if let Some(duplex) = &peer.duplex {
            peer.handle_channel_event(duplex, event);
        }
    }
}

fn local_time_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
