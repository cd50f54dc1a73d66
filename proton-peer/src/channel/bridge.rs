// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Bridge Channel
//!
//! Duplex channel over a [`BridgeRegistry`] handle. Events arrive on the
//! host's callback thread; `poll` has nothing to do.

use std::sync::Arc;

use tracing::{debug, info};

use super::{ChannelEvent, ChannelListener, ListenerSlot, TransportChannel, TransportResult};
use crate::bridge::{BridgeHandle, BridgeRegistry, BridgeSubscribers, CloseEvent};
use crate::error::NetworkError;
use crate::statistics::NetworkStatistics;

/// State the bridge subscribers write into.
struct Shared {
    listener: ListenerSlot,
    stats: Arc<NetworkStatistics>,
}

/// One logical connection multiplexed through the host bridge.
///
/// The handle lives as long as the channel; reconnects reuse it. Dropping
/// the channel retires the handle.
pub struct BridgeChannel {
    registry: Arc<BridgeRegistry>,
    url: String,
    handle: BridgeHandle,
    shared: Arc<Shared>,
}

impl BridgeChannel {
    pub fn new(
        registry: Arc<BridgeRegistry>,
        url: &str,
        stats: Arc<NetworkStatistics>,
    ) -> TransportResult<Self> {
        let shared = Arc::new(Shared {
            listener: ListenerSlot::default(),
            stats,
        });

        let subscribers = {
            let on_open = shared.clone();
            let on_close = shared.clone();
            let on_error = shared.clone();
            let on_message = shared.clone();
            BridgeSubscribers {
                on_open: Arc::new(move || on_open.listener.emit(ChannelEvent::Connected)),
                on_close: Arc::new(move |event: CloseEvent| {
                    on_close.listener.emit(ChannelEvent::Disconnected {
                        reason: if event.reason.is_empty() {
                            format!("closed with code {}", event.code)
                        } else {
                            format!("{} (code {})", event.reason, event.code)
                        },
                    })
                }),
                on_error: Arc::new(move |message: String| {
                    on_error
                        .listener
                        .emit(ChannelEvent::Error { code: -1, message })
                }),
                on_message: Arc::new(move |data: Vec<u8>| {
                    on_message.stats.record_received(data.len());
                    on_message.listener.emit(ChannelEvent::Received(data));
                }),
            }
        };

        let handle = registry.create_instance(url, subscribers)?;
        info!(handle, url, "bridge channel created");

        Ok(BridgeChannel {
            registry,
            url: url.to_string(),
            handle,
            shared,
        })
    }

    pub fn handle(&self) -> BridgeHandle {
        self.handle
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TransportChannel for BridgeChannel {
    fn connect(&self) -> TransportResult<()> {
        if self.is_connected() || self.registry.is_connecting(self.handle) {
            return Ok(());
        }
        self.registry.connect(self.handle)
    }

    /// Requests closure. A connect still waiting for its open is cancelled
    /// too.
    fn disconnect(&self) -> TransportResult<()> {
        if !self.is_connected() && !self.registry.is_connecting(self.handle) {
            return Ok(());
        }
        self.registry.disconnect(self.handle)
    }

    fn is_connected(&self) -> bool {
        self.registry.is_connected(self.handle)
    }

    fn send(&self, frame: &[u8]) -> TransportResult<usize> {
        if !self.is_connected() {
            return Err(NetworkError::NotConnected);
        }
        self.registry.send(self.handle, frame)?;
        self.shared.stats.record_sent(frame.len());
        debug!(handle = self.handle, bytes = frame.len(), "bridge frame sent");
        Ok(frame.len())
    }

    fn set_listener(&self, listener: Arc<dyn ChannelListener>) {
        self.shared.listener.set(listener);
    }

    fn statistics(&self) -> Arc<NetworkStatistics> {
        self.shared.stats.clone()
    }

    fn kind(&self) -> &'static str {
        "bridge"
    }
}

impl Drop for BridgeChannel {
    fn drop(&mut self) {
        self.registry.retire(self.handle);
    }
}
