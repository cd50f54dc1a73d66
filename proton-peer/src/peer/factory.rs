// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Peer Factory
//!
//! Creates peers from one set of defaults and remembers them weakly, so a
//! single host tick can service every peer the factory made. Dropping a
//! peer is enough to stop servicing it.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{ClientPeer, PeerConfig};
use crate::bridge::BridgeRegistry;
use crate::channel::{ChannelBuilder, PlatformCapabilities, TransportResult};
use crate::statistics::NetworkStatistics;

/// Peer factory with shared defaults and a collective service tick.
pub struct PeerFactory {
    defaults: PeerConfig,
    capabilities: PlatformCapabilities,
    bridge: Option<Arc<BridgeRegistry>>,
    peers: Mutex<Vec<Weak<ClientPeer>>>,
}

impl std::fmt::Debug for PeerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerFactory")
            .field("capabilities", &self.capabilities)
            .field("bridge", &self.bridge.is_some())
            .field("peers", &self.peer_count())
            .finish()
    }
}

impl PeerFactory {
    /// Factory for native platforms.
    pub fn new(defaults: PeerConfig) -> Self {
        PeerFactory {
            defaults,
            capabilities: PlatformCapabilities::native(),
            bridge: None,
            peers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_capabilities(mut self, capabilities: PlatformCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Registry for bridged duplex channels.
    pub fn with_bridge(mut self, registry: Arc<BridgeRegistry>) -> Self {
        self.bridge = Some(registry);
        self
    }

    pub fn defaults(&self) -> &PeerConfig {
        &self.defaults
    }

    /// Exchange peer for the default server address.
    pub fn exchange(&self) -> TransportResult<Arc<ClientPeer>> {
        self.exchange_for(&self.defaults.server_address)
    }

    pub fn exchange_for(&self, server_address: &str) -> TransportResult<Arc<ClientPeer>> {
        let config = PeerConfig {
            server_address: server_address.to_string(),
            ..self.defaults.clone()
        };
        ClientPeer::exchange(config).map(|peer| self.register(peer))
    }

    /// Duplex peer for the default socket address.
    pub fn duplex(&self) -> TransportResult<Arc<ClientPeer>> {
        self.duplex_for(&self.defaults.socket_address)
    }

    /// Duplex peer for `socket_address`. Each peer gets its own statistics.
    pub fn duplex_for(&self, socket_address: &str) -> TransportResult<Arc<ClientPeer>> {
        let config = PeerConfig {
            socket_address: socket_address.to_string(),
            ..self.defaults.clone()
        };
        let mut builder =
            ChannelBuilder::new(self.capabilities, Arc::new(NetworkStatistics::new()));
        if let Some(registry) = &self.bridge {
            builder = builder.with_bridge(registry.clone());
        }
        ClientPeer::duplex_with_builder(config, &builder).map(|peer| self.register(peer))
    }

    fn register(&self, peer: Arc<ClientPeer>) -> Arc<ClientPeer> {
        let mut peers = self.peers.lock();
        peers.retain(|weak| weak.strong_count() > 0);
        peers.push(Arc::downgrade(&peer));
        peer
    }

    /// Peers created here that are still alive.
    pub fn peer_count(&self) -> usize {
        self.peers
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Runs [`ClientPeer::service`] on every live peer and forgets the
    /// dropped ones. Returns how many peers were serviced.
    pub fn service_all(&self, now: Instant) -> usize {
        let live: Vec<Arc<ClientPeer>> = {
            let mut peers = self.peers.lock();
            peers.retain(|weak| weak.strong_count() > 0);
            peers.iter().filter_map(Weak::upgrade).collect()
        };
        // Serviced outside the lock: handlers may create peers.
        for peer in &live {
            peer.service(now);
        }
        live.len()
    }

    /// Runs [`PeerFactory::service_all`] every `interval` on the current
    /// tokio runtime. The task ends once the factory is dropped.
    pub fn spawn_service(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let factory = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(factory) = factory.upgrade() else {
                    break;
                };
                factory.service_all(Instant::now());
            }
            debug!("factory service loop stopped");
        })
    }
}
