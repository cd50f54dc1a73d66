// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Channel Builder
//!
//! Picks the duplex channel variant for an address from what the platform
//! can do.

use std::sync::Arc;

use tracing::debug;

use super::address::{Endpoint, Scheme};
use super::bridge::BridgeChannel;
use super::socket::{TcpChannel, UdpChannel};
use super::websocket::WebSocketChannel;
use super::{ChannelConfig, TransportChannel, TransportResult};
use crate::bridge::BridgeRegistry;
use crate::error::NetworkError;
use crate::statistics::NetworkStatistics;

/// What the host platform offers for duplex transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// Real sockets (TCP, UDP, TLS) are available.
    pub native_sockets: bool,
    /// A handle-addressed host bridge is available for WebSockets.
    pub bridge: bool,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self::native()
    }
}

impl PlatformCapabilities {
    pub fn native() -> Self {
        PlatformCapabilities {
            native_sockets: true,
            bridge: false,
        }
    }

    /// Hosts that only reach the network through the bridge.
    pub fn bridged() -> Self {
        PlatformCapabilities {
            native_sockets: false,
            bridge: true,
        }
    }
}

/// Builds duplex channels sharing one statistics sink.
pub struct ChannelBuilder {
    capabilities: PlatformCapabilities,
    bridge: Option<Arc<BridgeRegistry>>,
    stats: Arc<NetworkStatistics>,
}

impl ChannelBuilder {
    pub fn new(capabilities: PlatformCapabilities, stats: Arc<NetworkStatistics>) -> Self {
        ChannelBuilder {
            capabilities,
            bridge: None,
            stats,
        }
    }

    /// Registry used for bridged channels.
    pub fn with_bridge(mut self, registry: Arc<BridgeRegistry>) -> Self {
        self.bridge = Some(registry);
        self
    }

    pub fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    /// Builds the channel for `config.url`.
    ///
    /// Without native sockets, `tcp`/`tls`/`udp` are rejected and `ws`/`wss`
    /// go through the bridge.
    pub fn build(&self, config: ChannelConfig) -> TransportResult<Arc<dyn TransportChannel>> {
        let endpoint = Endpoint::parse(&config.url)?;
        let stats = self.stats.clone();

        let channel: Arc<dyn TransportChannel> = match endpoint.scheme {
            Scheme::Http | Scheme::Https => {
                return Err(NetworkError::Unsupported(
                    "http addresses use the exchange channel".into(),
                ))
            }
            Scheme::Ws | Scheme::Wss if self.capabilities.native_sockets => {
                Arc::new(WebSocketChannel::new(config, stats)?)
            }
            Scheme::Ws | Scheme::Wss => match (&self.bridge, self.capabilities.bridge) {
                (Some(registry), true) => {
                    Arc::new(BridgeChannel::new(registry.clone(), &config.url, stats)?)
                }
                _ => {
                    return Err(NetworkError::Unsupported(
                        "no native sockets and no bridge available".into(),
                    ))
                }
            },
            Scheme::Tcp | Scheme::Tls | Scheme::Udp if !self.capabilities.native_sockets => {
                return Err(NetworkError::Unsupported(format!(
                    "{:?} needs native sockets on this platform, use ws or wss",
                    endpoint.scheme
                )))
            }
            Scheme::Tcp | Scheme::Tls => Arc::new(TcpChannel::new(config, stats)?),
            Scheme::Udp => Arc::new(UdpChannel::new(config, stats)?),
        };

        debug!(kind = channel.kind(), url = endpoint.as_str(), "channel built");
        Ok(channel)
    }
}
