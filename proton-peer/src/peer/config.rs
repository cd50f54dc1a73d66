// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Peer Configuration

use std::time::Duration;

use crate::channel::{CertificatePolicy, ChannelConfig};
use crate::protocol::{EncryptionKey, CRYPTO_AES, SERIALIZATION_BINARY};
use crate::reconnect::ReconnectConfig;

/// Default server address for the exchange channel.
pub const DEFAULT_SERVER_ADDRESS: &str = "http://127.0.0.1:8080";

/// Default address for duplex channels.
pub const DEFAULT_SOCKET_ADDRESS: &str = "ws://127.0.0.1:8080/proton/ws";

/// Configuration for a [`super::ClientPeer`].
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Exchange base URL (`http://` or `https://`).
    pub server_address: String,
    /// Duplex URL (`ws`, `wss`, `tcp`, `tls`, `udp`).
    pub socket_address: String,
    /// Operation timeout when the call does not set one.
    pub default_timeout: Duration,
    pub connect_timeout: Duration,
    pub io_timeout: Duration,
    /// Tick of the spawned service loop.
    pub poll_interval: Duration,
    pub auto_reconnect: bool,
    pub reconnect_delay: Duration,
    /// Serialization provider id written on outgoing frames.
    pub serialization: u8,
    /// Encryption provider id used for encrypted sends.
    pub encryption: u8,
    pub certificate_policy: CertificatePolicy,
    /// Upper bound on in-flight duplex operations.
    pub max_pending_operations: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        PeerConfig {
            server_address: DEFAULT_SERVER_ADDRESS.to_string(),
            socket_address: DEFAULT_SOCKET_ADDRESS.to_string(),
            default_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            io_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(16),
            auto_reconnect: true,
            reconnect_delay: Duration::from_secs(5),
            serialization: SERIALIZATION_BINARY,
            encryption: CRYPTO_AES,
            certificate_policy: CertificatePolicy::default(),
            max_pending_operations: 1024,
        }
    }
}

impl PeerConfig {
    /// Exchange-only configuration for `server_address`.
    pub fn exchange(server_address: impl Into<String>) -> Self {
        PeerConfig {
            server_address: server_address.into(),
            ..Default::default()
        }
    }

    /// Duplex configuration for `socket_address`.
    pub fn duplex(socket_address: impl Into<String>) -> Self {
        PeerConfig {
            socket_address: socket_address.into(),
            ..Default::default()
        }
    }

    /// Reads overrides from `PROTON_*` environment variables.
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = PeerConfig::default();

        if let Some(address) = lookup("PROTON_SERVER_ADDRESS") {
            config.server_address = address;
        }
        if let Some(address) = lookup("PROTON_SOCKET_ADDRESS") {
            config.socket_address = address;
        }
        if let Some(secs) = lookup("PROTON_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            config.default_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) =
            lookup("PROTON_RECONNECT_DELAY_SECS").and_then(|v| v.parse::<u64>().ok())
        {
            config.reconnect_delay = Duration::from_secs(secs);
        }
        if let Some(enabled) = lookup("PROTON_AUTO_RECONNECT").and_then(|v| parse_bool(&v)) {
            config.auto_reconnect = enabled;
        }

        config
    }

    pub fn with_certificate_policy(mut self, policy: CertificatePolicy) -> Self {
        self.certificate_policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, auto_reconnect: bool, delay: Duration) -> Self {
        self.auto_reconnect = auto_reconnect;
        self.reconnect_delay = delay;
        self
    }

    pub fn with_providers(mut self, serialization: u8, encryption: u8) -> Self {
        self.serialization = serialization;
        self.encryption = encryption;
        self
    }

    /// Channel settings for the duplex address.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.socket_address.clone(),
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            certificate_policy: self.certificate_policy.clone(),
            ..ChannelConfig::default()
        }
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            auto_reconnect: self.auto_reconnect,
            delay: self.reconnect_delay,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Session credentials passed through to the server unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSession {
    pub session_id: Option<String>,
    /// Bearer token.
    pub token: Option<String>,
    /// Key for encrypted operations.
    pub key: Option<EncryptionKey>,
    /// Server-side reference for `key`, sent with encrypted exchange calls.
    pub key_ref: Option<String>,
}

impl PeerSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_key(mut self, key: EncryptionKey, key_ref: impl Into<String>) -> Self {
        self.key = Some(key);
        self.key_ref = Some(key_ref.into());
        self
    }
}
