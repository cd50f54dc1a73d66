// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Channel Addresses

use url::Url;

use crate::error::NetworkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    Tls,
    Udp,
    Ws,
    Wss,
    Http,
    Https,
}

impl Scheme {
    fn parse(scheme: &str) -> Option<Self> {
        match scheme {
            "tcp" => Some(Scheme::Tcp),
            "tls" => Some(Scheme::Tls),
            "udp" => Some(Scheme::Udp),
            "ws" => Some(Scheme::Ws),
            "wss" => Some(Scheme::Wss),
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            _ => None,
        }
    }

    pub fn is_secure(self) -> bool {
        matches!(self, Scheme::Tls | Scheme::Wss | Scheme::Https)
    }

    fn default_port(self) -> Option<u16> {
        match self {
            Scheme::Ws | Scheme::Http => Some(80),
            Scheme::Wss | Scheme::Https => Some(443),
            Scheme::Tcp | Scheme::Tls | Scheme::Udp => None,
        }
    }
}

/// A parsed server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    url: Url,
}

impl Endpoint {
    /// Parses `url`. Socket schemes (`tcp`, `tls`, `udp`) need an explicit port.
    pub fn parse(url: &str) -> Result<Self, NetworkError> {
        let parsed = Url::parse(url)
            .map_err(|e| NetworkError::InvalidAddress(format!("{}: {}", url, e)))?;

        let scheme = Scheme::parse(parsed.scheme()).ok_or_else(|| {
            NetworkError::InvalidAddress(format!("unsupported scheme: {}", parsed.scheme()))
        })?;

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| NetworkError::InvalidAddress(format!("missing host: {}", url)))?
            .to_string();

        let port = parsed
            .port()
            .or_else(|| scheme.default_port())
            .ok_or_else(|| NetworkError::InvalidAddress(format!("missing port: {}", url)))?;

        Ok(Endpoint {
            scheme,
            host,
            port,
            url: parsed,
        })
    }

    /// `host:port`, suitable for `ToSocketAddrs`.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Host name without IPv6 brackets, for TLS server names.
    pub fn server_name(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}
