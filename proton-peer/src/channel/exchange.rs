// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Exchange Channel
//!
//! Request/response transport: one HTTP round trip per operation, plus the
//! liveness check and the server clock query. There is no connection state,
//! so this is not a [`super::TransportChannel`].
//!
//! Statistics count operation calls only; the liveness check and the clock
//! query are not recorded.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::address::{Endpoint, Scheme};
use super::tls::{self, CertificatePolicy};
use super::TransportResult;
use crate::error::NetworkError;
use crate::statistics::NetworkStatistics;

/// Operation endpoint, relative to the server address.
pub const API_PATH: &str = "/proton/api";
/// Liveness check endpoint.
pub const PING_PATH: &str = "/proton/ping";
/// Server clock endpoint (plain-text milliseconds).
pub const SERVER_TIME_PATH: &str = "/proton/getts";

const RPC_CONTENT_TYPE: &str = "application/x-proton-rpc";
const SESSION_HEADER: &str = "X-Session-Id";
const ENCRYPT_KEY_HEADER: &str = "X-Encrypt-Key";

/// Per-call metadata, passed through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeHeaders {
    pub session_id: Option<String>,
    pub token: Option<String>,
    /// Only sent for encrypted requests.
    pub encrypt_key: Option<String>,
}

/// HTTP exchange channel.
pub struct ExchangeChannel {
    base_url: String,
    client: Client,
    policy: CertificatePolicy,
    stats: Arc<NetworkStatistics>,
}

impl ExchangeChannel {
    /// Creates a channel for `server_address` (`http://` or `https://`).
    pub fn new(
        server_address: &str,
        policy: CertificatePolicy,
        connect_timeout: Duration,
        stats: Arc<NetworkStatistics>,
    ) -> TransportResult<Self> {
        let endpoint = Endpoint::parse(server_address)?;
        if !matches!(endpoint.scheme, Scheme::Http | Scheme::Https) {
            return Err(NetworkError::InvalidAddress(format!(
                "expected http:// or https://, got {}",
                server_address
            )));
        }

        let mut builder = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(format!(
                "proton-peer/{}",
                option_env!("CARGO_PKG_VERSION").unwrap_or("0.1.0")
            ));
        // Pins are enforced in the handshake, before any header is written.
        if let Some(tls_config) = tls::policy_client_config(&policy)? {
            builder = builder.use_preconfigured_tls(tls_config);
        }

        let client = builder
            .build()
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        Ok(ExchangeChannel {
            base_url: server_address.trim_end_matches('/').to_string(),
            client,
            policy,
            stats,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn statistics(&self) -> Arc<NetworkStatistics> {
        self.stats.clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn certificate_policy(&self) -> &CertificatePolicy {
        &self.policy
    }

    /// POSTs one frame to the operation endpoint and returns the body.
    ///
    /// The frame counts as sent once the server answered, whatever the
    /// status: `Ok`, [`NetworkError::Http`] and [`NetworkError::ReceiveFailed`]
    /// all mean it went out.
    pub async fn execute(
        &self,
        frame: Vec<u8>,
        headers: &ExchangeHeaders,
        timeout: Duration,
    ) -> TransportResult<Vec<u8>> {
        let sent = frame.len();
        let mut request = self
            .client
            .post(self.url(API_PATH))
            .timeout(timeout)
            .header(CONTENT_TYPE, RPC_CONTENT_TYPE)
            .body(frame);

        if let Some(session_id) = &headers.session_id {
            request = request.header(SESSION_HEADER, session_id);
        }
        if let Some(token) = &headers.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(key) = &headers.encrypt_key {
            request = request.header(ENCRYPT_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        self.stats.record_sent(sent);

        let status = response.status();
        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "exchange call rejected");
            return Err(NetworkError::Http(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::ReceiveFailed(e.to_string()))?;
        self.stats.record_received(body.len());
        debug!(sent, received = body.len(), "exchange call completed");
        Ok(body.to_vec())
    }

    /// Liveness check: true iff the server answers 200 within `timeout`.
    pub async fn ping(&self, timeout: Duration) -> bool {
        match self
            .client
            .get(self.url(PING_PATH))
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!(error = %e, "ping failed");
                false
            }
        }
    }

    /// Server clock in milliseconds since the Unix epoch.
    pub async fn server_time(&self, timeout: Duration) -> TransportResult<i64> {
        let response = self
            .client
            .get(self.url(SERVER_TIME_PATH))
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(NetworkError::Http(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| NetworkError::ReceiveFailed(e.to_string()))?;

        body.trim()
            .parse::<i64>()
            .map_err(|e| NetworkError::ReceiveFailed(format!("bad timestamp {:?}: {}", body, e)))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout
    } else if err.is_connect() {
        NetworkError::ConnectionFailed(err.to_string())
    } else {
        NetworkError::SendFailed(err.to_string())
    }
}
