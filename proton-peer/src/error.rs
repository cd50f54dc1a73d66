// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Error Types
//!
//! Transport-level failures. Codec failures live in
//! [`crate::protocol::CodecError`] and are wrapped here when they surface
//! through a channel.

use thiserror::Error;

use crate::protocol::CodecError;

/// Errors raised by channels, the bridge and the reconnect controller.
///
/// None of these reach callers of [`crate::ClientPeer::send_operation`]:
/// the peer converts them into `OPERATION_INVALID` responses.
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Transport not connected")]
    NotConnected,

    #[error("Operation timeout")]
    Timeout,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("HTTP status {0}")]
    Http(u16),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Too many pending operations (limit {0})")]
    TooManyPending(usize),
}

impl NetworkError {
    /// Returns true for failures a reconnect attempt may cure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NetworkError::ConnectionFailed(_)
                | NetworkError::ConnectionClosed
                | NetworkError::NotConnected
                | NetworkError::Timeout
                | NetworkError::SendFailed(_)
                | NetworkError::ReceiveFailed(_)
        )
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => NetworkError::Timeout,
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => NetworkError::ConnectionClosed,
            _ => NetworkError::ConnectionFailed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let errors = vec![
            (
                NetworkError::ConnectionFailed("refused".into()),
                "Connection failed: refused",
            ),
            (NetworkError::ConnectionClosed, "Connection closed"),
            (NetworkError::Timeout, "Operation timeout"),
            (NetworkError::NotConnected, "Transport not connected"),
            (NetworkError::Http(503), "HTTP status 503"),
        ];

        for (error, expected) in errors {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_mapping() {
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert!(matches!(NetworkError::from(timed_out), NetworkError::Timeout));

        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(
            NetworkError::from(reset),
            NetworkError::ConnectionClosed
        ));

        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            NetworkError::from(refused),
            NetworkError::ConnectionFailed(_)
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(NetworkError::ConnectionClosed.is_transient());
        assert!(!NetworkError::Unsupported("udp".into()).is_transient());
        assert!(!NetworkError::TooManyPending(8).is_transient());
    }
}
