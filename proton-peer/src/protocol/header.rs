// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Frame Header
//!
//! Fixed 10-byte header, big endian:
//!
//! | offset | size | field |
//! |---|---|---|
//! | 0 | 1 | magic `0x50` |
//! | 1 | 1 | operation type (0 request, 1 response) |
//! | 2 | 1 | serialization provider id |
//! | 3 | 1 | crypto provider id (0 = none) |
//! | 4 | 1 | flags (bit 0 encrypted, bits 1..2 reliability) |
//! | 5 | 1 | reserved |
//! | 6 | 4 | payload length |

use super::crypto::CRYPTO_NONE;
use super::operation::{Reliability, SendOptions};
use super::CodecError;

pub const HEADER_LEN: usize = 10;
pub const HEADER_MAGIC: u8 = 0x50;

const FLAG_ENCRYPTED: u8 = 0b0000_0001;
const RELIABILITY_SHIFT: u8 = 1;
const RELIABILITY_MASK: u8 = 0b0000_0110;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Request,
    Response,
}

impl OperationType {
    fn to_byte(self) -> u8 {
        match self {
            OperationType::Request => 0,
            OperationType::Response => 1,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(OperationType::Request),
            1 => Some(OperationType::Response),
            _ => None,
        }
    }
}

/// Wire metadata preceding a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub operation_type: OperationType,
    pub serialization: u8,
    /// Crypto provider id, [`CRYPTO_NONE`] for plaintext payloads.
    pub crypto: u8,
    pub reliability: Reliability,
    pub payload_len: u32,
}

impl Header {
    /// Builds a header for `options`. The crypto id is only kept when
    /// `options.encrypted` is set.
    pub fn new(
        operation_type: OperationType,
        serialization: u8,
        crypto: u8,
        options: &SendOptions,
    ) -> Self {
        Header {
            operation_type,
            serialization,
            crypto: if options.encrypted { crypto } else { CRYPTO_NONE },
            reliability: options.reliability,
            payload_len: 0,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.crypto != CRYPTO_NONE
    }

    /// Send options recoverable from the wire (no timeout).
    pub fn send_options(&self) -> SendOptions {
        SendOptions {
            encrypted: self.is_encrypted(),
            reliability: self.reliability,
            timeout: None,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut flags = self.reliability.to_bits() << RELIABILITY_SHIFT;
        if self.is_encrypted() {
            flags |= FLAG_ENCRYPTED;
        }

        let mut out = [0u8; HEADER_LEN];
        out[0] = HEADER_MAGIC;
        out[1] = self.operation_type.to_byte();
        out[2] = self.serialization;
        out[3] = self.crypto;
        out[4] = flags;
        out[5] = 0;
        out[6..10].copy_from_slice(&self.payload_len.to_be_bytes());
        out
    }

    /// Parses the header and returns the payload slice that follows it.
    ///
    /// Fails fast without looking at the payload contents.
    pub fn parse(frame: &[u8]) -> Result<(Header, &[u8]), CodecError> {
        if frame.len() < HEADER_LEN {
            return Err(CodecError::MalformedHeader(format!(
                "frame too short: {} bytes",
                frame.len()
            )));
        }
        if frame[0] != HEADER_MAGIC {
            return Err(CodecError::MalformedHeader(format!(
                "bad magic 0x{:02x}",
                frame[0]
            )));
        }

        let operation_type = OperationType::from_byte(frame[1]).ok_or_else(|| {
            CodecError::MalformedHeader(format!("unknown operation type {}", frame[1]))
        })?;
        let serialization = frame[2];
        let crypto = frame[3];
        let flags = frame[4];

        let encrypted = flags & FLAG_ENCRYPTED != 0;
        if encrypted != (crypto != CRYPTO_NONE) {
            return Err(CodecError::MalformedHeader(
                "encrypted flag disagrees with crypto provider".into(),
            ));
        }

        let reliability = Reliability::from_bits((flags & RELIABILITY_MASK) >> RELIABILITY_SHIFT)
            .ok_or_else(|| CodecError::MalformedHeader("unknown reliability class".into()))?;

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&frame[6..10]);
        let payload_len = u32::from_be_bytes(len_bytes);

        let payload = &frame[HEADER_LEN..];
        if payload.len() != payload_len as usize {
            return Err(CodecError::MalformedHeader(format!(
                "payload length {} does not match {} bytes present",
                payload_len,
                payload.len()
            )));
        }

        Ok((
            Header {
                operation_type,
                serialization,
                crypto,
                reliability,
                payload_len,
            },
            payload,
        ))
    }
}
