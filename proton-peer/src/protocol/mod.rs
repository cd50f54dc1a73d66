// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! RPC Protocol
//!
//! Frame layout: `[Header (10 bytes)][Payload]`. The payload is the output of
//! a serialization provider, optionally passed through a crypto provider.
//! Both providers are named by id bytes in the header.

mod codec;
mod crypto;
mod header;
mod operation;
mod serialization;

pub use codec::ProtocolCodec;
pub use crypto::{
    AesGcmProvider, CryptoProvider, EncryptionError, EncryptionKey, XChaCha20Provider, CRYPTO_AES,
    CRYPTO_NONE, CRYPTO_XCHACHA20,
};
pub use header::{Header, OperationType, HEADER_LEN, HEADER_MAGIC};
pub use operation::{
    Operation, OperationRequest, OperationResponse, Reliability, ReturnCode, SendOptions,
};
pub use serialization::{
    BinarySerializer, JsonSerializer, SerializationProvider, SERIALIZATION_BINARY,
    SERIALIZATION_JSON,
};

use thiserror::Error;

/// Codec errors.
///
/// Everything except [`CodecError::Crypto`] is a protocol error: the frame
/// itself is malformed or names something this peer cannot decode.
#[derive(Error, Debug, Clone)]
pub enum CodecError {
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Unknown serialization provider: {0}")]
    UnknownSerializationProvider(u8),

    #[error("Unknown crypto provider: {0}")]
    UnknownCryptoProvider(u8),

    #[error("Encrypted frame requires a key")]
    MissingKey,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] EncryptionError),
}

impl CodecError {
    /// True when the frame was well formed but could not be decrypted.
    pub fn is_crypto(&self) -> bool {
        matches!(self, CodecError::Crypto(_))
    }
}
