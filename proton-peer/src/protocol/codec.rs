// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Protocol Codec
//!
//! Encoding writes the header, then the serialized (and optionally
//! encrypted) payload. Decoding is two-phase: [`ProtocolCodec::decode`]
//! recovers the header and payload slice without touching the providers,
//! [`ProtocolCodec::deserialize_operation`] does the expensive part.

use std::collections::HashMap;
use std::sync::Arc;

use super::crypto::{AesGcmProvider, CryptoProvider, EncryptionKey, XChaCha20Provider, CRYPTO_AES};
use super::header::{Header, OperationType, HEADER_LEN};
use super::operation::{Operation, SendOptions};
use super::serialization::{
    BinarySerializer, JsonSerializer, SerializationProvider, SERIALIZATION_BINARY,
};
use super::CodecError;

/// Frame encoder/decoder with pluggable providers.
///
/// Decoding accepts any registered provider named by a frame's header; the
/// configured provider ids only govern what this side writes.
#[derive(Clone)]
pub struct ProtocolCodec {
    serializers: HashMap<u8, Arc<dyn SerializationProvider>>,
    cryptos: HashMap<u8, Arc<dyn CryptoProvider>>,
    serialization: u8,
    encryption: u8,
}

impl std::fmt::Debug for ProtocolCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut serializers: Vec<_> = self.serializers.keys().copied().collect();
        serializers.sort_unstable();
        let mut cryptos: Vec<_> = self.cryptos.keys().copied().collect();
        cryptos.sort_unstable();
        f.debug_struct("ProtocolCodec")
            .field("serializers", &serializers)
            .field("cryptos", &cryptos)
            .field("serialization", &self.serialization)
            .field("encryption", &self.encryption)
            .finish()
    }
}

impl Default for ProtocolCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolCodec {
    /// Codec with the built-in providers, writing binary payloads and
    /// encrypting with AES-256-GCM.
    pub fn new() -> Self {
        let mut codec = ProtocolCodec {
            serializers: HashMap::new(),
            cryptos: HashMap::new(),
            serialization: SERIALIZATION_BINARY,
            encryption: CRYPTO_AES,
        };
        codec.register_serializer(Arc::new(JsonSerializer));
        codec.register_serializer(Arc::new(BinarySerializer));
        codec.register_crypto(Arc::new(AesGcmProvider));
        codec.register_crypto(Arc::new(XChaCha20Provider));
        codec
    }

    /// Codec with the built-in providers writing with the given ids.
    pub fn with_providers(serialization: u8, encryption: u8) -> Result<Self, CodecError> {
        let mut codec = Self::new();
        codec.select(serialization, encryption)?;
        Ok(codec)
    }

    /// Registers (or replaces) a serialization provider under its id.
    pub fn register_serializer(&mut self, provider: Arc<dyn SerializationProvider>) {
        self.serializers.insert(provider.id(), provider);
    }

    /// Registers (or replaces) a crypto provider under its id.
    pub fn register_crypto(&mut self, provider: Arc<dyn CryptoProvider>) {
        self.cryptos.insert(provider.id(), provider);
    }

    /// Selects the providers used for outbound frames.
    pub fn select(&mut self, serialization: u8, encryption: u8) -> Result<(), CodecError> {
        if !self.serializers.contains_key(&serialization) {
            return Err(CodecError::UnknownSerializationProvider(serialization));
        }
        if !self.cryptos.contains_key(&encryption) {
            return Err(CodecError::UnknownCryptoProvider(encryption));
        }
        self.serialization = serialization;
        self.encryption = encryption;
        Ok(())
    }

    pub fn serialization(&self) -> u8 {
        self.serialization
    }

    pub fn encryption(&self) -> u8 {
        self.encryption
    }

    /// Header this codec would write for `operation` sent with `options`.
    pub fn header_for(&self, operation: &Operation, options: &SendOptions) -> Header {
        let operation_type = match operation {
            Operation::Request(_) => OperationType::Request,
            Operation::Response(_) => OperationType::Response,
        };
        Header::new(operation_type, self.serialization, self.encryption, options)
    }

    /// Encodes `operation` under `header`.
    ///
    /// `header.payload_len` is ignored and recomputed.
    pub fn encode(
        &self,
        operation: &Operation,
        header: &Header,
        key: Option<&EncryptionKey>,
    ) -> Result<Vec<u8>, CodecError> {
        check_type(operation, header)?;

        let serializer = self.serializer(header.serialization)?;
        let mut payload = serializer.serialize(operation)?;

        if header.is_encrypted() {
            let crypto = self.crypto(header.crypto)?;
            let key = key.ok_or(CodecError::MissingKey)?;
            payload = crypto.encrypt(key, &payload)?;
        }

        let payload_len = u32::try_from(payload.len())
            .map_err(|_| CodecError::Serialization("payload exceeds u32 length".into()))?;

        let mut header = *header;
        header.payload_len = payload_len;

        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
        frame.extend_from_slice(&header.to_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Encodes with this codec's own header for `options`.
    pub fn encode_operation(
        &self,
        operation: &Operation,
        options: &SendOptions,
        key: Option<&EncryptionKey>,
    ) -> Result<Vec<u8>, CodecError> {
        let header = self.header_for(operation, options);
        self.encode(operation, &header, key)
    }

    /// First decode phase: header and payload slice.
    ///
    /// Rejects frames naming providers this codec cannot decode, so a frame
    /// can be discarded before any crypto or deserialization work.
    pub fn decode<'a>(&self, frame: &'a [u8]) -> Result<(Header, &'a [u8]), CodecError> {
        let (header, payload) = Header::parse(frame)?;
        self.serializer(header.serialization)?;
        if header.is_encrypted() {
            self.crypto(header.crypto)?;
        }
        Ok((header, payload))
    }

    /// Second decode phase: decrypt when the header says so, deserialize,
    /// and check the operation agrees with the header's operation type.
    pub fn deserialize_operation(
        &self,
        payload: &[u8],
        header: &Header,
        key: Option<&EncryptionKey>,
    ) -> Result<Operation, CodecError> {
        let serializer = self.serializer(header.serialization)?;

        let operation = if header.is_encrypted() {
            let crypto = self.crypto(header.crypto)?;
            let key = key.ok_or(CodecError::MissingKey)?;
            let plaintext = crypto.decrypt(key, payload)?;
            serializer.deserialize(&plaintext)?
        } else {
            serializer.deserialize(payload)?
        };

        check_type(&operation, header)?;
        Ok(operation)
    }

    /// Both decode phases in one call.
    pub fn decode_operation(
        &self,
        frame: &[u8],
        key: Option<&EncryptionKey>,
    ) -> Result<(Header, Operation), CodecError> {
        let (header, payload) = self.decode(frame)?;
        let operation = self.deserialize_operation(payload, &header, key)?;
        Ok((header, operation))
    }

    fn serializer(&self, id: u8) -> Result<&Arc<dyn SerializationProvider>, CodecError> {
        self.serializers
            .get(&id)
            .ok_or(CodecError::UnknownSerializationProvider(id))
    }

    fn crypto(&self, id: u8) -> Result<&Arc<dyn CryptoProvider>, CodecError> {
        self.cryptos
            .get(&id)
            .ok_or(CodecError::UnknownCryptoProvider(id))
    }
}

fn check_type(operation: &Operation, header: &Header) -> Result<(), CodecError> {
    let matches = matches!(
        (operation, header.operation_type),
        (Operation::Request(_), OperationType::Request)
            | (Operation::Response(_), OperationType::Response)
    );
    if matches {
        Ok(())
    } else {
        Err(CodecError::MalformedHeader(format!(
            "operation does not match header type {:?}",
            header.operation_type
        )))
    }
}
