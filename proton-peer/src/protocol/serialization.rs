// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Serialization Providers

use super::operation::Operation;
use super::CodecError;

pub const SERIALIZATION_JSON: u8 = 1;
pub const SERIALIZATION_BINARY: u8 = 2;

/// Turns an [`Operation`] into payload bytes and back.
///
/// Implementations are selected per frame by the id written into the header,
/// so `id()` must be stable and unique within a codec.
pub trait SerializationProvider: Send + Sync {
    fn id(&self) -> u8;

    fn name(&self) -> &'static str;

    fn serialize(&self, operation: &Operation) -> Result<Vec<u8>, CodecError>;

    fn deserialize(&self, bytes: &[u8]) -> Result<Operation, CodecError>;
}

/// JSON payloads (`serde_json`). Parameters are base64 text.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl SerializationProvider for JsonSerializer {
    fn id(&self) -> u8 {
        SERIALIZATION_JSON
    }

    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, operation: &Operation) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(operation).map_err(|e| CodecError::Serialization(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Operation, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
    }
}

/// Compact binary payloads (`bincode`). The default provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinarySerializer;

impl SerializationProvider for BinarySerializer {
    fn id(&self) -> u8 {
        SERIALIZATION_BINARY
    }

    fn name(&self) -> &'static str {
        "binary"
    }

    fn serialize(&self, operation: &Operation) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(operation).map_err(|e| CodecError::Serialization(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Operation, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
    }
}
