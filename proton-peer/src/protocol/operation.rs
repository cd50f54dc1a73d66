// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Operation Types
//!
//! Request and response units of the RPC protocol.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Return code carried by a response.
///
/// `OK` and `OPERATION_INVALID` are reserved; any other value is an
/// application-defined result and is passed to the caller verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReturnCode(pub i16);

impl ReturnCode {
    pub const OK: ReturnCode = ReturnCode(1);
    pub const OPERATION_INVALID: ReturnCode = ReturnCode(-1);

    pub fn is_ok(self) -> bool {
        self == Self::OK
    }

    pub fn is_invalid(self) -> bool {
        self == Self::OPERATION_INVALID
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::OK => write!(f, "OK"),
            Self::OPERATION_INVALID => write!(f, "OPERATION_INVALID"),
            ReturnCode(code) => write!(f, "{}", code),
        }
    }
}

/// Delivery class requested for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Reliability {
    BestEffort,
    #[default]
    Reliable,
    Ordered,
}

impl Reliability {
    /// Two-bit wire value.
    pub fn to_bits(self) -> u8 {
        match self {
            Reliability::BestEffort => 0,
            Reliability::Reliable => 1,
            Reliability::Ordered => 2,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Reliability::BestEffort),
            1 => Some(Reliability::Reliable),
            2 => Some(Reliability::Ordered),
            _ => None,
        }
    }
}

/// Per-call flags.
///
/// `timeout` is local to the sender and never written to the wire; `None`
/// falls back to the peer's default timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendOptions {
    pub encrypted: bool,
    pub reliability: Reliability,
    pub timeout: Option<Duration>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    pub fn reliability(mut self, reliability: Reliability) -> Self {
        self.reliability = reliability;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A client-issued request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub operation_code: String,
    /// Correlation id, assigned by the peer when the request is sent.
    pub request_id: u32,
    #[serde(with = "opaque_bytes")]
    pub parameters: Vec<u8>,
}

impl OperationRequest {
    pub fn new(operation_code: impl Into<String>, parameters: Vec<u8>) -> Self {
        OperationRequest {
            operation_code: operation_code.into(),
            request_id: 0,
            parameters,
        }
    }
}

/// A server-issued (or locally synthesized) response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub operation_code: String,
    /// Request id this response answers.
    pub response_id: u32,
    pub return_code: ReturnCode,
    pub debug_message: Option<String>,
    #[serde(with = "opaque_bytes")]
    pub parameters: Vec<u8>,
}

impl OperationResponse {
    /// Successful response answering `request`.
    pub fn ok(request: &OperationRequest, parameters: Vec<u8>) -> Self {
        OperationResponse {
            operation_code: request.operation_code.clone(),
            response_id: request.request_id,
            return_code: ReturnCode::OK,
            debug_message: None,
            parameters,
        }
    }

    /// Synthesized failure answering `request`.
    pub fn invalid(request: &OperationRequest, debug_message: impl Into<String>) -> Self {
        OperationResponse {
            operation_code: request.operation_code.clone(),
            response_id: request.request_id,
            return_code: ReturnCode::OPERATION_INVALID,
            debug_message: Some(debug_message.into()),
            parameters: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.return_code.is_ok()
    }
}

/// Either half of an RPC exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Request(OperationRequest),
    Response(OperationResponse),
}

impl Operation {
    pub fn operation_code(&self) -> &str {
        match self {
            Operation::Request(req) => &req.operation_code,
            Operation::Response(resp) => &resp.operation_code,
        }
    }

    /// Request id for requests, answered id for responses.
    pub fn correlation_id(&self) -> u32 {
        match self {
            Operation::Request(req) => req.request_id,
            Operation::Response(resp) => resp.response_id,
        }
    }
}

impl From<OperationRequest> for Operation {
    fn from(req: OperationRequest) -> Self {
        Operation::Request(req)
    }
}

impl From<OperationResponse> for Operation {
    fn from(resp: OperationResponse) -> Self {
        Operation::Response(resp)
    }
}

/// Serde helper for opaque parameter bytes.
///
/// Base64 text for human-readable formats, raw bytes otherwise.
mod opaque_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
        } else {
            bytes.serialize(serializer)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            base64::engine::general_purpose::STANDARD
                .decode(&s)
                .map_err(serde::de::Error::custom)
        } else {
            Vec::<u8>::deserialize(deserializer)
        }
    }
}
