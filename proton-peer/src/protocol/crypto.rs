// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Crypto Providers (AES-256-GCM / XChaCha20-Poly1305)
//!
//! Payload format for both providers: `nonce || ciphertext || tag`.
//!   - AES-256-GCM: 12-byte nonce, 16-byte tag
//!   - XChaCha20-Poly1305: 24-byte nonce, 16-byte tag
//!
//! The algorithm is named by the crypto id in the frame header, so unlike
//! at-rest formats the ciphertext carries no algorithm tag of its own.

use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::XChaCha20Poly1305;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroize;

pub const CRYPTO_NONE: u8 = 0;
pub const CRYPTO_AES: u8 = 1;
pub const CRYPTO_XCHACHA20: u8 = 2;

const AES_GCM_NONCE_SIZE: usize = 12;
const XCHACHA20_NONCE_SIZE: usize = 24;
const TAG_SIZE: usize = 16;

/// Encryption error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Decryption failed: data may be corrupted or wrong key")]
    DecryptionFailed,
    #[error("Ciphertext too short")]
    CiphertextTooShort,
    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
}

/// 256-bit session key shared with the server.
#[derive(Clone)]
pub struct EncryptionKey {
    bytes: [u8; 32],
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes[..].ct_eq(&other.bytes[..]).into()
    }
}

impl Eq for EncryptionKey {}

impl EncryptionKey {
    /// Generates a new random key.
    pub fn generate() -> Result<Self, EncryptionError> {
        let rng = SystemRandom::new();
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes)
            .map_err(|_| EncryptionError::EncryptionFailed)?;
        Ok(EncryptionKey { bytes })
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        EncryptionKey { bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, EncryptionError> {
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EncryptionError::InvalidKeyLength(bytes.len()))?;
        Ok(EncryptionKey { bytes })
    }

    /// Parses the base64 form used in session configuration.
    pub fn from_base64(encoded: &str) -> Result<Self, EncryptionError> {
        let mut decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| EncryptionError::InvalidKeyLength(0))?;
        let key = Self::from_slice(&decoded);
        decoded.zeroize();
        key
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// Encrypts and decrypts payload bytes for one algorithm.
pub trait CryptoProvider: Send + Sync {
    fn id(&self) -> u8;

    fn name(&self) -> &'static str;

    fn encrypt(&self, key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError>;

    fn decrypt(&self, key: &EncryptionKey, ciphertext: &[u8])
        -> Result<Vec<u8>, EncryptionError>;
}

/// AES-256-GCM via `ring`. The default provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmProvider;

impl CryptoProvider for AesGcmProvider {
    fn id(&self) -> u8 {
        CRYPTO_AES
    }

    fn name(&self) -> &'static str {
        "aes-256-gcm"
    }

    fn encrypt(&self, key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let rng = SystemRandom::new();

        let mut nonce_bytes = [0u8; AES_GCM_NONCE_SIZE];
        rng.fill(&mut nonce_bytes)
            .map_err(|_| EncryptionError::EncryptionFailed)?;

        let unbound_key = UnboundKey::new(&AES_256_GCM, key.as_bytes())
            .map_err(|_| EncryptionError::EncryptionFailed)?;
        let sealing_key = LessSafeKey::new(unbound_key);

        let mut in_out = plaintext.to_vec();
        sealing_key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| EncryptionError::EncryptionFailed)?;

        let mut output = Vec::with_capacity(AES_GCM_NONCE_SIZE + in_out.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&in_out);
        Ok(output)
    }

    fn decrypt(
        &self,
        key: &EncryptionKey,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, EncryptionError> {
        if ciphertext.len() < AES_GCM_NONCE_SIZE + AES_256_GCM.tag_len() {
            return Err(EncryptionError::CiphertextTooShort);
        }

        let nonce_bytes: [u8; AES_GCM_NONCE_SIZE] = ciphertext[..AES_GCM_NONCE_SIZE]
            .try_into()
            .map_err(|_| EncryptionError::DecryptionFailed)?;

        let unbound_key = UnboundKey::new(&AES_256_GCM, key.as_bytes())
            .map_err(|_| EncryptionError::DecryptionFailed)?;
        let opening_key = LessSafeKey::new(unbound_key);

        let mut buffer = ciphertext[AES_GCM_NONCE_SIZE..].to_vec();
        let plaintext = opening_key
            .open_in_place(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut buffer,
            )
            .map_err(|_| EncryptionError::DecryptionFailed)?;

        Ok(plaintext.to_vec())
    }
}

/// XChaCha20-Poly1305 via `chacha20poly1305`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XChaCha20Provider;

impl CryptoProvider for XChaCha20Provider {
    fn id(&self) -> u8 {
        CRYPTO_XCHACHA20
    }

    fn name(&self) -> &'static str {
        "xchacha20-poly1305"
    }

    fn encrypt(&self, key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let rng = SystemRandom::new();

        let mut nonce_bytes = [0u8; XCHACHA20_NONCE_SIZE];
        rng.fill(&mut nonce_bytes)
            .map_err(|_| EncryptionError::EncryptionFailed)?;

        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
        let ciphertext = cipher
            .encrypt(chacha20poly1305::XNonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| EncryptionError::EncryptionFailed)?;

        let mut output = Vec::with_capacity(XCHACHA20_NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    fn decrypt(
        &self,
        key: &EncryptionKey,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, EncryptionError> {
        if ciphertext.len() < XCHACHA20_NONCE_SIZE + TAG_SIZE {
            return Err(EncryptionError::CiphertextTooShort);
        }

        let nonce = chacha20poly1305::XNonce::from_slice(&ciphertext[..XCHACHA20_NONCE_SIZE]);
        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

        cipher
            .decrypt(nonce, &ciphertext[XCHACHA20_NONCE_SIZE..])
            .map_err(|_| EncryptionError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn providers() -> Vec<Box<dyn CryptoProvider>> {
        vec![Box::new(AesGcmProvider), Box::new(XChaCha20Provider)]
    }

    #[test]
    fn test_encrypt_decrypt() {
        let key = EncryptionKey::generate().unwrap();
        for provider in providers() {
            let ct = provider.encrypt(&key, b"secret parameters").unwrap();
            assert_ne!(&ct[..], b"secret parameters");
            assert_eq!(provider.decrypt(&key, &ct).unwrap(), b"secret parameters");
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = EncryptionKey::generate().unwrap();
        let other = EncryptionKey::generate().unwrap();
        for provider in providers() {
            let ct = provider.encrypt(&key, b"payload").unwrap();
            assert_eq!(
                provider.decrypt(&other, &ct),
                Err(EncryptionError::DecryptionFailed)
            );
        }
    }

    #[test]
    fn test_short_ciphertext_rejected() {
        let key = EncryptionKey::from_bytes([7; 32]);
        for provider in providers() {
            assert_eq!(
                provider.decrypt(&key, &[0u8; 8]),
                Err(EncryptionError::CiphertextTooShort)
            );
        }
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = EncryptionKey::from_bytes([0xAB; 32]);
        let debug = format!("{:?}", key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("171"));
    }

    #[test]
    fn test_key_equality() {
        let key = EncryptionKey::from_bytes([3; 32]);
        let mut last_byte = [3; 32];
        last_byte[31] = 4;

        assert_eq!(key, EncryptionKey::from_bytes([3; 32]));
        assert_ne!(key, EncryptionKey::from_bytes(last_byte));
    }

    #[test]
    fn test_key_base64_round_trip() {
        let key = EncryptionKey::generate().unwrap();
        let parsed = EncryptionKey::from_base64(&key.to_base64()).unwrap();
        assert_eq!(parsed, key);

        assert_eq!(
            EncryptionKey::from_slice(&[1, 2, 3]),
            Err(EncryptionError::InvalidKeyLength(3))
        );
    }
}
