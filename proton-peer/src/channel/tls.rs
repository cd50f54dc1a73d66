// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Certificate Policy
//!
//! Decides which server certificates secured channels accept. Pins are
//! SHA-256 fingerprints of DER-encoded certificates, checked during the
//! handshake so nothing is written to a server that fails the policy.
//!
//! Socket channels support both native-tls and rustls TLS backends; the
//! exchange channel always uses rustls.

use std::fmt;
use std::net::TcpStream;
use std::sync::Arc;

use ring::digest;
use tungstenite::stream::MaybeTlsStream;

use crate::error::NetworkError;

/// Which server certificates to trust.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CertificatePolicy {
    /// Regular chain validation against the platform/webpki roots.
    #[default]
    SystemRoots,
    /// Accept any certificate. Only for development servers.
    AcceptAll,
    /// Accept only certificates matching one of the pins.
    Pinned(Vec<PinnedCertificate>),
}

impl CertificatePolicy {
    /// Checks a presented leaf certificate against the policy.
    ///
    /// `SystemRoots` always passes here; chain validation happens in the
    /// TLS stack.
    pub fn check(&self, cert_der: Option<&[u8]>) -> Result<(), NetworkError> {
        match self {
            CertificatePolicy::SystemRoots | CertificatePolicy::AcceptAll => Ok(()),
            CertificatePolicy::Pinned(pins) => match cert_der {
                Some(der) if verify_pin(der, pins) => Ok(()),
                Some(_) => Err(NetworkError::ConnectionFailed(
                    "server certificate does not match any pin".into(),
                )),
                None => Err(NetworkError::ConnectionFailed(
                    "server presented no certificate".into(),
                )),
            },
        }
    }
}

/// A pinned certificate fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedCertificate {
    /// SHA-256 fingerprint of the DER-encoded certificate.
    pub sha256_fingerprint: [u8; 32],
}

impl PinnedCertificate {
    /// Creates a new pinned certificate from a known SHA-256 fingerprint.
    pub fn new(sha256_fingerprint: [u8; 32]) -> Self {
        PinnedCertificate { sha256_fingerprint }
    }

    /// Fingerprints DER-encoded certificate bytes.
    pub fn from_der(cert_der: &[u8]) -> Self {
        let hash = digest::digest(&digest::SHA256, cert_der);
        let mut fingerprint = [0u8; 32];
        fingerprint.copy_from_slice(hash.as_ref());
        PinnedCertificate {
            sha256_fingerprint: fingerprint,
        }
    }

    /// Parses a hex fingerprint, with or without `:` separators.
    pub fn from_hex(fingerprint: &str) -> Result<Self, NetworkError> {
        let cleaned: String = fingerprint.chars().filter(|c| *c != ':').collect();
        let bytes = hex::decode(&cleaned)
            .map_err(|e| NetworkError::InvalidAddress(format!("bad pin: {}", e)))?;
        let sha256_fingerprint: [u8; 32] = bytes
            .try_into()
            .map_err(|_| NetworkError::InvalidAddress("pin must be 32 bytes".into()))?;
        Ok(PinnedCertificate { sha256_fingerprint })
    }
}

impl fmt::Display for PinnedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.sha256_fingerprint))
    }
}

/// Returns `true` if the certificate matches any pin, `false` otherwise
/// (including for an empty pin list).
pub fn verify_pin(cert_der: &[u8], pins: &[PinnedCertificate]) -> bool {
    if pins.is_empty() {
        return false;
    }

    let cert_pin = PinnedCertificate::from_der(cert_der);
    pins.iter().any(|pin| pin == &cert_pin)
}

/// rustls client settings enforcing `policy` inside the handshake.
///
/// `None` for `SystemRoots`: regular chain validation applies.
pub(crate) fn policy_client_config(
    policy: &CertificatePolicy,
) -> Result<Option<rustls::ClientConfig>, NetworkError> {
    if matches!(policy, CertificatePolicy::SystemRoots) {
        return Ok(None);
    }
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| NetworkError::ConnectionFailed(format!("TLS setup failed: {}", e)))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(PolicyVerifier::new(policy.clone())))
        .with_no_client_auth();
    Ok(Some(config))
}

/// Wraps a connected TCP stream in TLS according to `policy`.
#[cfg(all(feature = "network-native-tls", not(feature = "network-rustls")))]
pub(crate) fn connect_stream(
    host: &str,
    tcp_stream: TcpStream,
    policy: &CertificatePolicy,
) -> Result<MaybeTlsStream<TcpStream>, NetworkError> {
    use native_tls::TlsConnector;

    let mut builder = TlsConnector::builder();
    if !matches!(policy, CertificatePolicy::SystemRoots) {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }
    let connector = builder
        .build()
        .map_err(|e| NetworkError::ConnectionFailed(format!("TLS error: {}", e)))?;

    let tls_stream = connector
        .connect(host, tcp_stream)
        .map_err(|e| NetworkError::ConnectionFailed(format!("TLS handshake failed: {}", e)))?;

    if let CertificatePolicy::Pinned(_) = policy {
        let der = tls_stream
            .peer_certificate()
            .ok()
            .flatten()
            .and_then(|cert| cert.to_der().ok());
        policy.check(der.as_deref())?;
    }

    Ok(MaybeTlsStream::NativeTls(tls_stream))
}

/// Wraps a connected TCP stream in TLS according to `policy`.
#[cfg(feature = "network-rustls")]
pub(crate) fn connect_stream(
    host: &str,
    tcp_stream: TcpStream,
    policy: &CertificatePolicy,
) -> Result<MaybeTlsStream<TcpStream>, NetworkError> {
    use rustls::pki_types::ServerName;

    let config = match policy_client_config(policy)? {
        Some(config) => config,
        None => {
            let mut root_store = rustls::RootCertStore::empty();
            root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth()
        }
    };

    let server_name: ServerName<'_> = host
        .try_into()
        .map_err(|_| NetworkError::ConnectionFailed(format!("Invalid server name: {}", host)))?;

    let tls_conn = rustls::ClientConnection::new(Arc::new(config), server_name.to_owned())
        .map_err(|e| NetworkError::ConnectionFailed(format!("TLS setup failed: {}", e)))?;

    Ok(MaybeTlsStream::Rustls(rustls::StreamOwned::new(
        tls_conn, tcp_stream,
    )))
}

/// No TLS backend compiled in.
#[cfg(not(any(feature = "network-native-tls", feature = "network-rustls")))]
pub(crate) fn connect_stream(
    _host: &str,
    _tcp_stream: TcpStream,
    _policy: &CertificatePolicy,
) -> Result<MaybeTlsStream<TcpStream>, NetworkError> {
    Err(NetworkError::Unsupported(
        "built without a TLS backend".into(),
    ))
}

/// Certificate verifier applying `AcceptAll` or `Pinned`.
///
/// Handshake signatures are still checked, so a pinned certificate proves
/// possession of its key.
#[derive(Debug)]
struct PolicyVerifier {
    policy: CertificatePolicy,
    algorithms: rustls::crypto::WebPkiSupportedAlgorithms,
}

impl PolicyVerifier {
    fn new(policy: CertificatePolicy) -> Self {
        PolicyVerifier {
            policy,
            algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        }
    }
}

impl rustls::client::danger::ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        self.policy
            .check(Some(end_entity.as_ref()))
            .map_err(|e| rustls::Error::General(e.to_string()))?;
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &rustls::pki_types::CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_der_is_deterministic() {
        let cert_der = b"fake DER-encoded certificate data";
        assert_eq!(
            PinnedCertificate::from_der(cert_der),
            PinnedCertificate::from_der(cert_der)
        );
    }

    #[test]
    fn test_verify_pin() {
        let cert = b"server certificate";
        let pin = PinnedCertificate::from_der(cert);

        assert!(verify_pin(cert, &[pin.clone()]));
        assert!(!verify_pin(b"other certificate", &[pin]));
        assert!(!verify_pin(cert, &[]));
    }

    #[test]
    fn test_hex_round_trip() {
        let pin = PinnedCertificate::new([0xAB; 32]);
        let text = pin.to_string();
        assert_eq!(text.len(), 64);
        assert_eq!(PinnedCertificate::from_hex(&text).unwrap(), pin);

        let with_colons = text
            .as_bytes()
            .chunks(2)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join(":");
        assert_eq!(PinnedCertificate::from_hex(&with_colons).unwrap(), pin);
    }

    #[test]
    fn test_policy_check() {
        let cert = b"leaf";
        let pinned = CertificatePolicy::Pinned(vec![PinnedCertificate::from_der(cert)]);

        assert!(pinned.check(Some(cert)).is_ok());
        assert!(pinned.check(Some(b"impostor")).is_err());
        assert!(pinned.check(None).is_err());
        assert!(CertificatePolicy::AcceptAll.check(None).is_ok());
    }

    #[test]
    fn test_verifier_rejects_unpinned_leaf_in_handshake() {
        use rustls::client::danger::ServerCertVerifier;
        use rustls::pki_types::{CertificateDer, ServerName, UnixTime};

        let verifier = PolicyVerifier::new(CertificatePolicy::Pinned(vec![
            PinnedCertificate::from_der(b"leaf"),
        ]));
        let name = ServerName::try_from("rpc.example").unwrap();
        let verify = |der: &[u8]| {
            verifier.verify_server_cert(
                &CertificateDer::from(der.to_vec()),
                &[],
                &name,
                &[],
                UnixTime::now(),
            )
        };

        assert!(verify(b"leaf").is_ok());
        assert!(verify(b"impostor").is_err());
    }

    #[test]
    fn test_system_roots_keep_default_tls() {
        assert!(policy_client_config(&CertificatePolicy::SystemRoots)
            .unwrap()
            .is_none());
        assert!(policy_client_config(&CertificatePolicy::AcceptAll)
            .unwrap()
            .is_some());
    }
}
