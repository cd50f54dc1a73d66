// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Self-Signed TLS Server
//!
//! Answers any HTTPS request with `200 ok` and counts the requests whose
//! bytes it actually read. A client that rejects the certificate aborts the
//! handshake, so nothing it would have sent is counted.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

/// DER certificate for `localhost` / 127.0.0.1 (ECDSA P-256).
const CERT_DER_B64: &str = "MIIBnDCCAUGgAwIBAgIUPPxmdHypzUfG+fAZnQDWeCFsvyMwCgYIKoZIzj0EAwIwFDESMBAGA1UEAwwJbG9jYWxob3N0MCAXDTI2MTAxOTAzMzE0MloYDzIxMjYwOTI1MDMzMTQyWjAUMRIwEAYDVQQDDAlsb2NhbGhvc3QwWTATBgcqhkjOPQIBBggqhkjOPQMBBwNCAAS/PXlwsxWA6vGHWVSnJUObBB6FU4gMmhxnk75oy7yzbeeacmpUpkcafPa3fzSK0jeYhDSI1lOZdkPtK/HkKesGo28wbTAdBgNVHQ4EFgQUinhXVjrxmdjvnFJYQo0tCf3aHFQwHwYDVR0jBBgwFoAUinhXVjrxmdjvnFJYQo0tCf3aHFQwDwYDVR0TAQH/BAUwAwEB/zAaBgNVHREEEzARgglsb2NhbGhvc3SHBH8AAAEwCgYIKoZIzj0EAwIDSQAwRgIhAJN+8D+Z1TM7uhQMes5lbcPfDGfPLVG6i/ay1PT9ghceAiEAuLSdywB/+6cym/R3pX9X9bKjoUeeef47ni4aNOEXKUU=";

/// PKCS#8 key matching [`CERT_DER_B64`].
const KEY_DER_B64: &str = "MIGHAgEAMBMGByqGSM49AgEGCCqGSM49AwEHBG0wawIBAQQgXlErCjGvmrz7kXGg9rAMxoZMrUP0ZGESfIPnMyRMjc2hRANCAAS/PXlwsxWA6vGHWVSnJUObBB6FU4gMmhxnk75oy7yzbeeacmpUpkcafPa3fzSK0jeYhDSI1lOZdkPtK/HkKesG";

const RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok";

pub fn cert_der() -> Vec<u8> {
    STANDARD.decode(CERT_DER_B64).unwrap()
}

fn server_config() -> Arc<rustls::ServerConfig> {
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        STANDARD.decode(KEY_DER_B64).unwrap(),
    ));
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![CertificateDer::from(cert_der())], key)
        .unwrap();
    Arc::new(config)
}

/// Spawns the server and returns its base URL plus the request counter.
pub fn spawn() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let config = server_config();
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(tcp) = stream else {
                continue;
            };
            let Ok(conn) = rustls::ServerConnection::new(config.clone()) else {
                continue;
            };
            let mut tls = rustls::StreamOwned::new(conn, tcp);
            let mut buf = [0u8; 4096];
            // Reading drives the handshake; a rejected certificate ends it here.
            if let Ok(n) = tls.read(&mut buf) {
                if n > 0 {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = tls.write_all(RESPONSE);
                    tls.conn.send_close_notify();
                    let _ = tls.flush();
                }
            }
        }
    });

    (format!("https://127.0.0.1:{}", addr.port()), requests)
}
