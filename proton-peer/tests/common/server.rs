// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! In-Process RPC Server
//!
//! Axum server speaking the exchange call surface. Operation codes select
//! behavior:
//!
//! - `"bad"`: answers 200 with three garbage bytes
//! - `"status"`: answers 503
//! - `"slow"`: sleeps five seconds before answering
//! - `"whoami"`: echoes the session id, bearer token and key reference
//! - `"reject"`: answers with return code 42 and a debug message
//! - anything else: OK response echoing the parameters

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use parking_lot::Mutex;
use proton_peer::{
    EncryptionKey, Operation, OperationResponse, ProtocolCodec, ReturnCode,
};

/// Server clock reported by `/proton/getts`.
pub const SERVER_TIME_MS: i64 = 1_700_000_000_000;

#[derive(Default)]
pub struct ServerState {
    pub key: Option<EncryptionKey>,
    /// Content types of received operation calls.
    pub content_types: Mutex<Vec<String>>,
    pub calls: Mutex<u32>,
}

/// Spawns the server on an ephemeral port and returns its base URL.
pub async fn spawn(key: Option<EncryptionKey>) -> (String, Arc<ServerState>) {
    let state = Arc::new(ServerState {
        key,
        ..Default::default()
    });

    let router = Router::new()
        .route("/proton/api", post(operation))
        .route("/proton/ping", get(|| async { "ok" }))
        .route("/proton/getts", get(|| async { SERVER_TIME_MS.to_string() }))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

/// Server answering every call with `status`.
pub async fn spawn_failing(status: StatusCode) -> String {
    let router = Router::new()
        .route("/proton/api", post(move || async move { status }))
        .route("/proton/ping", get(move || async move { status }))
        .route("/proton/getts", get(|| async { "not a number" }));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn header(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

async fn operation(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    *state.calls.lock() += 1;
    state
        .content_types
        .lock()
        .push(header(&headers, "content-type"));

    let codec = ProtocolCodec::new();
    let Ok((frame_header, Operation::Request(request))) =
        codec.decode_operation(&body, state.key.as_ref())
    else {
        return (StatusCode::BAD_REQUEST, Vec::new());
    };

    let response = match request.operation_code.as_str() {
        "bad" => return (StatusCode::OK, vec![1, 2, 3]),
        "status" => return (StatusCode::SERVICE_UNAVAILABLE, Vec::new()),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            OperationResponse::ok(&request, Vec::new())
        }
        "whoami" => {
            let who = format!(
                "{}|{}|{}",
                header(&headers, "x-session-id"),
                header(&headers, "authorization"),
                header(&headers, "x-encrypt-key")
            );
            OperationResponse::ok(&request, who.into_bytes())
        }
        "reject" => OperationResponse {
            return_code: ReturnCode(42),
            debug_message: Some("not allowed".into()),
            ..OperationResponse::ok(&request, Vec::new())
        },
        _ => OperationResponse::ok(&request, request.parameters.clone()),
    };

    match codec.encode_operation(
        &response.into(),
        &frame_header.send_options(),
        state.key.as_ref(),
    ) {
        Ok(frame) => (StatusCode::OK, frame),
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()),
    }
}
