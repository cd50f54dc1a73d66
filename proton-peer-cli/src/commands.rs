// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! CLI Commands

use std::time::Duration;

use anyhow::{bail, Result};
use proton_peer::{ClientPeer, Completion, PeerConfig, PeerEvent, PeerSession, SendOptions};
use tracing::debug;

use crate::display;

/// Checks server liveness.
pub async fn ping(config: &PeerConfig) -> Result<()> {
    let peer = ClientPeer::exchange(config.clone())?;
    if peer.ping(config.default_timeout).await {
        display::success(&format!("{} is alive", config.server_address));
        Ok(())
    } else {
        display::error(&format!("{} did not answer", config.server_address));
        bail!("ping failed");
    }
}

/// Prints the server clock and its offset from the local clock.
pub async fn time(config: &PeerConfig) -> Result<()> {
    let peer = ClientPeer::exchange(config.clone())?;
    let server = peer.server_time(config.default_timeout).await;
    let local = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    println!("{}", server);
    display::info(&format!("offset from local clock: {} ms", server - local));
    Ok(())
}

pub struct SendArgs {
    pub code: String,
    pub parameters: Vec<u8>,
    pub duplex: bool,
    pub json: bool,
}

/// Sends one operation and prints the completion.
pub async fn send(config: PeerConfig, session: PeerSession, args: SendArgs) -> Result<()> {
    let options = SendOptions::new().encrypted(session.key.is_some());
    let poll_interval = config.poll_interval;

    let peer = if args.duplex {
        ClientPeer::duplex(config)?
    } else {
        ClientPeer::exchange(config)?
    };
    peer.set_session(session);
    peer.on_event(|event| {
        if let PeerEvent::Error { message } = &event {
            display::error(message);
        }
        debug!(?event, "peer event");
    });

    let service = if args.duplex {
        let connecting = peer.clone();
        tokio::task::spawn_blocking(move || connecting.connect()).await??;
        Some(peer.spawn_service(poll_interval))
    } else {
        None
    };

    let done = peer.request(&args.code, args.parameters, options).await;

    if let Some(service) = service {
        service.abort();
        peer.disconnect()?;
    }

    print_completion(&done, args.json);
    let stats = peer.statistics().snapshot();
    debug!(?stats, "traffic");

    if done.is_ok() {
        Ok(())
    } else {
        bail!("operation {} did not succeed", args.code)
    }
}

fn print_completion(done: &Completion, json: bool) {
    let response = &done.response;
    if json {
        let value = serde_json::json!({
            "operation_code": response.operation_code,
            "response_id": response.response_id,
            "return_code": response.return_code.0,
            "debug_message": response.debug_message,
            "parameters": hex::encode(&response.parameters),
            "source": format!("{:?}", done.source),
            "elapsed_ms": done.elapsed.as_millis() as u64,
        });
        println!("{}", value);
        return;
    }

    if done.is_ok() {
        display::success(&format!(
            "operation {} -> {} in {}",
            response.operation_code,
            response.return_code,
            format_elapsed(done.elapsed)
        ));
    } else {
        display::error(&format!(
            "operation {} -> {} ({:?}) {}",
            response.operation_code,
            response.return_code,
            done.source,
            response.debug_message.as_deref().unwrap_or("")
        ));
    }
    if !response.parameters.is_empty() {
        println!("{}", display::bytes(&response.parameters));
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    if elapsed.as_secs() > 0 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}
