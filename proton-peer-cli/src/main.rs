// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Proton Peer CLI
//!
//! Command-line client for Proton Peer RPC servers.

mod commands;
mod display;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use proton_peer::channel::PinnedCertificate;
use proton_peer::{CertificatePolicy, EncryptionKey, PeerConfig, PeerSession};

#[derive(Parser)]
#[command(name = "proton-peer")]
#[command(version, about = "Talk to a Proton Peer RPC server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Exchange server URL
    #[arg(
        long,
        global = true,
        env = "PROTON_SERVER_ADDRESS",
        default_value = proton_peer::peer::DEFAULT_SERVER_ADDRESS
    )]
    server: String,

    /// Duplex socket URL (ws, wss, tcp, tls, udp)
    #[arg(
        long,
        global = true,
        env = "PROTON_SOCKET_ADDRESS",
        default_value = proton_peer::peer::DEFAULT_SOCKET_ADDRESS
    )]
    socket: String,

    /// Operation timeout in seconds
    #[arg(long, global = true, env = "PROTON_TIMEOUT_SECS", default_value_t = 30)]
    timeout_secs: u64,

    /// Accept any server certificate
    #[arg(long, global = true)]
    insecure: bool,

    /// Accept only this SHA-256 certificate fingerprint (hex, repeatable)
    #[arg(long = "pin", global = true, conflicts_with = "insecure")]
    pins: Vec<String>,

    /// Session id sent with exchange calls
    #[arg(long, global = true, env = "PROTON_SESSION_ID")]
    session_id: Option<String>,

    /// Bearer token sent with exchange calls
    #[arg(long, global = true, env = "PROTON_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the server is alive
    Ping,

    /// Show the server clock
    Time,

    /// Send one operation and print the response
    Send {
        /// Operation code
        code: String,

        /// Parameters as UTF-8 text
        #[arg(long, conflicts_with = "hex")]
        data: Option<String>,

        /// Parameters as hex
        #[arg(long)]
        hex: Option<String>,

        /// Use the duplex socket instead of the exchange endpoint
        #[arg(long)]
        duplex: bool,

        /// Encrypt with this base64 session key
        #[arg(long, env = "PROTON_KEY", hide_env_values = true)]
        key: Option<String>,

        /// Server-side reference for --key
        #[arg(long, requires = "key")]
        key_ref: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn certificate_policy(&self) -> Result<CertificatePolicy> {
        if self.insecure {
            return Ok(CertificatePolicy::AcceptAll);
        }
        if self.pins.is_empty() {
            return Ok(CertificatePolicy::SystemRoots);
        }
        let pins = self
            .pins
            .iter()
            .map(|pin| PinnedCertificate::from_hex(pin))
            .collect::<Result<Vec<_>, _>>()
            .context("invalid --pin")?;
        Ok(CertificatePolicy::Pinned(pins))
    }

    fn peer_config(&self) -> Result<PeerConfig> {
        let mut config = PeerConfig::from_env();
        config.server_address = self.server.clone();
        config.socket_address = self.socket.clone();
        config.default_timeout = Duration::from_secs(self.timeout_secs);
        config.certificate_policy = self.certificate_policy()?;
        Ok(config)
    }

    fn session(&self) -> PeerSession {
        PeerSession {
            session_id: self.session_id.clone(),
            token: self.token.clone(),
            ..PeerSession::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("proton_peer=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.peer_config()?;
    let session = cli.session();

    match &cli.command {
        Commands::Ping => commands::ping(&config).await?,
        Commands::Time => commands::time(&config).await?,
        Commands::Send {
            code,
            data,
            hex,
            duplex,
            key,
            key_ref,
            json,
        } => {
            let parameters = match (data, hex) {
                (Some(text), _) => text.as_bytes().to_vec(),
                (None, Some(encoded)) => {
                    hex::decode(encoded.trim()).context("--hex is not valid hex")?
                }
                (None, None) => Vec::new(),
            };

            let session = match key {
                Some(encoded) => {
                    let key = EncryptionKey::from_base64(encoded).context("invalid --key")?;
                    session.with_key(key, key_ref.clone().unwrap_or_default())
                }
                None => session,
            };

            commands::send(
                config,
                session,
                commands::SendArgs {
                    code: code.clone(),
                    parameters,
                    duplex: *duplex,
                    json: *json,
                },
            )
            .await?;
        }
    }

    Ok(())
}
