// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Reconnect Controller
//!
//! Owns the [`ConnectionState`] of a duplex channel. State moves only on
//! channel events, on explicit connect/disconnect, and when a scheduled
//! retry comes due in [`ReconnectController::poll`].
//!
//! Retries use a fixed interval with no cap. The delay is never slept on:
//! `poll` is called from the service tick and fires the attempt once the
//! retry time has passed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, ConnectionState, TransportChannel, TransportResult};
use crate::error::NetworkError;
use crate::events::{EventDispatcher, PeerEvent};

/// Reconnect policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub auto_reconnect: bool,
    /// Wait between a failure and the next attempt.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            auto_reconnect: true,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: ConnectionState,
    /// Connect calls issued, failed ones included.
    attempts: u32,
    /// Consecutive failures since the last successful connect.
    failures: u32,
    retry_at: Option<Instant>,
    /// Set by an application disconnect; suppresses automatic retries.
    user_closed: bool,
}

/// Connection supervisor for one duplex channel.
pub struct ReconnectController {
    channel: Arc<dyn TransportChannel>,
    config: ReconnectConfig,
    inner: Mutex<Inner>,
    events: Arc<EventDispatcher>,
}

impl std::fmt::Debug for ReconnectController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectController")
            .field("channel", &self.channel.kind())
            .field("config", &self.config)
            .field("inner", &*self.inner.lock())
            .finish()
    }
}

impl ReconnectController {
    pub fn new(
        channel: Arc<dyn TransportChannel>,
        config: ReconnectConfig,
        events: Arc<EventDispatcher>,
    ) -> Self {
        ReconnectController {
            channel,
            config,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                attempts: 0,
                failures: 0,
                retry_at: None,
                user_closed: false,
            }),
            events,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state.clone()
    }

    pub fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    pub fn connect_attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    /// When the scheduled retry is due, if one is scheduled.
    pub fn next_retry_at(&self) -> Option<Instant> {
        self.inner.lock().retry_at
    }

    /// Application-initiated connect.
    ///
    /// On failure a retry is scheduled (if enabled) and the error returned.
    pub fn connect(&self) -> TransportResult<()> {
        {
            let mut inner = self.inner.lock();
            inner.user_closed = false;
            inner.failures = 0;
        }
        self.attempt(Instant::now())
    }

    /// Application-initiated disconnect. Cancels any scheduled retry.
    pub fn disconnect(&self) -> TransportResult<()> {
        let from = {
            let mut inner = self.inner.lock();
            inner.user_closed = true;
            inner.retry_at = None;
            std::mem::replace(&mut inner.state, ConnectionState::Disconnected)
        };
        self.transition(from, ConnectionState::Disconnected);
        self.channel.disconnect()
    }

    /// Synchronous reconnect: disconnect, wait for the channel to report
    /// closed, then connect.
    ///
    /// Spins the calling thread for up to `max_wait`. Never call this from
    /// the thread that delivers channel events: the close it waits for
    /// would never be dispatched.
    pub fn reconnect(&self, max_wait: Duration) -> TransportResult<()> {
        self.disconnect()?;

        let started = Instant::now();
        while self.channel.is_connected() {
            if started.elapsed() >= max_wait {
                warn!(waited_ms = max_wait.as_millis() as u64, "channel did not close");
                return Err(NetworkError::Timeout);
            }
            std::thread::yield_now();
        }

        self.connect()
    }

    /// Fires the scheduled retry if it is due at `now`. Returns true if an
    /// attempt was made.
    pub fn poll(&self, now: Instant) -> bool {
        let due = {
            let inner = self.inner.lock();
            !inner.user_closed && inner.retry_at.is_some_and(|at| at <= now)
        };
        if due {
            debug!("reconnect attempt due");
            // Failure is already handled inside attempt().
            let _ = self.attempt(now);
        }
        due
    }

    /// Feeds a channel event into the state machine.
    pub fn handle_event(&self, event: &ChannelEvent) {
        match event {
            ChannelEvent::Connected => self.on_connected(),
            ChannelEvent::Disconnected { reason } => self.on_lost(reason, true),
            ChannelEvent::Error { message, .. } => self.on_lost(message, false),
            ChannelEvent::Received(_) => {}
        }
    }

    fn attempt(&self, now: Instant) -> TransportResult<()> {
        let (from, attempt) = {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Connected {
                return Ok(());
            }
            inner.attempts += 1;
            inner.retry_at = None;
            let from = std::mem::replace(&mut inner.state, ConnectionState::Connecting);
            (from, inner.attempts)
        };
        self.transition(from, ConnectionState::Connecting);
        debug!(attempt, channel = self.channel.kind(), "connecting");

        self.channel.connect().inspect_err(|e| {
            self.schedule_retry(now, &e.to_string(), e.is_transient());
        })
    }

    fn on_connected(&self) {
        let from = {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Connected {
                return;
            }
            if inner.user_closed {
                None
            } else {
                inner.failures = 0;
                inner.retry_at = None;
                Some(std::mem::replace(&mut inner.state, ConnectionState::Connected))
            }
        };
        let Some(from) = from else {
            // Open arrived after the application disconnected.
            debug!(channel = self.channel.kind(), "late open after disconnect, closing");
            if let Err(e) = self.channel.disconnect() {
                warn!(error = %e, "could not close late-opened channel");
            }
            return;
        };
        info!(channel = self.channel.kind(), "connected");
        self.transition(from, ConnectionState::Connected);
        self.events.dispatch(PeerEvent::Connected);
    }

    fn on_lost(&self, reason: &str, closed: bool) {
        let state = self.state();
        match state {
            ConnectionState::Reconnecting { .. } | ConnectionState::Disconnected => return,
            // Errors on a live channel that stays open are not a loss.
            ConnectionState::Connected if !closed && self.channel.is_connected() => return,
            ConnectionState::Connected | ConnectionState::Connecting => {}
        }

        if self.inner.lock().user_closed {
            return;
        }
        self.events.dispatch(PeerEvent::Disconnected {
            reason: reason.to_string(),
        });
        self.schedule_retry(Instant::now(), reason, true);
    }

    /// Moves to `Reconnecting` with a retry due at `now + delay`, or to
    /// `Disconnected` when retrying is off or cannot help.
    fn schedule_retry(&self, now: Instant, reason: &str, retryable: bool) {
        let (from, to, scheduled) = {
            let mut inner = self.inner.lock();
            let to = if inner.user_closed || !self.config.auto_reconnect || !retryable {
                inner.retry_at = None;
                ConnectionState::Disconnected
            } else {
                inner.failures += 1;
                inner.retry_at = Some(now + self.config.delay);
                ConnectionState::Reconnecting {
                    attempt: inner.failures,
                }
            };
            let from = std::mem::replace(&mut inner.state, to.clone());
            let scheduled = match to {
                ConnectionState::Reconnecting { attempt } => Some(attempt),
                _ => None,
            };
            (from, to, scheduled)
        };

        self.transition(from, to);
        if let Some(attempt) = scheduled {
            warn!(
                attempt,
                delay_ms = self.config.delay.as_millis() as u64,
                %reason,
                "connection lost, retry scheduled"
            );
            self.events.dispatch(PeerEvent::ReconnectScheduled {
                attempt,
                delay: self.config.delay,
            });
        } else {
            warn!(%reason, "connection lost");
        }
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) {
        if from != to {
            self.events.dispatch(PeerEvent::StateChanged { from, to });
        }
    }
}
