// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mock Channel
//!
//! In-memory duplex channel for tests. Connect failures can be scripted,
//! sent frames are recorded, and inbound frames are queued until `poll`.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::{ChannelEvent, ChannelListener, ListenerSlot, TransportChannel, TransportResult};
use crate::error::NetworkError;
use crate::statistics::NetworkStatistics;

type Responder = Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

#[derive(Default)]
struct MockState {
    connected: bool,
    fail_connects: u32,
    connect_attempts: u32,
    fail_sends: bool,
    sent: Vec<Vec<u8>>,
    inbound: VecDeque<ChannelEvent>,
}

/// Scriptable in-memory channel.
#[derive(Default)]
pub struct MockChannel {
    state: Mutex<MockState>,
    listener: ListenerSlot,
    stats: Arc<NetworkStatistics>,
    responder: RwLock<Option<Responder>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock sharing `stats` with other channels.
    pub fn with_statistics(stats: Arc<NetworkStatistics>) -> Self {
        MockChannel {
            stats,
            ..Default::default()
        }
    }

    /// The next `count` connect calls fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().fail_connects = count;
    }

    /// Makes every send fail while set.
    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }

    /// Number of connect calls so far, failed ones included.
    pub fn connect_attempts(&self) -> u32 {
        self.state.lock().connect_attempts
    }

    /// Frames passed to `send`, in order.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.state.lock().sent.clone()
    }

    /// Queues an inbound frame for the next `poll`.
    pub fn push_inbound(&self, frame: Vec<u8>) {
        self.state
            .lock()
            .inbound
            .push_back(ChannelEvent::Received(frame));
    }

    /// Queues an arbitrary event for the next `poll`.
    pub fn push_event(&self, event: ChannelEvent) {
        self.state.lock().inbound.push_back(event);
    }

    /// Fires `event` right away, as a callback-driven channel would.
    pub fn deliver(&self, event: ChannelEvent) {
        if let ChannelEvent::Received(frame) = &event {
            self.stats.record_received(frame.len());
        }
        self.listener.emit(event);
    }

    /// Simulates the server dropping the connection.
    pub fn drop_connection(&self, reason: &str) {
        self.state.lock().connected = false;
        self.listener.emit(ChannelEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    /// Answers each sent frame with the responder's output, queued for the
    /// next `poll`.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        *self.responder.write() = Some(Arc::new(responder));
    }
}

impl TransportChannel for MockChannel {
    fn connect(&self) -> TransportResult<()> {
        {
            let mut state = self.state.lock();
            state.connect_attempts += 1;
            if state.fail_connects > 0 {
                state.fail_connects -= 1;
                return Err(NetworkError::ConnectionFailed("mock connect failure".into()));
            }
            if state.connected {
                return Ok(());
            }
            state.connected = true;
        }
        self.listener.emit(ChannelEvent::Connected);
        Ok(())
    }

    fn disconnect(&self) -> TransportResult<()> {
        let was_connected = std::mem::replace(&mut self.state.lock().connected, false);
        if was_connected {
            self.listener.emit(ChannelEvent::Disconnected {
                reason: "closed by client".into(),
            });
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn send(&self, frame: &[u8]) -> TransportResult<usize> {
        {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(NetworkError::NotConnected);
            }
            if state.fail_sends {
                return Err(NetworkError::SendFailed("mock send failure".into()));
            }
            state.sent.push(frame.to_vec());
        }
        self.stats.record_sent(frame.len());

        let responder = self.responder.read().clone();
        if let Some(reply) = responder.and_then(|respond| respond(frame)) {
            self.push_inbound(reply);
        }
        Ok(frame.len())
    }

    fn poll(&self) -> TransportResult<usize> {
        let events: Vec<ChannelEvent> = self.state.lock().inbound.drain(..).collect();
        for event in &events {
            if let ChannelEvent::Received(frame) = event {
                self.stats.record_received(frame.len());
            }
        }
        Ok(self.listener.emit_all(events))
    }

    fn set_listener(&self, listener: Arc<dyn ChannelListener>) {
        self.listener.set(listener);
    }

    fn statistics(&self) -> Arc<NetworkStatistics> {
        self.stats.clone()
    }

    fn kind(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<ChannelEvent>>);

    impl ChannelListener for Collect {
        fn on_event(&self, event: ChannelEvent) {
            self.0.lock().push(event);
        }
    }

    #[test]
    fn test_scripted_connect_failures() {
        let channel = MockChannel::new();
        channel.fail_next_connects(2);

        assert!(channel.connect().is_err());
        assert!(channel.connect().is_err());
        assert!(channel.connect().is_ok());
        assert_eq!(channel.connect_attempts(), 3);
        assert!(channel.is_connected());
    }

    #[test]
    fn test_responder_replies_on_poll() {
        let channel = MockChannel::new();
        let events = Arc::new(Collect::default());
        channel.set_listener(events.clone());
        channel.set_responder(|frame| Some(frame.iter().rev().copied().collect()));

        channel.connect().unwrap();
        channel.send(&[1, 2, 3]).unwrap();
        assert_eq!(events.0.lock().len(), 1);

        assert_eq!(channel.poll().unwrap(), 1);
        assert_eq!(
            events.0.lock().last(),
            Some(&ChannelEvent::Received(vec![3, 2, 1]))
        );
        assert_eq!(channel.statistics().packets_received(), 1);
    }

    #[test]
    fn test_send_requires_connection() {
        let channel = MockChannel::new();
        assert!(matches!(
            channel.send(b"x"),
            Err(NetworkError::NotConnected)
        ));
    }
}
