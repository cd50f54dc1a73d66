// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Event System
//!
//! Callbacks for peer lifecycle events.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::channel::ConnectionState;

/// Events emitted by a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The duplex connection state changed.
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },

    /// The duplex channel is connected. Fired once per successful connect.
    Connected,

    /// The duplex channel went down.
    Disconnected {
        /// Reason reported by the channel.
        reason: String,
    },

    /// A transport or protocol error that did not belong to any operation.
    Error {
        /// Error description.
        message: String,
    },

    /// An automatic reconnect attempt has been scheduled.
    ReconnectScheduled {
        /// Attempt number of the scheduled try.
        attempt: u32,
        delay: Duration,
    },
}

/// Event handler trait.
///
/// Implement this trait to receive peer events. Handlers run on whichever
/// thread observed the event and must not block.
pub trait EventHandler: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: PeerEvent);
}

/// Simple callback-based event handler.
pub struct CallbackHandler<F>
where
    F: Fn(PeerEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(PeerEvent) + Send + Sync,
{
    /// Creates a new callback handler.
    pub fn new(callback: F) -> Self {
        CallbackHandler { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(PeerEvent) + Send + Sync,
{
    fn on_event(&self, event: PeerEvent) {
        (self.callback)(event);
    }
}

/// Event dispatcher for managing multiple handlers.
///
/// Shared between the dispatch path and the application, so handlers can
/// be added through `&self`.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an event handler.
    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().push(handler);
    }

    /// Removes all handlers.
    pub fn clear_handlers(&self) {
        self.handlers.write().clear();
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Dispatches an event to all handlers.
    ///
    /// Handlers are invoked without the registry lock held, so a handler
    /// may add further handlers.
    pub fn dispatch(&self, event: PeerEvent) {
        let handlers: Vec<Arc<dyn EventHandler>> = self.handlers.read().clone();
        for handler in handlers {
            handler.on_event(event.clone());
        }
    }
}
