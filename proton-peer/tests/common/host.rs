// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Fake Host Bridge
//!
//! Stands in for a host that exposes sockets only as handle-addressed
//! primitives. Outcomes of connect/send/disconnect are queued and reach the
//! registry only when the test calls [`FakeHost::pump`], the way a real
//! host reports them later on its own thread.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use proton_peer::bridge::{BridgeCallbacks, CloseEvent};
use proton_peer::{BridgeHandle, BridgeRegistry, NativeSocketBridge};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Open(BridgeHandle),
    Close(BridgeHandle, CloseEvent),
    Error(BridgeHandle, String),
    Message(BridgeHandle, Vec<u8>),
}

#[derive(Debug, Default)]
pub struct HostSocket {
    pub url: String,
    pub connected: bool,
    /// Connect requested, open not yet delivered.
    pub opening: bool,
    pub sent: Vec<Vec<u8>>,
    pub connects: u32,
    pub disconnects: u32,
}

#[derive(Default)]
struct HostState {
    sockets: HashMap<BridgeHandle, HostSocket>,
    queue: VecDeque<HostEvent>,
    refuse_connects: u32,
    callbacks_installed: bool,
    connected_on_open: bool,
}

/// Scriptable host bridge.
#[derive(Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
    registry: Mutex<Weak<BridgeRegistry>>,
    /// Reply to every sent message with the output of this function.
    responder: Mutex<Option<Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>>>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Host plus a registry routing to it.
    pub fn with_registry() -> (Arc<Self>, Arc<BridgeRegistry>) {
        let host = Self::new();
        let registry = Arc::new(BridgeRegistry::new(host.clone()));
        host.attach(&registry);
        (host, registry)
    }

    pub fn attach(&self, registry: &Arc<BridgeRegistry>) {
        *self.registry.lock() = Arc::downgrade(registry);
    }

    /// Report a socket connected only once its open event is delivered,
    /// like a browser socket. A disconnect before that aborts the connect.
    pub fn connected_on_open(&self) {
        self.state.lock().connected_on_open = true;
    }

    pub fn refuse_next_connects(&self, count: u32) {
        self.state.lock().refuse_connects = count;
    }

    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        *self.responder.lock() = Some(Arc::new(responder));
    }

    pub fn callbacks_installed(&self) -> bool {
        self.state.lock().callbacks_installed
    }

    pub fn sent(&self, handle: BridgeHandle) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .sockets
            .get(&handle)
            .map(|s| s.sent.clone())
            .unwrap_or_default()
    }

    pub fn connects(&self, handle: BridgeHandle) -> u32 {
        self.state
            .lock()
            .sockets
            .get(&handle)
            .map(|s| s.connects)
            .unwrap_or(0)
    }

    pub fn disconnects(&self, handle: BridgeHandle) -> u32 {
        self.state
            .lock()
            .sockets
            .get(&handle)
            .map(|s| s.disconnects)
            .unwrap_or(0)
    }

    /// True if the socket is open or about to open.
    pub fn is_live(&self, handle: BridgeHandle) -> bool {
        self.state
            .lock()
            .sockets
            .get(&handle)
            .is_some_and(|s| s.connected || s.opening)
    }

    pub fn url(&self, handle: BridgeHandle) -> Option<String> {
        self.state.lock().sockets.get(&handle).map(|s| s.url.clone())
    }

    /// Queues an event as if the host reported it.
    pub fn queue(&self, event: HostEvent) {
        self.state.lock().queue.push_back(event);
    }

    /// Server-side close of `handle`.
    pub fn drop_remote(&self, handle: BridgeHandle, code: i32, reason: &str) {
        let mut state = self.state.lock();
        if let Some(socket) = state.sockets.get_mut(&handle) {
            socket.connected = false;
        }
        state.queue.push_back(HostEvent::Close(
            handle,
            CloseEvent {
                code,
                reason: reason.to_string(),
                clean: false,
            },
        ));
    }

    /// Delivers queued events through the registry. Returns how many were
    /// delivered to a live subscriber.
    pub fn pump(&self) -> usize {
        let Some(registry) = self.registry.lock().upgrade() else {
            return 0;
        };
        let events: Vec<HostEvent> = self.state.lock().queue.drain(..).collect();
        events
            .into_iter()
            .filter(|event| match event.clone() {
                HostEvent::Open(h) => {
                    self.mark_open(h);
                    registry.dispatch_open(h)
                }
                HostEvent::Close(h, close) => registry.dispatch_close(h, close),
                HostEvent::Error(h, message) => registry.dispatch_error(h, message),
                HostEvent::Message(h, data) => registry.dispatch_message(h, &data),
            })
            .count()
    }
}

impl FakeHost {
    fn mark_open(&self, handle: BridgeHandle) {
        if let Some(socket) = self.state.lock().sockets.get_mut(&handle) {
            if socket.opening {
                socket.opening = false;
                socket.connected = true;
            }
        }
    }
}

impl NativeSocketBridge for FakeHost {
    fn install_callbacks(&self, _callbacks: BridgeCallbacks) -> bool {
        self.state.lock().callbacks_installed = true;
        true
    }

    fn init_instance(&self, handle: BridgeHandle, url: &str) -> bool {
        if url.is_empty() {
            return false;
        }
        self.state.lock().sockets.insert(
            handle,
            HostSocket {
                url: url.to_string(),
                ..Default::default()
            },
        );
        true
    }

    fn connect(&self, handle: BridgeHandle) -> bool {
        let mut state = self.state.lock();
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            if let Some(socket) = state.sockets.get_mut(&handle) {
                socket.connects += 1;
            }
            state.queue.push_back(HostEvent::Error(handle, "connection refused".into()));
            state.queue.push_back(HostEvent::Close(
                handle,
                CloseEvent {
                    code: 1006,
                    reason: String::new(),
                    clean: false,
                },
            ));
            return true;
        }
        let HostState {
            sockets,
            queue,
            connected_on_open,
            ..
        } = &mut *state;
        match sockets.get_mut(&handle) {
            Some(socket) => {
                socket.connects += 1;
                if *connected_on_open {
                    socket.opening = true;
                } else {
                    socket.connected = true;
                }
                queue.push_back(HostEvent::Open(handle));
                true
            }
            None => false,
        }
    }

    fn send(&self, handle: BridgeHandle, data: &[u8]) -> bool {
        let responder = self.responder.lock().clone();
        let mut state = self.state.lock();
        let HostState { sockets, queue, .. } = &mut *state;
        match sockets.get_mut(&handle) {
            Some(socket) if socket.connected => {
                socket.sent.push(data.to_vec());
                if let Some(reply) = responder.and_then(|respond| respond(data)) {
                    queue.push_back(HostEvent::Message(handle, reply));
                }
                true
            }
            _ => false,
        }
    }

    fn disconnect(&self, handle: BridgeHandle) -> bool {
        let mut state = self.state.lock();
        let HostState { sockets, queue, .. } = &mut *state;
        match sockets.get_mut(&handle) {
            Some(socket) if socket.opening => {
                socket.disconnects += 1;
                socket.opening = false;
                queue.retain(|event| *event != HostEvent::Open(handle));
                queue.push_back(HostEvent::Close(
                    handle,
                    CloseEvent {
                        code: 1006,
                        reason: "connect aborted".into(),
                        clean: false,
                    },
                ));
                true
            }
            Some(socket) if socket.connected => {
                socket.disconnects += 1;
                socket.connected = false;
                queue.push_back(HostEvent::Close(
                    handle,
                    CloseEvent {
                        code: 1000,
                        reason: "normal closure".into(),
                        clean: true,
                    },
                ));
                true
            }
            Some(socket) => {
                socket.disconnects += 1;
                true
            }
            None => false,
        }
    }

    fn is_connected(&self, handle: BridgeHandle) -> bool {
        self.state
            .lock()
            .sockets
            .get(&handle)
            .map(|s| s.connected)
            .unwrap_or(false)
    }
}
