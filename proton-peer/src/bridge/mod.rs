// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Multiplexed Bridge Registry
//!
//! Some hosts expose sockets only through module-level primitives taking a
//! handle, and report activity through one global callback per event type
//! for all connections. The registry allocates handles and keeps four
//! handle-keyed subscriber maps so the global entry points in [`ffi`] can
//! route each event to the logical connection it belongs to.
//!
//! Lifetime rules:
//! - handles come from a counter starting at 1 and are never reused
//! - subscribers are registered before the native instance is created
//! - subscribers are unregistered only once the close event was observed
//!   (or the instance was never asked to connect)

pub mod ffi;

pub use ffi::BridgeCallbacks;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::NetworkError;

/// Identifies one logical connection on the host bridge.
pub type BridgeHandle = i32;

/// The host's native socket primitives.
///
/// Every call names its connection by handle. `connect` and `disconnect`
/// only request the change; the outcome arrives later as an open, close or
/// error callback.
pub trait NativeSocketBridge: Send + Sync {
    /// Hands the global entry points to the host. Called once.
    fn install_callbacks(&self, callbacks: BridgeCallbacks) -> bool;

    fn init_instance(&self, handle: BridgeHandle, url: &str) -> bool;

    fn connect(&self, handle: BridgeHandle) -> bool;

    fn send(&self, handle: BridgeHandle, data: &[u8]) -> bool;

    fn disconnect(&self, handle: BridgeHandle) -> bool;

    fn is_connected(&self, handle: BridgeHandle) -> bool;
}

/// Payload of a close callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub code: i32,
    pub reason: String,
    pub clean: bool,
}

type OpenFn = Arc<dyn Fn() + Send + Sync>;
type CloseFn = Arc<dyn Fn(CloseEvent) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(String) + Send + Sync>;
type MessageFn = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

/// Per-handle event subscribers.
#[derive(Clone)]
pub struct BridgeSubscribers {
    pub on_open: OpenFn,
    pub on_close: CloseFn,
    pub on_error: ErrorFn,
    pub on_message: MessageFn,
}

impl BridgeSubscribers {
    /// Subscribers that ignore every event.
    pub fn noop() -> Self {
        BridgeSubscribers {
            on_open: Arc::new(|| {}),
            on_close: Arc::new(|_| {}),
            on_error: Arc::new(|_| {}),
            on_message: Arc::new(|_| {}),
        }
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    /// Connect requested, open or close not yet reported.
    connecting: bool,
    opened: bool,
    retiring: bool,
}

/// Handle allocator and event router for one host bridge.
pub struct BridgeRegistry {
    native: Arc<dyn NativeSocketBridge>,
    next_handle: AtomicI32,
    open: RwLock<HashMap<BridgeHandle, OpenFn>>,
    close: RwLock<HashMap<BridgeHandle, CloseFn>>,
    error: RwLock<HashMap<BridgeHandle, ErrorFn>>,
    message: RwLock<HashMap<BridgeHandle, MessageFn>>,
    lifecycle: Mutex<HashMap<BridgeHandle, Lifecycle>>,
}

impl std::fmt::Debug for BridgeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRegistry")
            .field("next_handle", &self.next_handle.load(Ordering::Relaxed))
            .field("registered", &self.registered_count())
            .finish()
    }
}

impl BridgeRegistry {
    pub fn new(native: Arc<dyn NativeSocketBridge>) -> Self {
        BridgeRegistry {
            native,
            next_handle: AtomicI32::new(1),
            open: RwLock::new(HashMap::new()),
            close: RwLock::new(HashMap::new()),
            error: RwLock::new(HashMap::new()),
            message: RwLock::new(HashMap::new()),
            lifecycle: Mutex::new(HashMap::new()),
        }
    }

    /// Makes this the process-wide registry behind the [`ffi`] entry points
    /// and hands those entry points to the host.
    pub fn install(self: &Arc<Self>) -> Result<(), NetworkError> {
        if !ffi::install_global(self.clone()) {
            return Err(NetworkError::Bridge(
                "another registry is already installed".into(),
            ));
        }
        if !self.native.install_callbacks(BridgeCallbacks::global()) {
            return Err(NetworkError::Bridge("host rejected callbacks".into()));
        }
        Ok(())
    }

    /// Allocates a handle, registers `subscribers` and creates the native
    /// instance for `url`.
    pub fn create_instance(
        &self,
        url: &str,
        subscribers: BridgeSubscribers,
    ) -> Result<BridgeHandle, NetworkError> {
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        if handle <= 0 {
            return Err(NetworkError::Bridge("bridge handles exhausted".into()));
        }

        self.lifecycle.lock().insert(handle, Lifecycle::default());
        self.open.write().insert(handle, subscribers.on_open);
        self.close.write().insert(handle, subscribers.on_close);
        self.error.write().insert(handle, subscribers.on_error);
        self.message.write().insert(handle, subscribers.on_message);

        if !self.native.init_instance(handle, url) {
            self.unregister(handle);
            return Err(NetworkError::Bridge(format!(
                "host could not create instance for {}",
                url
            )));
        }

        debug!(handle, url, "bridge instance created");
        Ok(handle)
    }

    pub fn connect(&self, handle: BridgeHandle) -> Result<(), NetworkError> {
        // Marked before the request; the host may report open or close
        // before native.connect returns.
        self.set_connecting(handle, true);
        if self.native.connect(handle) {
            Ok(())
        } else {
            self.set_connecting(handle, false);
            Err(NetworkError::ConnectionFailed(format!(
                "host refused connect for handle {}",
                handle
            )))
        }
    }

    pub fn send(&self, handle: BridgeHandle, data: &[u8]) -> Result<(), NetworkError> {
        if self.native.send(handle, data) {
            Ok(())
        } else {
            Err(NetworkError::SendFailed(format!(
                "host refused send for handle {}",
                handle
            )))
        }
    }

    /// Requests closure, also of a connect still in flight. The close
    /// callback reports completion.
    pub fn disconnect(&self, handle: BridgeHandle) -> Result<(), NetworkError> {
        self.set_connecting(handle, false);
        if self.native.disconnect(handle) {
            Ok(())
        } else {
            Err(NetworkError::Bridge(format!(
                "host refused disconnect for handle {}",
                handle
            )))
        }
    }

    pub fn is_connected(&self, handle: BridgeHandle) -> bool {
        self.native.is_connected(handle)
    }

    /// True between a successful connect request and its open or close.
    pub fn is_connecting(&self, handle: BridgeHandle) -> bool {
        self.lifecycle
            .lock()
            .get(&handle)
            .is_some_and(|state| state.connecting)
    }

    /// Ends a logical connection.
    ///
    /// Unregisters at once if the instance is neither open nor connecting;
    /// otherwise requests closure and leaves the subscribers in place until
    /// the close event.
    pub fn retire(&self, handle: BridgeHandle) {
        let unregister_now = {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.get_mut(&handle) {
                Some(state) if state.opened || state.connecting => {
                    state.retiring = true;
                    false
                }
                Some(_) => true,
                None => return,
            }
        };

        if unregister_now {
            self.unregister(handle);
        } else {
            debug!(handle, "bridge instance retiring, waiting for close");
            let _ = self.native.disconnect(handle);
        }
    }

    /// True while any subscriber for `handle` is registered.
    pub fn is_registered(&self, handle: BridgeHandle) -> bool {
        self.message.read().contains_key(&handle)
    }

    pub fn registered_count(&self) -> usize {
        self.message.read().len()
    }

    fn set_connecting(&self, handle: BridgeHandle, connecting: bool) {
        if let Some(state) = self.lifecycle.lock().get_mut(&handle) {
            state.connecting = connecting && !state.opened;
        }
    }

    fn unregister(&self, handle: BridgeHandle) {
        self.open.write().remove(&handle);
        self.close.write().remove(&handle);
        self.error.write().remove(&handle);
        self.message.write().remove(&handle);
        self.lifecycle.lock().remove(&handle);
        debug!(handle, "bridge instance unregistered");
    }

    /// Routes an open event. Returns false if nobody is registered.
    pub fn dispatch_open(&self, handle: BridgeHandle) -> bool {
        let retiring = match self.lifecycle.lock().get_mut(&handle) {
            Some(state) => {
                state.connecting = false;
                state.opened = true;
                state.retiring
            }
            None => false,
        };
        if retiring {
            // Opened after its owner went away.
            debug!(handle, "retired instance opened, closing");
            let _ = self.native.disconnect(handle);
            return false;
        }
        let subscriber = self.open.read().get(&handle).cloned();
        match subscriber {
            Some(on_open) => {
                on_open();
                true
            }
            None => {
                debug!(handle, "open event for unknown handle dropped");
                false
            }
        }
    }

    /// Routes a close event, completing a pending [`BridgeRegistry::retire`].
    pub fn dispatch_close(&self, handle: BridgeHandle, event: CloseEvent) -> bool {
        let retiring = match self.lifecycle.lock().get_mut(&handle) {
            Some(state) => {
                state.connecting = false;
                state.opened = false;
                state.retiring
            }
            None => false,
        };

        let subscriber = self.close.read().get(&handle).cloned();
        let delivered = match subscriber {
            Some(on_close) => {
                on_close(event);
                true
            }
            None => {
                debug!(handle, "close event for unknown handle dropped");
                false
            }
        };

        if retiring {
            self.unregister(handle);
        }
        delivered
    }

    pub fn dispatch_error(&self, handle: BridgeHandle, message: String) -> bool {
        let subscriber = self.error.read().get(&handle).cloned();
        match subscriber {
            Some(on_error) => {
                warn!(handle, %message, "bridge error");
                on_error(message);
                true
            }
            None => {
                debug!(handle, "error event for unknown handle dropped");
                false
            }
        }
    }

    /// Routes a message. `data` is copied before any subscriber runs.
    pub fn dispatch_message(&self, handle: BridgeHandle, data: &[u8]) -> bool {
        let subscriber = self.message.read().get(&handle).cloned();
        match subscriber {
            Some(on_message) => {
                on_message(data.to_vec());
                true
            }
            None => {
                debug!(handle, bytes = data.len(), "message for unknown handle dropped");
                false
            }
        }
    }
}
