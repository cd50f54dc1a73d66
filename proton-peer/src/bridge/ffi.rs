// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Global C-ABI Entry Points
//!
//! The host calls these four functions for every bridged connection. Each
//! one copies its pointer arguments into owned memory, then routes the
//! event through the installed [`BridgeRegistry`]. Panics are caught here
//! and never unwind into the host.

use std::ffi::CStr;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, error};

use super::{BridgeHandle, BridgeRegistry, CloseEvent};

static REGISTRY: OnceCell<Arc<BridgeRegistry>> = OnceCell::new();

/// Function pointers handed to the host by
/// [`super::NativeSocketBridge::install_callbacks`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BridgeCallbacks {
    pub on_open: unsafe extern "C" fn(BridgeHandle),
    pub on_close: unsafe extern "C" fn(BridgeHandle, i32, *const c_char, bool),
    pub on_error: unsafe extern "C" fn(BridgeHandle, *const c_char),
    pub on_message: unsafe extern "C" fn(BridgeHandle, *const u8, i32),
}

impl BridgeCallbacks {
    /// The entry points defined in this module.
    pub fn global() -> Self {
        BridgeCallbacks {
            on_open: proton_bridge_on_open,
            on_close: proton_bridge_on_close,
            on_error: proton_bridge_on_error,
            on_message: proton_bridge_on_message,
        }
    }
}

/// Installs the process-wide registry. Returns false if a different
/// registry is already installed; installing the same one again is fine.
pub fn install_global(registry: Arc<BridgeRegistry>) -> bool {
    match REGISTRY.try_insert(registry) {
        Ok(_) => true,
        Err((existing, rejected)) => Arc::ptr_eq(existing, &rejected),
    }
}

/// The installed registry, if any.
pub fn global() -> Option<&'static Arc<BridgeRegistry>> {
    REGISTRY.get()
}

fn with_registry(event: &str, handle: BridgeHandle, f: impl FnOnce(&BridgeRegistry)) {
    let Some(registry) = REGISTRY.get() else {
        debug!(handle, event, "bridge event before registry install dropped");
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| f(registry))).is_err() {
        error!(handle, event, "bridge subscriber panicked");
    }
}

/// Copies a C string; null becomes empty.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string valid for the
/// duration of the call.
unsafe fn owned_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

/// Open callback.
///
/// # Safety
///
/// Always safe; marked `unsafe` to match the callback table type.
#[no_mangle]
pub unsafe extern "C" fn proton_bridge_on_open(handle: BridgeHandle) {
    with_registry("open", handle, |registry| {
        registry.dispatch_open(handle);
    });
}

/// Close callback.
///
/// # Safety
///
/// `reason` must be null or a NUL-terminated string valid for the call.
#[no_mangle]
pub unsafe extern "C" fn proton_bridge_on_close(
    handle: BridgeHandle,
    code: i32,
    reason: *const c_char,
    clean: bool,
) {
    let event = CloseEvent {
        code,
        reason: owned_string(reason),
        clean,
    };
    with_registry("close", handle, |registry| {
        registry.dispatch_close(handle, event);
    });
}

/// Error callback.
///
/// # Safety
///
/// `message` must be null or a NUL-terminated string valid for the call.
#[no_mangle]
pub unsafe extern "C" fn proton_bridge_on_error(handle: BridgeHandle, message: *const c_char) {
    let message = owned_string(message);
    with_registry("error", handle, |registry| {
        registry.dispatch_error(handle, message);
    });
}

/// Message callback.
///
/// # Safety
///
/// `data` must be null or valid for reads of `len` bytes for the call.
/// The buffer is copied before this function returns.
#[no_mangle]
pub unsafe extern "C" fn proton_bridge_on_message(
    handle: BridgeHandle,
    data: *const u8,
    len: i32,
) {
    let bytes = if data.is_null() || len <= 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(data, len as usize).to_vec()
    };
    with_registry("message", handle, |registry| {
        registry.dispatch_message(handle, &bytes);
    });
}
