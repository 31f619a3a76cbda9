//! Purpose: `extern "C"` entry points the foreign module invokes on its own
//! threads, forwarded into structured logging.
//! Exports: `log_callback`, `data_callback`.
//! Role: The only code that runs on foreign callback threads; it never
//! panics, never blocks on bridge state, and never retains foreign memory.
use std::ffi::CStr;

use libc::{c_char, c_int, c_void};

use crate::core::registry;
use crate::core::sys::{self, EqMsg};

/// Receives the module's own log lines during start. Foreign thread.
pub unsafe extern "C" fn log_callback(message: *const c_char) -> c_int {
    if message.is_null() {
        return 0;
    }
    let text = unsafe { CStr::from_ptr(message) }.to_string_lossy();
    tracing::debug!(target: "quantlink::module", "{}", text.trim_end());
    0
}

/// Receives asynchronous result notifications. Foreign thread; the message
/// and any data it points to are only valid for the duration of the call.
pub unsafe extern "C" fn data_callback(message: *const EqMsg, _user_data: *mut c_void) -> c_int {
    let Some(msg) = (unsafe { message.as_ref() }) else {
        return 0;
    };
    match msg.msg_type {
        sys::MT_ERROR => {
            let detail = registry::get()
                .map(|provider| provider.status_text(msg.err))
                .unwrap_or_default();
            tracing::error!(
                status = msg.err,
                request_id = msg.request_id,
                serial_id = msg.serial_id,
                detail = %detail,
                "module reported an asynchronous error"
            );
        }
        sys::MT_RESPONSE | sys::MT_PARTIAL_RESPONSE => {
            tracing::info!(
                request_id = msg.request_id,
                serial_id = msg.serial_id,
                partial = msg.msg_type == sys::MT_PARTIAL_RESPONSE,
                "module delivered an asynchronous response"
            );
        }
        other => {
            tracing::warn!(
                msg_type = other,
                request_id = msg.request_id,
                serial_id = msg.serial_id,
                "module delivered a message of unknown type"
            );
        }
    }
    0
}
