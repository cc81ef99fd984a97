//! FFI bindings for Momentum Flux
//!
//! This module provides C-compatible functions for calling the engines from other
//! languages. Every call takes a JSON request as a null-terminated C string and
//! returns a JSON response that must be freed by the caller using
//! `momentum_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::error::ComputeError;
use crate::pipeline::{build_baseline_json, drivers_json, lifecycle_json, overall_json, score_json};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Run a JSON-in/JSON-out handler, recording failures in the last-error slot
unsafe fn call_json(
    request: *const c_char,
    handler: fn(&str) -> Result<String, ComputeError>,
) -> *mut c_char {
    clear_last_error();

    let Some(request) = cstr_to_string(request) else {
        set_last_error("Invalid request string pointer");
        return ptr::null_mut();
    };

    match handler(&request) {
        Ok(response) => string_to_cstr(&response),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Score the latest snapshot of a video.
///
/// Request: `{"snapshots": [...], "baseline": {...}, "recent_scores": [..]}`.
///
/// # Safety
/// - `request` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `momentum_free_string`.
/// - Returns NULL on error; call `momentum_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn momentum_score_json(request: *const c_char) -> *mut c_char {
    call_json(request, score_json)
}

/// Aggregate an account's recent scores.
///
/// Request: `{"scores": [{"timestamp", "score"}], "now": "...", "window": 10}`.
///
/// # Safety
/// - `request` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `momentum_free_string`.
/// - Returns NULL on error; call `momentum_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn momentum_overall_json(request: *const c_char) -> *mut c_char {
    call_json(request, overall_json)
}

/// Explain the latest snapshot of a video by driver.
///
/// # Safety
/// - `request` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `momentum_free_string`.
/// - Returns NULL on error; call `momentum_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn momentum_drivers_json(request: *const c_char) -> *mut c_char {
    call_json(request, drivers_json)
}

/// Build a video's lifecycle curve.
///
/// # Safety
/// - `request` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `momentum_free_string`.
/// - Returns NULL on error; call `momentum_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn momentum_lifecycle_json(request: *const c_char) -> *mut c_char {
    call_json(request, lifecycle_json)
}

/// Build an account baseline table from snapshots of its videos.
///
/// # Safety
/// - `request` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `momentum_free_string`.
/// - Returns NULL on error; call `momentum_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn momentum_build_baseline_json(request: *const c_char) -> *mut c_char {
    call_json(request, build_baseline_json)
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Momentum functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Momentum function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn momentum_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next Momentum function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn momentum_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn momentum_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
