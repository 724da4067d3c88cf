//! FFI bindings for the repscan engine
//!
//! C-compatible functions for embedding the engine from other languages.
//! Sessions are opaque handles; frames go in as JSON, events and summaries
//! come out as allocated JSON strings that must be freed with
//! `repscan_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::session::ExerciseSession;

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

/// Opaque handle to an ExerciseSession
pub struct RepscanSessionHandle {
    session: ExerciseSession,
}

/// Create a session for a built-in exercise.
///
/// # Safety
/// - `exercise_id` must be a valid null-terminated C string.
/// - Returns a pointer that must be freed with `repscan_session_free`.
/// - Returns NULL on error; call `repscan_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn repscan_session_new(
    exercise_id: *const c_char,
) -> *mut RepscanSessionHandle {
    clear_last_error();

    let id = match cstr_to_string(exercise_id) {
        Some(s) => s,
        None => {
            set_last_error("Invalid exercise_id string pointer");
            return ptr::null_mut();
        }
    };

    match ExerciseSession::start_builtin(&id) {
        Ok(session) => Box::into_raw(Box::new(RepscanSessionHandle { session })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a session.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repscan_session_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn repscan_session_free(handle: *mut RepscanSessionHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Process one raw detector frame (JSON) and return the frame event as JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repscan_session_new`.
/// - `frame_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string to free with `repscan_free_string`.
/// - Returns NULL on error; call `repscan_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn repscan_session_on_frame_json(
    handle: *mut RepscanSessionHandle,
    frame_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &mut *handle;

    let json = match cstr_to_string(frame_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid frame JSON string pointer");
            return ptr::null_mut();
        }
    };

    let event = match handle.session.on_raw_json(&json) {
        Ok(event) => event,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match serde_json::to_string(&event) {
        Ok(out) => string_to_cstr(&out),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

unsafe fn capture(
    handle: *mut RepscanSessionHandle,
    which: fn(&mut ExerciseSession) -> Option<f64>,
) -> f64 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return f64::NAN;
    }
    let handle = &mut *handle;

    match which(&mut handle.session) {
        Some(value) => value,
        None => {
            set_last_error("No signal buffered for calibration");
            f64::NAN
        }
    }
}

/// Capture the rest position from the calibration buffer.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repscan_session_new`.
/// - Returns the captured value, or NaN on error.
#[no_mangle]
pub unsafe extern "C" fn repscan_session_capture_rest(handle: *mut RepscanSessionHandle) -> f64 {
    capture(handle, ExerciseSession::capture_rest)
}

/// Capture the mid position from the calibration buffer.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repscan_session_new`.
/// - Returns the captured value, or NaN on error.
#[no_mangle]
pub unsafe extern "C" fn repscan_session_capture_mid(handle: *mut RepscanSessionHandle) -> f64 {
    capture(handle, ExerciseSession::capture_mid)
}

/// Capture the peak position from the calibration buffer.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repscan_session_new`.
/// - Returns the captured value, or NaN on error.
#[no_mangle]
pub unsafe extern "C" fn repscan_session_capture_peak(handle: *mut RepscanSessionHandle) -> f64 {
    capture(handle, ExerciseSession::capture_peak)
}

/// Override the success-threshold ratio.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repscan_session_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn repscan_session_set_success_ratio(
    handle: *mut RepscanSessionHandle,
    ratio: f64,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *handle;

    match handle.session.set_success_ratio(ratio) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// Set the hold duration in milliseconds.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repscan_session_new`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn repscan_session_set_hold_ms(
    handle: *mut RepscanSessionHandle,
    hold_ms: u64,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    (*handle).session.set_hold_ms(hold_ms);
    0
}

/// Reset phase, repetitions, and metrics; calibration is kept.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repscan_session_new`.
#[no_mangle]
pub unsafe extern "C" fn repscan_session_reset(handle: *mut RepscanSessionHandle) {
    clear_last_error();
    if !handle.is_null() {
        (*handle).session.reset();
    }
}

/// Save session calibration to JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repscan_session_new`.
/// - Returns a newly allocated string to free with `repscan_free_string`.
/// - Returns NULL on error; call `repscan_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn repscan_session_save_calibration(
    handle: *mut RepscanSessionHandle,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    match (*handle).session.save_calibration() {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Load session calibration from JSON.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repscan_session_new`.
/// - `json` must be a valid null-terminated C string.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn repscan_session_load_calibration(
    handle: *mut RepscanSessionHandle,
    json: *const c_char,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }
    let handle = &mut *handle;

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return -1;
        }
    };

    match handle.session.load_calibration(&json_str) {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

/// End the session and return the summary as JSON. The session refuses
/// further frames afterwards but must still be freed.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repscan_session_new`.
/// - Returns a newly allocated string to free with `repscan_free_string`.
/// - Returns NULL on error; call `repscan_last_error` for the message.
#[no_mangle]
pub unsafe extern "C" fn repscan_session_end_json(
    handle: *mut RepscanSessionHandle,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }
    let handle = &mut *handle;

    let summary = match handle.session.end() {
        Ok(summary) => summary,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match serde_json::to_string(&summary) {
        Ok(out) => string_to_cstr(&out),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a string returned by repscan functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a repscan function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn repscan_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The pointer is valid until the next repscan call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn repscan_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the engine version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn repscan_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
