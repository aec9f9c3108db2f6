//! `extern "C"` entry points handed to the engine
//!
//! Every trampoline:
//! 1. fetches the active [`Dispatcher`](crate::dispatcher::Dispatcher),
//! 2. runs the dispatch inside `catch_unwind` so no panic crosses the boundary,
//! 3. returns a status code, or for notification callbacks logs the failure.
//!
//! The status conversion and failure reporting run inside an outer guard as
//! well, since they call into loggers and the native library.

use crate::dispatcher::Dispatcher;
use crate::runtime;
use crate::types::{BridgeError, CallbackKind, ControlPhase, Result, Status};
use std::any::Any;
use std::ffi::c_void;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Run a dispatch, turning a panic into a host handler error
fn guarded(kind: CallbackKind, f: impl FnOnce() -> Result<()>) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("{} handler panicked: {}", kind, message);
            Err(BridgeError::HostHandler {
                kind,
                error: anyhow::anyhow!("panicked: {}", message),
            })
        }
    }
}

/// Last-resort guard for code after the dispatch itself
fn contained<R>(fallback: R, f: impl FnOnce() -> R) -> R {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or(fallback)
}

fn status_of(kind: CallbackKind, result: Result<()>) -> i32 {
    if let Err(e) = &result {
        match e {
            BridgeError::MissingContext(_) | BridgeError::NotInitialized => log::warn!("{} callback: {}", kind, e),
            _ => log::error!("{} callback: {}", kind, e),
        }
    }
    Status::from_result(&result).code()
}

/// Notification callbacks have nowhere to send an error: log it and post it
/// to the engine's error state when configured to
fn notify(kind: CallbackKind, ctx: *mut c_void, f: impl FnOnce(&Dispatcher) -> Result<()>) {
    contained((), || {
        let dispatcher = match runtime::current() {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                log::warn!("{} callback dropped: {}", kind, e);
                return;
            }
        };

        if let Err(e) = guarded(kind, || f(dispatcher.as_ref())) {
            dispatcher.report_notification_failure(ctx, kind, &e);
        }
    })
}

/// Run a value-returning dispatch and convert it to a status code
fn respond(kind: CallbackKind, f: impl FnOnce() -> Result<()>) -> i32 {
    contained(Status::HostHandlerError.code(), || status_of(kind, guarded(kind, f)))
}

/// Plot request trampoline
///
/// # Safety
/// Called by the engine; `params` must be null or NUL-terminated.
pub unsafe extern "C" fn plot(ctx: *mut c_void, params: *const c_char) -> i32 {
    respond(CallbackKind::Plot, || {
        let dispatcher = runtime::current()?;
        unsafe { dispatcher.on_plot(ctx, params) }
    })
}

/// Write/log message trampoline
///
/// # Safety
/// Called by the engine; `message` must be null or NUL-terminated.
pub unsafe extern "C" fn write(ctx: *mut c_void, message: *const c_char, message_type: i32) -> i32 {
    respond(CallbackKind::Write, || {
        let dispatcher = runtime::current()?;
        unsafe { dispatcher.on_write(ctx, message, message_type) }
    })
}

/// # Safety
/// Called by the engine with the context pointer it was registered with.
pub unsafe extern "C" fn init_controls(ctx: *mut c_void) {
    notify(CallbackKind::InitControls, ctx, |d| d.on_controls(ctx, ControlPhase::Init));
}

/// # Safety
/// Called by the engine with the context pointer it was registered with.
pub unsafe extern "C" fn check_controls(ctx: *mut c_void) {
    notify(CallbackKind::CheckControls, ctx, |d| d.on_controls(ctx, ControlPhase::Check));
}

/// # Safety
/// Called by the engine with the context pointer it was registered with.
pub unsafe extern "C" fn step_controls(ctx: *mut c_void) {
    notify(CallbackKind::StepControls, ctx, |d| d.on_controls(ctx, ControlPhase::Step));
}

/// Event notification trampoline
///
/// # Safety
/// Called by the engine; `payload` is passed through to subscribers untouched.
pub unsafe extern "C" fn event(ctx: *mut c_void, event_code: i32, step: i32, payload: *mut c_void) {
    notify(CallbackKind::Event, ctx, |d| d.on_event(ctx, event_code, step, payload));
}
