//! The seam between the bridge and the simulation engine
//!
//! Callback signatures follow the engine's C declarations:
//!
//! ```c
//! int32_t plot(void* ctx, const char* params);
//! int32_t write(void* ctx, const char* message, int32_t message_type);
//! void    controls(void* ctx);
//! void    event(void* ctx, int32_t event_code, int32_t step, void* payload);
//! ```

use crate::registry::ContextHandle;
use crate::types::{ControlPhase, EventCode};
use std::ffi::c_void;
use std::os::raw::c_char;

pub type PlotCallback = unsafe extern "C" fn(ctx: *mut c_void, params: *const c_char) -> i32;
pub type WriteCallback =
    unsafe extern "C" fn(ctx: *mut c_void, message: *const c_char, message_type: i32) -> i32;
pub type ControlCallback = unsafe extern "C" fn(ctx: *mut c_void);
pub type EventCallback =
    unsafe extern "C" fn(ctx: *mut c_void, event_code: i32, step: i32, payload: *mut c_void);

/// Registration entry points of a native simulation library
///
/// Each `register_*` call returns whether the library accepted the callback.
/// Implementations must tolerate calls from any thread.
pub trait NativeLibrary: Send + Sync {
    fn register_plot(&self, ctx: ContextHandle, callback: PlotCallback) -> bool;

    fn register_write(&self, ctx: ContextHandle, callback: WriteCallback) -> bool;

    fn register_controls(&self, ctx: ContextHandle, phase: ControlPhase, callback: ControlCallback) -> bool;

    fn register_event(&self, ctx: ContextHandle, code: EventCode, callback: EventCallback) -> bool;

    fn unregister_event(&self, ctx: ContextHandle, code: EventCode, callback: EventCallback) -> bool;

    /// Forget every callback associated with a context
    fn release(&self, _ctx: ContextHandle) {}

    /// Post an error description to the engine's own error state
    fn report_error(&self, _ctx: ContextHandle, _message: &str) {}
}
