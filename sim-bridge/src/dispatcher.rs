//! Callback dispatch logic
//!
//! The [`Dispatcher`] owns the context registry and turns raw callback
//! arguments into calls on the host collaborators. It is independent of the
//! C calling convention: the trampolines only fetch the active dispatcher and
//! convert its `Result` into a status code.

use crate::config::BridgeConfig;
use crate::host::HostContext;
use crate::marshal;
use crate::native::NativeLibrary;
use crate::registry::{ContextHandle, ContextRegistry};
use crate::session::Session;
use crate::types::{BridgeError, CallbackKind, ControlPhase, Event, EventCode, Result};
use std::ffi::c_void;
use std::os::raw::c_char;
use std::sync::Arc;

/// Routes callbacks from the engine to the host context behind each handle
///
/// The trampolines only ever consult the dispatcher installed by
/// [`runtime::init`](crate::runtime::init), so dispatchers are created there
/// and sessions are opened through [`runtime::open_session`](crate::runtime::open_session).
///
/// ```compile_fail
/// use sim_bridge::{BridgeConfig, Dispatcher, NativeLibrary};
/// use std::sync::Arc;
///
/// fn detached(library: Arc<dyn NativeLibrary>) -> Dispatcher {
///     Dispatcher::new(library, BridgeConfig::new())
/// }
/// ```
pub struct Dispatcher {
    registry: ContextRegistry<HostContext>,
    library: Arc<dyn NativeLibrary>,
    config: BridgeConfig,
}

impl Dispatcher {
    pub(crate) fn new(library: Arc<dyn NativeLibrary>, config: BridgeConfig) -> Self {
        Self {
            registry: ContextRegistry::new(),
            library,
            config,
        }
    }

    pub fn registry(&self) -> &ContextRegistry<HostContext> {
        &self.registry
    }

    pub fn library(&self) -> &Arc<dyn NativeLibrary> {
        &self.library
    }

    /// Register a context and wire its callbacks into the engine
    pub(crate) fn open_session(self: &Arc<Self>, context: Arc<HostContext>) -> Result<Session> {
        Session::open(Arc::clone(self), context)
    }

    /// Resolve the `void* ctx` the engine passed back
    pub fn resolve(&self, ctx: *mut c_void) -> Result<Arc<HostContext>> {
        let handle = ContextHandle::from_ptr(ctx).ok_or(BridgeError::MissingContext(0))?;
        self.registry.resolve(handle)
    }

    /// Handle a plot request
    ///
    /// # Safety
    /// `params` must be null or a NUL-terminated string readable for the
    /// duration of the call.
    pub unsafe fn on_plot(&self, ctx: *mut c_void, params: *const c_char) -> Result<()> {
        let context = self.resolve(ctx)?;
        let request = unsafe { marshal::plot_request(params, self.config.max_payload_bytes) }?;

        let Some(handler) = context.plot_handler() else {
            log::debug!("[{}] no plot handler, ignoring request", context.name());
            return Ok(());
        };

        log::debug!("[{}] plot request: {}", context.name(), request.params());
        handler.plot(&request).map_err(|error| BridgeError::HostHandler {
            kind: CallbackKind::Plot,
            error,
        })
    }

    /// Handle a write/log message
    ///
    /// # Safety
    /// `message` must be null or a NUL-terminated string readable for the
    /// duration of the call.
    pub unsafe fn on_write(&self, ctx: *mut c_void, message: *const c_char, message_type: i32) -> Result<()> {
        let context = self.resolve(ctx)?;
        let message = unsafe { marshal::message(message, message_type, self.config.max_payload_bytes) }?;

        let Some(sink) = context.message_sink() else {
            log::debug!("[{}] no message sink, dropping {:?} message", context.name(), message.kind);
            return Ok(());
        };

        sink.write(&message).map_err(|error| BridgeError::HostHandler {
            kind: CallbackKind::Write,
            error,
        })
    }

    /// Handle one of the control-iteration notifications
    pub fn on_controls(&self, ctx: *mut c_void, phase: ControlPhase) -> Result<()> {
        let context = self.resolve(ctx)?;

        let Some(controls) = context.control_loop() else {
            log::trace!("[{}] no control loop for {:?}", context.name(), phase);
            return Ok(());
        };

        controls.run_phase(phase).map_err(|error| BridgeError::HostHandler {
            kind: phase.callback_kind(),
            error,
        })
    }

    /// Handle an event notification
    pub fn on_event(&self, ctx: *mut c_void, event_code: i32, step: i32, payload: *mut c_void) -> Result<()> {
        let context = self.resolve(ctx)?;
        let code = EventCode(event_code);
        let event = if code.is_legacy() {
            Event {
                code,
                step: 0,
                payload: std::ptr::null_mut(),
            }
        } else {
            Event { code, step, payload }
        };

        log::trace!("[{}] event {} at step {}", context.name(), event.code, event.step);
        context.events().dispatch(&event).map_err(|error| BridgeError::HostHandler {
            kind: CallbackKind::Event,
            error,
        })
    }

    /// Record a failure of a callback that has no return channel
    pub fn report_notification_failure(&self, ctx: *mut c_void, kind: CallbackKind, error: &BridgeError) {
        if let BridgeError::MissingContext(_) = error {
            log::warn!("{} callback for unknown context {:p}: {}", kind, ctx, error);
            return;
        }

        log::error!("{} callback failed: {}", kind, error);

        if self.config.report_notification_errors {
            if let Some(handle) = ContextHandle::from_ptr(ctx) {
                self.library
                    .report_error(handle, &format!("Host callback exception: {}", error));
            }
        }
    }
}
