//! The dispatch table: one trampoline per callback shape

use crate::native::{ControlCallback, EventCallback, NativeLibrary, PlotCallback, WriteCallback};
use crate::registry::ContextHandle;
use crate::trampoline;
use crate::types::{BridgeError, CallbackKind, ControlPhase, EventCode, Result};

/// Function pointers handed to the engine
#[derive(Debug, Clone, Copy)]
pub struct DispatchTable {
    pub plot: PlotCallback,
    pub write: WriteCallback,
    pub init_controls: ControlCallback,
    pub check_controls: ControlCallback,
    pub step_controls: ControlCallback,
    pub event: EventCallback,
}

impl DispatchTable {
    /// The bridge's own trampolines
    pub const fn trampolines() -> Self {
        Self {
            plot: trampoline::plot,
            write: trampoline::write,
            init_controls: trampoline::init_controls,
            check_controls: trampoline::check_controls,
            step_controls: trampoline::step_controls,
            event: trampoline::event,
        }
    }

    pub fn controls(&self, phase: ControlPhase) -> ControlCallback {
        match phase {
            ControlPhase::Init => self.init_controls,
            ControlPhase::Check => self.check_controls,
            ControlPhase::Step => self.step_controls,
        }
    }

    /// Register plot, write and the control callbacks for one context
    ///
    /// Stops at the first rejected callback. Event callbacks are registered
    /// per event code as subscribers appear, see [`DispatchTable::register_event`].
    pub fn register_session(&self, library: &dyn NativeLibrary, ctx: ContextHandle) -> Result<()> {
        accepted(CallbackKind::Plot, library.register_plot(ctx, self.plot))?;
        accepted(CallbackKind::Write, library.register_write(ctx, self.write))?;
        for phase in ControlPhase::ALL {
            accepted(
                phase.callback_kind(),
                library.register_controls(ctx, phase, self.controls(phase)),
            )?;
        }

        log::debug!("Registered session callbacks for context {}", ctx);
        Ok(())
    }

    pub fn register_event(&self, library: &dyn NativeLibrary, ctx: ContextHandle, code: EventCode) -> Result<()> {
        accepted(CallbackKind::Event, library.register_event(ctx, code, self.event)).map_err(|e| match e {
            BridgeError::RegistrationFailed { kind, reason } => BridgeError::RegistrationFailed {
                kind,
                reason: format!("{} (event {})", reason, code),
            },
            other => other,
        })
    }

    pub fn unregister_event(&self, library: &dyn NativeLibrary, ctx: ContextHandle, code: EventCode) -> bool {
        let removed = library.unregister_event(ctx, code, self.event);
        if !removed {
            log::warn!("Engine did not unregister event {} for context {}", code, ctx);
        }
        removed
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::trampolines()
    }
}

fn accepted(kind: CallbackKind, ok: bool) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(BridgeError::RegistrationFailed {
            kind,
            reason: "registration call returned failure".to_string(),
        })
    }
}
