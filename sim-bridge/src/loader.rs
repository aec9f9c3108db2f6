//! Loading the simulation engine as a shared library
//!
//! Registration functions are resolved once at load time using the names in
//! a [`SymbolTable`]. Their C signatures are:
//!
//! ```c
//! int32_t register_plot(void* ctx, plot_cb cb);           // non-zero = accepted
//! int32_t register_write(void* ctx, write_cb cb);
//! int32_t register_xxx_controls(void* ctx, control_cb cb);
//! int32_t register_event(void* ctx, int32_t code, event_cb cb);
//! int32_t unregister_event(void* ctx, int32_t code, event_cb cb);
//! void    release_context(void* ctx);                     // optional
//! void    set_error(void* ctx, const char* text);         // optional
//! ```

use crate::config::SymbolTable;
use crate::native::{ControlCallback, EventCallback, NativeLibrary, PlotCallback, WriteCallback};
use crate::registry::ContextHandle;
use crate::types::{BridgeError, ControlPhase, EventCode, Result};
use libloading::Library;
use std::ffi::{c_void, CString};
use std::os::raw::c_char;
use std::path::{Path, PathBuf};

type RegisterFn<C> = unsafe extern "C" fn(*mut c_void, C) -> i32;
type EventRegisterFn = unsafe extern "C" fn(*mut c_void, i32, EventCallback) -> i32;
type ReleaseFn = unsafe extern "C" fn(*mut c_void);
type SetErrorFn = unsafe extern "C" fn(*mut c_void, *const c_char);

/// Entry point invoked with a session handle, e.g. a solve routine
pub type EntryFn = unsafe extern "C" fn(*mut c_void) -> i32;

/// Copy a function pointer out of the library
///
/// # Safety
/// `T` must match the exported function's real signature.
unsafe fn symbol<T: Copy>(library: &Library, name: &str) -> Result<T> {
    match unsafe { library.get::<T>(name.as_bytes()) } {
        Ok(symbol) => Ok(*symbol),
        Err(e) => Err(BridgeError::MissingSymbol {
            name: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// # Safety
/// See [`symbol`].
unsafe fn optional_symbol<T: Copy>(library: &Library, name: &str) -> Option<T> {
    match unsafe { symbol(library, name) } {
        Ok(function) => Some(function),
        Err(e) => {
            log::warn!("{}", e);
            None
        }
    }
}

/// An engine loaded with `libloading`
pub struct DynamicLibrary {
    path: PathBuf,
    register_plot: RegisterFn<PlotCallback>,
    register_write: RegisterFn<WriteCallback>,
    register_init_controls: RegisterFn<ControlCallback>,
    register_check_controls: RegisterFn<ControlCallback>,
    register_step_controls: RegisterFn<ControlCallback>,
    register_event: EventRegisterFn,
    unregister_event: EventRegisterFn,
    release_context: Option<ReleaseFn>,
    set_error: Option<SetErrorFn>,
    // Must outlive every function pointer above
    library: Library,
}

impl DynamicLibrary {
    /// Load the engine and resolve its registration functions
    ///
    /// Optional symbols that are configured but not exported are skipped
    /// with a warning.
    ///
    /// # Safety
    /// Loading runs the library's initializers, and the exported functions
    /// must have the signatures documented in this module.
    pub unsafe fn open(path: &Path, symbols: &SymbolTable) -> Result<Self> {
        log::info!("Loading engine library: {:?}", path);
        let library = unsafe { Library::new(path) }?;

        let release_context = symbols
            .release_context
            .as_deref()
            .and_then(|name| unsafe { optional_symbol::<ReleaseFn>(&library, name) });
        let set_error = symbols
            .set_error
            .as_deref()
            .and_then(|name| unsafe { optional_symbol::<SetErrorFn>(&library, name) });

        let loaded = unsafe {
            Self {
                path: path.to_path_buf(),
                register_plot: symbol(&library, &symbols.register_plot)?,
                register_write: symbol(&library, &symbols.register_write)?,
                register_init_controls: symbol(&library, &symbols.register_init_controls)?,
                register_check_controls: symbol(&library, &symbols.register_check_controls)?,
                register_step_controls: symbol(&library, &symbols.register_step_controls)?,
                register_event: symbol(&library, &symbols.register_event)?,
                unregister_event: symbol(&library, &symbols.unregister_event)?,
                release_context,
                set_error,
                library,
            }
        };

        log::info!("Engine library loaded successfully: {:?}", path);
        Ok(loaded)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Call an exported `int32_t (*)(void* ctx)` with a session handle
    ///
    /// # Safety
    /// The export must have that signature. The engine will typically call
    /// back into the bridge on this thread before returning.
    pub unsafe fn call_entry(&self, name: &str, ctx: ContextHandle) -> Result<i32> {
        let entry: EntryFn = unsafe { symbol(&self.library, name) }?;
        log::debug!("Calling {}({})", name, ctx);
        Ok(unsafe { entry(ctx.as_ptr()) })
    }
}

impl NativeLibrary for DynamicLibrary {
    fn register_plot(&self, ctx: ContextHandle, callback: PlotCallback) -> bool {
        unsafe { (self.register_plot)(ctx.as_ptr(), callback) != 0 }
    }

    fn register_write(&self, ctx: ContextHandle, callback: WriteCallback) -> bool {
        unsafe { (self.register_write)(ctx.as_ptr(), callback) != 0 }
    }

    fn register_controls(&self, ctx: ContextHandle, phase: ControlPhase, callback: ControlCallback) -> bool {
        let register = match phase {
            ControlPhase::Init => self.register_init_controls,
            ControlPhase::Check => self.register_check_controls,
            ControlPhase::Step => self.register_step_controls,
        };
        unsafe { register(ctx.as_ptr(), callback) != 0 }
    }

    fn register_event(&self, ctx: ContextHandle, code: EventCode, callback: EventCallback) -> bool {
        unsafe { (self.register_event)(ctx.as_ptr(), code.0, callback) != 0 }
    }

    fn unregister_event(&self, ctx: ContextHandle, code: EventCode, callback: EventCallback) -> bool {
        unsafe { (self.unregister_event)(ctx.as_ptr(), code.0, callback) != 0 }
    }

    fn release(&self, ctx: ContextHandle) {
        if let Some(release) = self.release_context {
            unsafe { release(ctx.as_ptr()) }
        }
    }

    fn report_error(&self, ctx: ContextHandle, message: &str) {
        let Some(set_error) = self.set_error else {
            return;
        };
        let text = CString::new(message.replace('\0', " ")).unwrap_or_default();
        unsafe { set_error(ctx.as_ptr(), text.as_ptr()) }
    }
}

impl std::fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicLibrary")
            .field("path", &self.path)
            .field("release_context", &self.release_context.is_some())
            .field("set_error", &self.set_error.is_some())
            .finish()
    }
}
