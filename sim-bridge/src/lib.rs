//! Simulation Engine Callback Bridge
//!
//! Host-side plumbing for a native circuit-simulation engine that calls back
//! into its embedder for plotting, messages, control iterations and events.
//!
//! # Architecture
//!
//! - [`ContextRegistry`] maps opaque [`ContextHandle`]s, the only thing the
//!   engine sees, to host-owned [`HostContext`]s
//! - [`trampoline`] holds the stateless `extern "C"` callbacks; they forward
//!   to the active [`Dispatcher`] and never let an error or panic unwind into
//!   the engine
//! - [`DispatchTable`] and [`Session`] register those callbacks with a
//!   [`NativeLibrary`] for each session
//! - [`runtime`] owns the process-wide dispatcher (`init`/`shutdown`)
//!
//! The library does NOT plot, log or iterate controls itself; those are the
//! collaborators a host plugs into its [`HostContext`].
//!
//! # Example Usage
//!
//! ```no_run
//! use sim_bridge::{runtime, BridgeConfig, DynamicLibrary, HostContext, Message, PlotRequest};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let config = BridgeConfig::new();
//! let engine = unsafe { DynamicLibrary::open(Path::new("libengine.so"), &config.symbols) }.unwrap();
//! runtime::init(Arc::new(engine), config).unwrap();
//!
//! let context = HostContext::new("feeder")
//!     .with_plot(Arc::new(|request: &PlotRequest| -> anyhow::Result<()> {
//!         println!("plot {:?}", request.plot_type());
//!         Ok(())
//!     }))
//!     .with_messages(Arc::new(|message: &Message| -> anyhow::Result<()> {
//!         println!("{}", message.text);
//!         Ok(())
//!     }));
//!
//! let session = runtime::open_session(Arc::new(context)).unwrap();
//! // ... drive the engine; callbacks arrive on whichever thread it uses ...
//! session.close();
//! runtime::shutdown().unwrap();
//! ```

// Public modules
pub mod config;
pub mod host;
pub mod loader;
pub mod native;
pub mod registry;
pub mod runtime;
pub mod trampoline;
pub mod types;

// Re-export main types for convenience
pub use config::{BridgeConfig, SymbolTable};
pub use dispatcher::Dispatcher;
pub use host::{ControlLoop, EventHub, EventSubscriber, HostContext, MessageSink, PlotHandler, SubscriptionId};
pub use loader::DynamicLibrary;
pub use native::{ControlCallback, EventCallback, NativeLibrary, PlotCallback, WriteCallback};
pub use registry::{ContextHandle, ContextRegistry};
pub use session::Session;
pub use table::DispatchTable;
pub use types::{
    BridgeError, CallbackKind, ControlPhase, Event, EventCode, Message, MessageType, PlotRequest, Result,
    Status,
};

// Internal modules (re-exported above)
mod dispatcher;
mod marshal;
mod session;
mod table;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // The default table hands out the exported trampolines
        let table = DispatchTable::default();
        assert_eq!(table.plot as usize, trampoline::plot as usize);
        assert_eq!(table.write as usize, trampoline::write as usize);
        assert_eq!(table.event as usize, trampoline::event as usize);
        assert_eq!(table.controls(ControlPhase::Init) as usize, trampoline::init_controls as usize);
        assert_eq!(table.controls(ControlPhase::Check) as usize, trampoline::check_controls as usize);
        assert_eq!(table.controls(ControlPhase::Step) as usize, trampoline::step_controls as usize);
        assert!(!VERSION.is_empty());
    }
}
