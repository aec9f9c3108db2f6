//! Process-wide bridge state
//!
//! The engine is a process singleton and its callbacks carry no reference to
//! Rust state besides the context pointer, so the trampolines reach the
//! active [`Dispatcher`] through a global slot. The slot is filled and
//! emptied explicitly with [`init`] and [`shutdown`].

use crate::config::BridgeConfig;
use crate::dispatcher::Dispatcher;
use crate::host::HostContext;
use crate::native::NativeLibrary;
use crate::session::Session;
use crate::types::{BridgeError, Result};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::Arc;

static ACTIVE: Lazy<RwLock<Option<Arc<Dispatcher>>>> = Lazy::new(|| RwLock::new(None));

/// Install a dispatcher for `library`
///
/// Fails with [`BridgeError::AlreadyInitialized`] if one is active.
pub fn init(library: Arc<dyn NativeLibrary>, config: BridgeConfig) -> Result<Arc<Dispatcher>> {
    let mut active = ACTIVE.write();
    if active.is_some() {
        return Err(BridgeError::AlreadyInitialized);
    }

    let dispatcher = Arc::new(Dispatcher::new(library, config));
    *active = Some(Arc::clone(&dispatcher));
    log::info!("Bridge runtime initialized");
    Ok(dispatcher)
}

/// Remove the active dispatcher
///
/// Refused with [`BridgeError::ContextsRegistered`] while sessions are still
/// open: the engine would keep calling with their handles, and a later
/// dispatcher hands out the same handle values. Callbacks already running
/// keep their reference and finish normally; later callbacks see
/// [`BridgeError::NotInitialized`].
pub fn shutdown() -> Result<()> {
    let mut active = ACTIVE.write();
    let remaining = active
        .as_ref()
        .ok_or(BridgeError::NotInitialized)?
        .registry()
        .len();
    if remaining > 0 {
        log::warn!("Refusing to shut down with {} context(s) still registered", remaining);
        return Err(BridgeError::ContextsRegistered(remaining));
    }

    *active = None;
    log::info!("Bridge runtime shut down");
    Ok(())
}

pub fn is_initialized() -> bool {
    ACTIVE.read().is_some()
}

/// The active dispatcher
pub fn current() -> Result<Arc<Dispatcher>> {
    ACTIVE.read().clone().ok_or(BridgeError::NotInitialized)
}

/// Open a session on the active dispatcher
pub fn open_session(context: Arc<HostContext>) -> Result<Session> {
    current()?.open_session(context)
}
