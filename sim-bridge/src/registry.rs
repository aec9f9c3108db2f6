//! Handle-based context management for the native boundary
//!
//! The engine only ever sees an opaque [`ContextHandle`]. Each handle packs a
//! slot index into a dense arena together with the slot's generation, so a
//! handle that outlives its registration can never match a recycled slot.
//!
//! ## Thread Safety
//!
//! The arena sits behind a `parking_lot::Mutex`; callbacks arriving on the
//! engine's thread may resolve handles while the host registers or tears
//! down other sessions.

use crate::types::{BridgeError, Result};
use parking_lot::Mutex;
use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Arc, Weak};

const INDEX_BITS: u32 = usize::BITS / 2;
const INDEX_MASK: usize = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: usize = usize::MAX >> INDEX_BITS;

/// Opaque, pointer-sized identifier handed to the native library
///
/// Never zero, so it is distinguishable from a null context pointer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextHandle(NonZeroUsize);

impl ContextHandle {
    fn new(index: usize, generation: usize) -> Self {
        let raw = ((generation & GENERATION_MASK) << INDEX_BITS) | ((index + 1) & INDEX_MASK);
        // index + 1 is at most INDEX_MASK, so the low half is never zero
        Self(NonZeroUsize::new(raw).unwrap_or(NonZeroUsize::MIN))
    }

    /// Rebuild a handle from its raw value; `None` for zero
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    /// Rebuild a handle from the context pointer the engine passed back
    pub fn from_ptr(ptr: *const c_void) -> Option<Self> {
        Self::from_raw(ptr as usize)
    }

    pub fn raw(self) -> usize {
        self.0.get()
    }

    /// The value to hand to the engine as its `void* ctx`
    pub fn as_ptr(self) -> *mut c_void {
        self.0.get() as *mut c_void
    }

    fn index(self) -> Option<usize> {
        (self.0.get() & INDEX_MASK).checked_sub(1)
    }

    fn generation(self) -> usize {
        self.0.get() >> INDEX_BITS
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextHandle(0x{:X})", self.0)
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

struct Slot<T: ?Sized> {
    generation: usize,
    entry: Option<Weak<T>>,
}

struct Arena<T: ?Sized> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    live: usize,
}

impl<T: ?Sized> Arena<T> {
    fn slot(&self, handle: ContextHandle) -> Option<&Slot<T>> {
        let slot = self.slots.get(handle.index()?)?;
        (slot.generation == handle.generation()).then_some(slot)
    }
}

/// Registry mapping context handles to host-owned contexts
///
/// Entries are non-owning: the host keeps the `Arc`, the registry keeps a
/// `Weak`. A context dropped without being unregistered resolves as missing.
pub struct ContextRegistry<T: ?Sized> {
    arena: Mutex<Arena<T>>,
}

impl<T: ?Sized> ContextRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            arena: Mutex::new(Arena {
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    /// Associate a context with a fresh handle
    pub fn register(&self, context: &Arc<T>) -> ContextHandle {
        let mut arena = self.arena.lock();
        let entry = Some(Arc::downgrade(context));

        let index = match arena.free.pop() {
            Some(index) => {
                arena.slots[index].entry = entry;
                index
            }
            None => {
                arena.slots.push(Slot { generation: 0, entry });
                arena.slots.len() - 1
            }
        };
        arena.live += 1;

        ContextHandle::new(index, arena.slots[index].generation)
    }

    /// Look up the live context behind a handle
    pub fn resolve(&self, handle: ContextHandle) -> Result<Arc<T>> {
        let arena = self.arena.lock();
        arena
            .slot(handle)
            .and_then(|slot| slot.entry.as_ref())
            .and_then(Weak::upgrade)
            .ok_or(BridgeError::MissingContext(handle.raw()))
    }

    /// Drop the association; returns false if the handle was not registered
    pub fn unregister(&self, handle: ContextHandle) -> bool {
        let mut arena = self.arena.lock();
        let Some(index) = handle.index() else {
            return false;
        };

        match arena.slots.get_mut(index) {
            Some(slot) if slot.generation == handle.generation() && slot.entry.is_some() => {
                slot.entry = None;
                slot.generation = (slot.generation + 1) & GENERATION_MASK;
            }
            _ => return false,
        }

        arena.free.push(index);
        arena.live -= 1;
        true
    }

    /// Number of registered handles (including ones whose context was dropped)
    pub fn len(&self) -> usize {
        self.arena.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized> Default for ContextRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let registry = ContextRegistry::new();
        let first = Arc::new("first".to_string());
        let second = Arc::new("second".to_string());

        let h1 = registry.register(&first);
        let h2 = registry.register(&second);

        assert_ne!(h1, h2);
        assert_eq!(*registry.resolve(h1).unwrap(), "first");
        assert_eq!(*registry.resolve(h2).unwrap(), "second");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister_is_permanent() {
        let registry = ContextRegistry::new();
        let context = Arc::new(1u32);
        let handle = registry.register(&context);

        assert!(registry.unregister(handle));
        assert!(!registry.unregister(handle));
        for _ in 0..3 {
            assert!(matches!(registry.resolve(handle), Err(BridgeError::MissingContext(_))));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_recycled_slot_rejects_stale_handle() {
        let registry = ContextRegistry::new();
        let old = Arc::new("old");
        let stale = registry.register(&old);
        registry.unregister(stale);

        let new = Arc::new("new");
        let fresh = registry.register(&new);

        assert_ne!(stale, fresh);
        assert!(registry.resolve(stale).is_err());
        assert_eq!(*registry.resolve(fresh).unwrap(), "new");
    }

    #[test]
    fn test_dropped_context_is_missing() {
        let registry = ContextRegistry::new();
        let context = Arc::new(5u8);
        let handle = registry.register(&context);
        drop(context);

        assert!(matches!(registry.resolve(handle), Err(BridgeError::MissingContext(raw)) if raw == handle.raw()));
        assert!(registry.unregister(handle));
    }

    #[test]
    fn test_handle_pointer_round_trip() {
        let registry = ContextRegistry::new();
        let context = Arc::new(());
        let handle = registry.register(&context);

        assert!(!handle.as_ptr().is_null());
        assert_eq!(ContextHandle::from_ptr(handle.as_ptr()), Some(handle));
        assert_eq!(ContextHandle::from_ptr(std::ptr::null()), None);
    }

    #[test]
    fn test_unknown_handles_never_resolve() {
        let registry: ContextRegistry<u8> = ContextRegistry::new();
        let bogus = ContextHandle::from_raw(99).unwrap();

        assert!(registry.resolve(bogus).is_err());
        assert!(!registry.unregister(bogus));
    }

    #[test]
    fn test_trait_objects() {
        let registry: ContextRegistry<dyn Fn() -> u32 + Send + Sync> = ContextRegistry::new();
        let context: Arc<dyn Fn() -> u32 + Send + Sync> = Arc::new(|| 42);
        let handle = registry.register(&context);

        assert_eq!((registry.resolve(handle).unwrap())(), 42);
    }
}
