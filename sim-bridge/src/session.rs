//! Session lifecycle: a registered context with its callbacks wired in
//!
//! Opening a session registers the host context, then the callbacks of the
//! dispatch table. Closing (or dropping) it undoes both, event callbacks
//! first so the engine stops calling before the handle goes away.
//!
//! A host context belongs to at most one open session at a time: its event
//! subscribers are tied to the engine registrations of that session's handle.

use crate::dispatcher::Dispatcher;
use crate::host::{EventSubscriber, HostContext, SubscriptionId};
use crate::native::NativeLibrary;
use crate::registry::ContextHandle;
use crate::table::DispatchTable;
use crate::types::{BridgeError, EventCode, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// One host context registered with the engine
pub struct Session {
    dispatcher: Arc<Dispatcher>,
    context: Arc<HostContext>,
    handle: ContextHandle,
    table: DispatchTable,
    /// Serializes subscription changes and guards against double close
    state: Mutex<bool>,
}

impl Session {
    pub(crate) fn open(dispatcher: Arc<Dispatcher>, context: Arc<HostContext>) -> Result<Self> {
        if !context.bind() {
            return Err(BridgeError::ContextInUse(context.name().to_string()));
        }

        let table = DispatchTable::trampolines();
        let handle = dispatcher.registry().register(&context);

        if let Err(e) = table.register_session(dispatcher.library().as_ref(), handle) {
            log::error!("Failed to open session '{}': {}", context.name(), e);
            dispatcher.library().release(handle);
            dispatcher.registry().unregister(handle);
            context.unbind();
            return Err(e);
        }

        log::info!("Opened session '{}' with handle {}", context.name(), handle);
        Ok(Self {
            dispatcher,
            context,
            handle,
            table,
            state: Mutex::new(false),
        })
    }

    pub fn handle(&self) -> ContextHandle {
        self.handle
    }

    pub fn context(&self) -> &Arc<HostContext> {
        &self.context
    }

    /// Subscribe to an event code
    ///
    /// The engine learns about the event callback when the first subscriber
    /// for a code arrives. Subscribing the same subscriber twice returns the
    /// existing id.
    pub fn subscribe(&self, code: EventCode, subscriber: Arc<dyn EventSubscriber>) -> Result<SubscriptionId> {
        let _guard = self.state.lock();
        let added = self.context.events().add(code, subscriber);

        if added.first {
            if let Err(e) = self
                .table
                .register_event(self.dispatcher.library().as_ref(), self.handle, code)
            {
                self.context.events().remove(code, added.id);
                return Err(e);
            }
            log::debug!("Session '{}' now receives event {}", self.context.name(), code);
        }

        Ok(added.id)
    }

    /// Remove a subscription; returns false if it did not exist
    pub fn unsubscribe(&self, code: EventCode, id: SubscriptionId) -> bool {
        let _guard = self.state.lock();
        let (removed, empty) = self.context.events().remove(code, id);

        if removed && empty {
            self.table
                .unregister_event(self.dispatcher.library().as_ref(), self.handle, code);
        }
        removed
    }

    /// Unwire the callbacks and drop the registry entry
    pub fn close(self) {
        self.teardown();
    }

    fn teardown(&self) {
        let mut closed = self.state.lock();
        if *closed {
            return;
        }
        *closed = true;

        let library: &dyn NativeLibrary = self.dispatcher.library().as_ref();
        for code in self.context.events().clear() {
            self.table.unregister_event(library, self.handle, code);
        }
        library.release(self.handle);
        self.dispatcher.registry().unregister(self.handle);
        self.context.unbind();

        log::info!("Closed session '{}' ({})", self.context.name(), self.handle);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::native::{ControlCallback, EventCallback, PlotCallback, WriteCallback};
    use crate::types::{BridgeError, CallbackKind, ControlPhase, Event};
    use std::collections::HashMap;

    #[derive(Default)]
    struct Ledger {
        /// Number of accepted registrations per (kind, event code)
        registered: Mutex<HashMap<(CallbackKind, Option<EventCode>), usize>>,
        released: Mutex<Vec<ContextHandle>>,
        reject: Option<CallbackKind>,
    }

    impl Ledger {
        fn rejecting(kind: CallbackKind) -> Self {
            Self {
                reject: Some(kind),
                ..Self::default()
            }
        }

        fn record(&self, kind: CallbackKind, code: Option<EventCode>, delta: isize) -> bool {
            if self.reject == Some(kind) {
                return false;
            }
            let mut registered = self.registered.lock();
            let count = registered.entry((kind, code)).or_insert(0);
            *count = count.saturating_add_signed(delta);
            true
        }

        fn count(&self, kind: CallbackKind, code: Option<EventCode>) -> usize {
            self.registered.lock().get(&(kind, code)).copied().unwrap_or(0)
        }
    }

    impl NativeLibrary for Ledger {
        fn register_plot(&self, _: ContextHandle, _: PlotCallback) -> bool {
            self.record(CallbackKind::Plot, None, 1)
        }
        fn register_write(&self, _: ContextHandle, _: WriteCallback) -> bool {
            self.record(CallbackKind::Write, None, 1)
        }
        fn register_controls(&self, _: ContextHandle, phase: ControlPhase, _: ControlCallback) -> bool {
            self.record(phase.callback_kind(), None, 1)
        }
        fn register_event(&self, _: ContextHandle, code: EventCode, _: EventCallback) -> bool {
            self.record(CallbackKind::Event, Some(code), 1)
        }
        fn unregister_event(&self, _: ContextHandle, code: EventCode, _: EventCallback) -> bool {
            self.record(CallbackKind::Event, Some(code), -1)
        }
        fn release(&self, ctx: ContextHandle) {
            self.released.lock().push(ctx);
        }
    }

    fn noop() -> Arc<dyn EventSubscriber> {
        Arc::new(|_: &Event| -> anyhow::Result<()> { Ok(()) })
    }

    #[test]
    fn test_open_registers_each_callback_once() {
        let library = Arc::new(Ledger::default());
        let dispatcher = Arc::new(Dispatcher::new(library.clone(), BridgeConfig::new()));
        let session = dispatcher
            .open_session(Arc::new(HostContext::new("feeder")))
            .unwrap();

        for kind in [
            CallbackKind::Plot,
            CallbackKind::Write,
            CallbackKind::InitControls,
            CallbackKind::CheckControls,
            CallbackKind::StepControls,
        ] {
            assert_eq!(library.count(kind, None), 1, "{}", kind);
        }
        assert!(dispatcher.registry().resolve(session.handle()).is_ok());
    }

    #[test]
    fn test_rejected_registration_rolls_back() {
        let library = Arc::new(Ledger::rejecting(CallbackKind::Write));
        let dispatcher = Arc::new(Dispatcher::new(library.clone(), BridgeConfig::new()));
        let context = Arc::new(HostContext::new("feeder"));

        let err = dispatcher.open_session(context.clone()).err().unwrap();

        assert!(matches!(
            err,
            BridgeError::RegistrationFailed {
                kind: CallbackKind::Write,
                ..
            }
        ));
        assert!(dispatcher.registry().is_empty());
        assert_eq!(library.released.lock().len(), 1);
        assert!(!context.is_bound());
    }

    #[test]
    fn test_event_registration_follows_subscribers() {
        let library = Arc::new(Ledger::default());
        let dispatcher = Arc::new(Dispatcher::new(library.clone(), BridgeConfig::new()));
        let session = dispatcher
            .open_session(Arc::new(HostContext::new("feeder")))
            .unwrap();
        let clear = Some(EventCode::CLEAR);

        let a = noop();
        let first = session.subscribe(EventCode::CLEAR, a.clone()).unwrap();
        let second = session.subscribe(EventCode::CLEAR, noop()).unwrap();
        assert_eq!(session.subscribe(EventCode::CLEAR, a).unwrap(), first);
        assert_eq!(library.count(CallbackKind::Event, clear), 1);

        assert!(session.unsubscribe(EventCode::CLEAR, first));
        assert_eq!(library.count(CallbackKind::Event, clear), 1);
        assert!(session.unsubscribe(EventCode::CLEAR, second));
        assert_eq!(library.count(CallbackKind::Event, clear), 0);
        assert!(!session.unsubscribe(EventCode::CLEAR, second));
    }

    #[test]
    fn test_rejected_event_registration_drops_subscriber() {
        let library = Arc::new(Ledger::rejecting(CallbackKind::Event));
        let dispatcher = Arc::new(Dispatcher::new(library, BridgeConfig::new()));
        let session = dispatcher
            .open_session(Arc::new(HostContext::new("feeder")))
            .unwrap();

        let err = session.subscribe(EventCode::BUILD_SYSTEM_Y, noop()).unwrap_err();
        assert!(err.to_string().contains("build_system_y"));
        assert_eq!(session.context().events().subscriber_count(EventCode::BUILD_SYSTEM_Y), 0);
    }

    #[test]
    fn test_close_unwinds_everything() {
        let library = Arc::new(Ledger::default());
        let dispatcher = Arc::new(Dispatcher::new(library.clone(), BridgeConfig::new()));
        let context = Arc::new(HostContext::new("feeder"));
        let session = dispatcher.open_session(context.clone()).unwrap();
        let handle = session.handle();

        session.subscribe(EventCode::CLEAR, noop()).unwrap();
        session.subscribe(EventCode::REPROCESS_BUSES, noop()).unwrap();
        session.close();

        assert_eq!(library.count(CallbackKind::Event, Some(EventCode::CLEAR)), 0);
        assert_eq!(library.count(CallbackKind::Event, Some(EventCode::REPROCESS_BUSES)), 0);
        assert_eq!(*library.released.lock(), vec![handle]);
        assert!(matches!(
            dispatcher.registry().resolve(handle),
            Err(BridgeError::MissingContext(_))
        ));
        assert!(context.events().subscribed_codes().is_empty());
    }

    #[test]
    fn test_drop_closes_once() {
        let library = Arc::new(Ledger::default());
        let dispatcher = Arc::new(Dispatcher::new(library.clone(), BridgeConfig::new()));
        {
            let _session = dispatcher
                .open_session(Arc::new(HostContext::new("scoped")))
                .unwrap();
        }

        assert!(dispatcher.registry().is_empty());
        assert_eq!(library.released.lock().len(), 1);
    }

    #[test]
    fn test_context_is_owned_by_one_session() {
        let library = Arc::new(Ledger::default());
        let dispatcher = Arc::new(Dispatcher::new(library.clone(), BridgeConfig::new()));
        let context = Arc::new(HostContext::new("shared"));

        let first = dispatcher.open_session(context.clone()).unwrap();
        first.subscribe(EventCode::CLEAR, noop()).unwrap();

        let err = dispatcher.open_session(context.clone()).err().unwrap();
        assert!(matches!(err, BridgeError::ContextInUse(ref name) if name == "shared"));
        assert_eq!(dispatcher.registry().len(), 1);
        assert_eq!(library.count(CallbackKind::Plot, None), 1);
        assert_eq!(context.events().subscriber_count(EventCode::CLEAR), 1);

        let first_handle = first.handle();
        first.close();
        assert!(!context.is_bound());

        let second = dispatcher.open_session(context.clone()).unwrap();
        second.subscribe(EventCode::CLEAR, noop()).unwrap();
        assert_eq!(library.count(CallbackKind::Event, Some(EventCode::CLEAR)), 1);
        assert_ne!(second.handle(), first_handle);
    }
}
