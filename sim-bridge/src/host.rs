//! Host-side collaborators reached through the callbacks
//!
//! The bridge does not plot, log or iterate controls itself. A [`HostContext`]
//! bundles whichever collaborators a session provides; callbacks for a missing
//! collaborator are accepted as no-ops.

use crate::types::{ControlPhase, Event, EventCode, Message, PlotRequest};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Plotting subsystem
pub trait PlotHandler: Send + Sync {
    fn plot(&self, request: &PlotRequest) -> anyhow::Result<()>;
}

impl<F> PlotHandler for F
where
    F: Fn(&PlotRequest) -> anyhow::Result<()> + Send + Sync,
{
    fn plot(&self, request: &PlotRequest) -> anyhow::Result<()> {
        self(request)
    }
}

/// Message sink for the engine's write callback
pub trait MessageSink: Send + Sync {
    fn write(&self, message: &Message) -> anyhow::Result<()>;
}

impl<F> MessageSink for F
where
    F: Fn(&Message) -> anyhow::Result<()> + Send + Sync,
{
    fn write(&self, message: &Message) -> anyhow::Result<()> {
        self(message)
    }
}

/// Control-iteration subsystem
pub trait ControlLoop: Send + Sync {
    fn init(&self) -> anyhow::Result<()>;
    fn check(&self) -> anyhow::Result<()>;
    fn step(&self) -> anyhow::Result<()>;

    fn run_phase(&self, phase: ControlPhase) -> anyhow::Result<()> {
        match phase {
            ControlPhase::Init => self.init(),
            ControlPhase::Check => self.check(),
            ControlPhase::Step => self.step(),
        }
    }
}

/// Subscriber to event notifications
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, event: &Event) -> anyhow::Result<()>;
}

impl<F> EventSubscriber for F
where
    F: Fn(&Event) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        self(event)
    }
}

/// Identifies one subscription within a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Subscribers = Vec<(SubscriptionId, Arc<dyn EventSubscriber>)>;

fn same_subscriber(a: &Arc<dyn EventSubscriber>, b: &Arc<dyn EventSubscriber>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Outcome of adding a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Added {
    pub id: SubscriptionId,
    /// This was the first subscriber for the code
    pub first: bool,
    /// The subscriber was already present; nothing changed
    pub existing: bool,
}

/// Per-code subscriber lists of one context
#[derive(Default)]
pub struct EventHub {
    next_id: AtomicU64,
    subscribers: RwLock<BTreeMap<EventCode, Subscribers>>,
}

impl EventHub {
    pub(crate) fn add(&self, code: EventCode, subscriber: Arc<dyn EventSubscriber>) -> Added {
        let mut map = self.subscribers.write();
        let list = map.entry(code).or_default();

        if let Some((id, _)) = list.iter().find(|(_, s)| same_subscriber(s, &subscriber)) {
            return Added {
                id: *id,
                first: false,
                existing: true,
            };
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let first = list.is_empty();
        list.push((id, subscriber));
        Added {
            id,
            first,
            existing: false,
        }
    }

    /// Remove a subscription; returns (removed, no subscribers left for the code)
    pub(crate) fn remove(&self, code: EventCode, id: SubscriptionId) -> (bool, bool) {
        let mut map = self.subscribers.write();
        let Some(list) = map.get_mut(&code) else {
            return (false, true);
        };

        let before = list.len();
        list.retain(|(sid, _)| *sid != id);
        let removed = list.len() != before;
        let empty = list.is_empty();
        if empty {
            map.remove(&code);
        }
        (removed, empty)
    }

    /// Drop every subscription, returning the codes that had subscribers
    pub(crate) fn clear(&self) -> Vec<EventCode> {
        let mut map = self.subscribers.write();
        let codes = map.keys().copied().collect();
        map.clear();
        codes
    }

    /// Codes with at least one subscriber
    pub fn subscribed_codes(&self) -> Vec<EventCode> {
        self.subscribers.read().keys().copied().collect()
    }

    pub fn subscriber_count(&self, code: EventCode) -> usize {
        self.subscribers.read().get(&code).map_or(0, Vec::len)
    }

    /// Deliver an event to its subscribers in subscription order
    ///
    /// Stops at the first failing subscriber. The list is snapshotted first,
    /// so subscribers may subscribe or unsubscribe while handling the event.
    pub fn dispatch(&self, event: &Event) -> anyhow::Result<()> {
        let snapshot: Vec<Arc<dyn EventSubscriber>> = match self.subscribers.read().get(&event.code) {
            Some(list) => list.iter().map(|(_, s)| Arc::clone(s)).collect(),
            None => return Ok(()),
        };

        for subscriber in snapshot {
            subscriber.on_event(event)?;
        }
        Ok(())
    }
}

/// Host state behind one context handle
pub struct HostContext {
    name: String,
    plot: Option<Arc<dyn PlotHandler>>,
    messages: Option<Arc<dyn MessageSink>>,
    controls: Option<Arc<dyn ControlLoop>>,
    events: EventHub,
    /// Set while an open session owns this context
    bound: AtomicBool,
}

impl HostContext {
    /// Create a context with no collaborators attached
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plot: None,
            messages: None,
            controls: None,
            events: EventHub::default(),
            bound: AtomicBool::new(false),
        }
    }

    /// Builder method: attach a plotting subsystem
    pub fn with_plot(mut self, handler: Arc<dyn PlotHandler>) -> Self {
        self.plot = Some(handler);
        self
    }

    /// Builder method: attach a message sink
    pub fn with_messages(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.messages = Some(sink);
        self
    }

    /// Builder method: attach a control loop
    pub fn with_controls(mut self, controls: Arc<dyn ControlLoop>) -> Self {
        self.controls = Some(controls);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn plot_handler(&self) -> Option<&Arc<dyn PlotHandler>> {
        self.plot.as_ref()
    }

    pub fn message_sink(&self) -> Option<&Arc<dyn MessageSink>> {
        self.messages.as_ref()
    }

    pub fn control_loop(&self) -> Option<&Arc<dyn ControlLoop>> {
        self.controls.as_ref()
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// True while an open session owns this context
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    /// Claim the context for a session; false if another session holds it
    pub(crate) fn bind(&self) -> bool {
        self.bound
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn unbind(&self) {
        self.bound.store(false, Ordering::Release);
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("name", &self.name)
            .field("plot", &self.plot.is_some())
            .field("messages", &self.messages.is_some())
            .field("controls", &self.controls.is_some())
            .field("events", &self.events.subscribed_codes())
            .field("bound", &self.is_bound())
            .finish()
    }
}
