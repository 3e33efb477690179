//! Monitor registry: one slot per distinct channel name.
//!
//! Every channel reference in every open window registers here. The first
//! registration of a name allocates a slot and asks the value source to
//! connect; later registrations of the same post-substitution name only add
//! a subscriber. Soft channels are registry-only values declared by calc
//! elements; the first declarer owns the value and later declarers alias to
//! the same slot.
//!
//! All mutation happens under one mutex. Channel state is kept as an
//! `Arc<ChannelState>` that is replaced whole, so readers cloning the `Arc`
//! always see a complete value. Updates are queued in arrival order on a
//! channel drained by the dispatch side.

use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::error::DisplayError;
use crate::source::{SourceHandle, ValueSource, WriteRequest};
use crate::template::MacroTable;
use crate::value::{Access, ChannelState, ConnectionState, FieldType};

/// Stable numeric handle of a registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SlotId(pub u32);

impl SlotId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WindowId(pub u32);

/// Index of an element inside its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ElementId(pub u32);

/// One element input bound to a slot. `position` indexes the element's
/// ordered input list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscriber {
    pub window: WindowId,
    pub element: ElementId,
    pub position: u16,
}

impl Subscriber {
    fn same_element(self, other: Self) -> bool {
        self.window == other.window && self.element == other.element
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Connected through the value source.
    External,
    /// Registry-only derived value.
    Soft,
}

/// Outcome of a registration that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered(SlotId),
    /// Macro substitution could not proceed; the caller keeps the original
    /// text and leaves the input unbound.
    Skipped,
}

/// A channel reference to register.
#[derive(Debug, Clone, Copy)]
pub struct Registration<'a> {
    pub name: &'a str,
    pub macros: &'a MacroTable,
    pub subscriber: Subscriber,
    pub kind: ChannelKind,
    /// File the reference was declared in.
    pub origin: &'a str,
}

/// A queued state change awaiting dispatch.
#[derive(Debug, Clone)]
pub struct Update {
    pub slot: SlotId,
    pub name: SmolStr,
    pub kind: ChannelKind,
    pub state: Arc<ChannelState>,
    pub targets: Vec<Target>,
}

/// One subscriber an update must be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub subscriber: Subscriber,
    /// First connected update this subscriber sees since (re)connecting.
    pub initialize: bool,
}

/// Read-only view of a slot for introspection.
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    pub slot: SlotId,
    pub name: SmolStr,
    pub kind: ChannelKind,
    pub state: Arc<ChannelState>,
    pub origin: SmolStr,
    pub subscribers: usize,
}

#[derive(Debug, Clone, Copy)]
struct Delivery {
    slot: SlotId,
    generation: u32,
    /// Catch-up for one late subscriber; `None` reaches every subscriber.
    only: Option<Subscriber>,
}

#[derive(Debug)]
struct SubscriberEntry {
    subscriber: Subscriber,
    initialized: bool,
}

#[derive(Debug)]
struct ChannelSlot {
    name: SmolStr,
    kind: ChannelKind,
    generation: u32,
    state: Arc<ChannelState>,
    origin: SmolStr,
    handle: Option<SourceHandle>,
    subscribers: Vec<SubscriberEntry>,
    /// Soft declarers in declaration order; the first owns the value.
    owners: Vec<Subscriber>,
    releasing: bool,
}

#[derive(Debug, Default)]
struct RegistryInner {
    slots: Vec<Option<ChannelSlot>>,
    by_name: FxHashMap<SmolStr, SlotId>,
    free: Vec<SlotId>,
    capacity: usize,
    next_generation: u32,
}

impl RegistryInner {
    fn allocate(&mut self) -> Option<SlotId> {
        if let Some(slot) = self.free.pop() {
            return Some(slot);
        }
        if self.slots.len() >= self.capacity {
            return None;
        }
        let slot = SlotId(u32::try_from(self.slots.len()).ok()?);
        self.slots.push(None);
        Some(slot)
    }

    fn live_mut(&mut self, slot: SlotId, generation: u32) -> Option<&mut ChannelSlot> {
        self.slots
            .get_mut(slot.index())
            .and_then(Option::as_mut)
            .filter(|entry| entry.generation == generation && !entry.releasing)
    }

    fn by_slot(&self, slot: SlotId) -> Option<&ChannelSlot> {
        self.slots
            .get(slot.index())
            .and_then(Option::as_ref)
            .filter(|entry| !entry.releasing)
    }
}

struct Shared {
    inner: Mutex<RegistryInner>,
    queue: Sender<Delivery>,
}

impl Shared {
    /// Replaces the slot state and queues a delivery. Returns false when the
    /// slot was released or reused since the link was issued.
    fn apply(&self, slot: SlotId, generation: u32, state: ChannelState) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.live_mut(slot, generation) else {
            debug!("dropping update for released slot {}", slot.0);
            return false;
        };
        if state.is_connected() && !entry.state.is_connected() {
            for subscriber in &mut entry.subscribers {
                subscriber.initialized = false;
            }
        }
        entry.state = Arc::new(state);
        let _ = self.queue.send(Delivery {
            slot,
            generation,
            only: None,
        });
        true
    }
}

/// Handle a value source publishes channel state through.
///
/// Links hold only a weak reference to the registry; publishing after the
/// registry is gone, or after the slot was released, is a no-op.
#[derive(Clone)]
pub struct ChannelLink {
    slot: SlotId,
    generation: u32,
    shared: Weak<Shared>,
}

impl ChannelLink {
    /// Publishes a new channel state. Returns false if it was dropped.
    pub fn publish(&self, state: ChannelState) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.apply(self.slot, self.generation, state),
            None => false,
        }
    }

    #[must_use]
    pub fn slot(&self) -> SlotId {
        self.slot
    }
}

impl std::fmt::Debug for ChannelLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLink")
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// The shared channel table.
pub struct MonitorRegistry {
    shared: Arc<Shared>,
    deliveries: Receiver<Delivery>,
    source: Arc<dyn ValueSource>,
    drain: Duration,
}

fn soft_state() -> ChannelState {
    ChannelState {
        fec: SmolStr::new("soft"),
        ..ChannelState::connected(0.0)
    }
}

impl MonitorRegistry {
    pub fn new(source: Arc<dyn ValueSource>, capacity: usize, drain: Duration) -> Self {
        let (queue, deliveries) = crossbeam_channel::unbounded();
        let inner = RegistryInner {
            capacity,
            ..RegistryInner::default()
        };
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(inner),
                queue,
            }),
            deliveries,
            source,
            drain,
        }
    }

    /// Registers one channel reference.
    pub fn register(&self, request: Registration<'_>) -> Result<RegisterOutcome, DisplayError> {
        let raw = request.name.trim();
        if raw.is_empty() {
            return Err(DisplayError::EmptyName);
        }
        let substituted = request.macros.substitute(raw);
        if substituted.cannot_proceed {
            debug!("skipping '{raw}': no macro table bound");
            return Ok(RegisterOutcome::Skipped);
        }
        let name = SmolStr::new(substituted.text.trim());
        if name.is_empty() {
            return Err(DisplayError::EmptyName);
        }

        let (slot, link) = {
            let mut inner = self.shared.inner.lock();
            if let Some(slot) = inner.by_name.get(&name).copied() {
                let Some(entry) = inner.slots.get_mut(slot.index()).and_then(Option::as_mut)
                else {
                    return Err(DisplayError::NotFound(name));
                };
                entry.subscribers.push(SubscriberEntry {
                    subscriber: request.subscriber,
                    initialized: false,
                });
                if request.kind == ChannelKind::Soft {
                    if entry.kind == ChannelKind::Soft {
                        debug!(
                            "soft channel '{name}' already declared, aliasing to slot {}",
                            slot.0
                        );
                        entry.owners.push(request.subscriber);
                    } else {
                        debug!("'{name}' is already an external channel, soft declaration ignored");
                    }
                }
                if entry.state.is_connected() {
                    let _ = self.shared.queue.send(Delivery {
                        slot,
                        generation: entry.generation,
                        only: Some(request.subscriber),
                    });
                }
                return Ok(RegisterOutcome::Registered(slot));
            }

            let Some(slot) = inner.allocate() else {
                warn!(
                    "slot table full ({} slots), '{name}' will not connect",
                    inner.capacity
                );
                return Err(DisplayError::SlotExhausted(name));
            };
            let generation = inner.next_generation;
            inner.next_generation = inner.next_generation.wrapping_add(1);
            let soft = request.kind == ChannelKind::Soft;
            inner.slots[slot.index()] = Some(ChannelSlot {
                name: name.clone(),
                kind: request.kind,
                generation,
                state: Arc::new(if soft {
                    soft_state()
                } else {
                    ChannelState::default()
                }),
                origin: SmolStr::new(request.origin),
                handle: None,
                subscribers: vec![SubscriberEntry {
                    subscriber: request.subscriber,
                    initialized: false,
                }],
                owners: if soft {
                    vec![request.subscriber]
                } else {
                    Vec::new()
                },
                releasing: false,
            });
            inner.by_name.insert(name.clone(), slot);
            if soft {
                debug!("soft channel '{name}' created in slot {}", slot.0);
                let _ = self.shared.queue.send(Delivery {
                    slot,
                    generation,
                    only: None,
                });
                return Ok(RegisterOutcome::Registered(slot));
            }
            let link = ChannelLink {
                slot,
                generation,
                shared: Arc::downgrade(&self.shared),
            };
            (slot, link)
        };

        let generation = link.generation;
        match self.source.connect(&name, link) {
            Ok(handle) => {
                let mut inner = self.shared.inner.lock();
                if let Some(entry) = inner.live_mut(slot, generation) {
                    entry.handle = Some(handle);
                } else {
                    drop(inner);
                    self.source.disconnect(handle);
                }
            }
            Err(err) => warn!("could not connect '{name}': {err}"),
        }
        Ok(RegisterOutcome::Registered(slot))
    }

    /// Tears down every subscription of `window`.
    ///
    /// Slots left without subscribers are detached and disconnected, then
    /// freed after the drain delay. Returns the number of freed slots.
    pub fn release(&self, window: WindowId) -> usize {
        let mut handles = Vec::new();
        let mut detached = Vec::new();
        {
            let mut inner = self.shared.inner.lock();
            let mut names = Vec::new();
            for (index, entry) in inner.slots.iter_mut().enumerate() {
                let Some(entry) = entry.as_mut().filter(|entry| !entry.releasing) else {
                    continue;
                };
                entry
                    .subscribers
                    .retain(|subscriber| subscriber.subscriber.window != window);
                if entry.kind == ChannelKind::Soft {
                    let owned = entry
                        .owners
                        .first()
                        .is_some_and(|owner| owner.window == window);
                    entry.owners.retain(|owner| owner.window != window);
                    if owned {
                        if let Some(next) = entry.owners.first() {
                            debug!(
                                "soft channel '{}' now owned by window {} element {}",
                                entry.name, next.window.0, next.element.0
                            );
                        }
                    }
                }
                if entry.subscribers.is_empty() {
                    entry.releasing = true;
                    handles.extend(entry.handle.take());
                    names.push(entry.name.clone());
                    detached.push(index);
                }
            }
            for name in names {
                inner.by_name.remove(&name);
            }
        }
        for handle in handles {
            self.source.disconnect(handle);
        }
        if detached.is_empty() {
            return 0;
        }
        std::thread::sleep(self.drain);
        let mut inner = self.shared.inner.lock();
        for index in &detached {
            inner.slots[*index] = None;
            if let Ok(index) = u32::try_from(*index) {
                inner.free.push(SlotId(index));
            }
        }
        info!("window {} released {} slots", window.0, detached.len());
        detached.len()
    }

    /// Next queued update, without blocking.
    pub fn try_next(&self) -> Option<Update> {
        while let Ok(delivery) = self.deliveries.try_recv() {
            if let Some(update) = self.take(delivery) {
                return Some(update);
            }
        }
        None
    }

    /// Next queued update, waiting up to `timeout`.
    pub fn next_timeout(&self, timeout: Duration) -> Option<Update> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            let delivery = self.deliveries.recv_timeout(remaining).ok()?;
            if let Some(update) = self.take(delivery) {
                return Some(update);
            }
        }
    }

    fn take(&self, delivery: Delivery) -> Option<Update> {
        let mut inner = self.shared.inner.lock();
        let entry = inner.live_mut(delivery.slot, delivery.generation)?;
        let connected = entry.state.is_connected();
        let targets: Vec<Target> = entry
            .subscribers
            .iter_mut()
            .filter(|subscriber| {
                delivery
                    .only
                    .map_or(true, |only| only == subscriber.subscriber)
            })
            .map(|subscriber| {
                let initialize = connected && !subscriber.initialized;
                if connected {
                    subscriber.initialized = true;
                }
                Target {
                    subscriber: subscriber.subscriber,
                    initialize,
                }
            })
            .collect();
        if targets.is_empty() {
            return None;
        }
        Some(Update {
            slot: delivery.slot,
            name: entry.name.clone(),
            kind: entry.kind,
            state: Arc::clone(&entry.state),
            targets,
        })
    }

    /// Current state of a live slot.
    pub fn state(&self, slot: SlotId) -> Option<Arc<ChannelState>> {
        let inner = self.shared.inner.lock();
        inner.by_slot(slot).map(|entry| Arc::clone(&entry.state))
    }

    /// Looks a channel up by post-substitution name.
    pub fn lookup(&self, name: &str) -> Result<ChannelSnapshot, DisplayError> {
        let inner = self.shared.inner.lock();
        let slot = inner
            .by_name
            .get(name.trim())
            .copied()
            .ok_or_else(|| DisplayError::NotFound(SmolStr::new(name)))?;
        let entry = inner
            .by_slot(slot)
            .ok_or_else(|| DisplayError::NotFound(SmolStr::new(name)))?;
        Ok(ChannelSnapshot {
            slot,
            name: entry.name.clone(),
            kind: entry.kind,
            state: Arc::clone(&entry.state),
            origin: entry.origin.clone(),
            subscribers: entry.subscribers.len(),
        })
    }

    /// Whether `subscriber`'s element owns the soft channel in `slot`.
    pub fn owns_soft(&self, slot: SlotId, subscriber: Subscriber) -> bool {
        let inner = self.shared.inner.lock();
        inner.by_slot(slot).is_some_and(|entry| {
            entry.kind == ChannelKind::Soft
                && entry
                    .owners
                    .first()
                    .is_some_and(|owner| owner.same_element(subscriber))
        })
    }

    /// Sets the value of a soft channel. Unchanged values are not requeued.
    pub fn publish_soft(&self, slot: SlotId, value: f64) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(entry) = inner.slots.get_mut(slot.index()).and_then(Option::as_mut) else {
            return false;
        };
        if entry.releasing || entry.kind != ChannelKind::Soft {
            return false;
        }
        if entry.state.is_connected() && entry.state.value.to_bits() == value.to_bits() {
            return false;
        }
        let mut state = ChannelState::clone(&entry.state);
        state.set_value(value);
        state.connection = ConnectionState::Connected;
        entry.state = Arc::new(state);
        let _ = self.shared.queue.send(Delivery {
            slot,
            generation: entry.generation,
            only: None,
        });
        true
    }

    /// Forwards a write. Soft channels are set locally and re-dispatched.
    pub fn write(&self, request: &WriteRequest) -> Result<(), DisplayError> {
        {
            let mut inner = self.shared.inner.lock();
            let slot = inner
                .by_name
                .get(&request.name)
                .copied()
                .ok_or_else(|| DisplayError::NotFound(request.name.clone()))?;
            let Some(entry) = inner.slots.get_mut(slot.index()).and_then(Option::as_mut) else {
                return Err(DisplayError::NotFound(request.name.clone()));
            };
            if entry.kind == ChannelKind::Soft {
                let mut state = ChannelState::clone(&entry.state);
                if state.field_type == FieldType::String {
                    state.text = request.text.clone();
                } else {
                    state.set_value(request.numeric);
                }
                state.access = Access::READ_WRITE;
                entry.state = Arc::new(state);
                let _ = self.shared.queue.send(Delivery {
                    slot,
                    generation: entry.generation,
                    only: None,
                });
                return Ok(());
            }
        }
        if let Err(err) = self.source.write(request) {
            warn!("write to '{}' by '{}' failed: {err}", request.name, request.actor);
        }
        Ok(())
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.shared.inner.lock().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn source(&self) -> &Arc<dyn ValueSource> {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::NullSource;

    fn registry(capacity: usize) -> MonitorRegistry {
        MonitorRegistry::new(Arc::new(NullSource::default()), capacity, Duration::ZERO)
    }

    fn subscriber(window: u32, element: u32) -> Subscriber {
        Subscriber {
            window: WindowId(window),
            element: ElementId(element),
            position: 0,
        }
    }

    fn register(
        registry: &MonitorRegistry,
        name: &str,
        macros: &MacroTable,
        who: Subscriber,
        kind: ChannelKind,
    ) -> Result<RegisterOutcome, DisplayError> {
        registry.register(Registration {
            name,
            macros,
            subscriber: who,
            kind,
            origin: "test.ui",
        })
    }

    #[test]
    fn whitespace_name_is_rejected_without_side_effect() {
        let registry = registry(4);
        let err = register(
            &registry,
            "   ",
            &MacroTable::new(),
            subscriber(0, 0),
            ChannelKind::External,
        )
        .expect_err("empty");
        assert_eq!(err, DisplayError::EmptyName);
        assert!(registry.is_empty());
    }

    #[test]
    fn placeholder_without_table_is_skipped() {
        let registry = registry(4);
        let outcome = register(
            &registry,
            "$(P):VAL",
            &MacroTable::new(),
            subscriber(0, 0),
            ChannelKind::External,
        )
        .expect("register");
        assert_eq!(outcome, RegisterOutcome::Skipped);
        assert!(registry.is_empty());
    }

    #[test]
    fn exhausted_table_fails_only_the_new_name() {
        let registry = registry(1);
        let macros = MacroTable::new();
        let first = register(&registry, "A", &macros, subscriber(0, 0), ChannelKind::External)
            .expect("first");
        let err = register(&registry, "B", &macros, subscriber(0, 1), ChannelKind::External)
            .expect_err("full");
        assert!(matches!(err, DisplayError::SlotExhausted(_)));
        let again = register(&registry, "A", &macros, subscriber(0, 2), ChannelKind::External)
            .expect("dedup still works");
        assert_eq!(first, again);
    }

    #[test]
    fn freed_slots_are_reused_after_release() {
        let registry = registry(1);
        let macros = MacroTable::new();
        register(&registry, "A", &macros, subscriber(0, 0), ChannelKind::External)
            .expect("first");
        assert_eq!(registry.release(WindowId(0)), 1);
        let outcome = register(&registry, "B", &macros, subscriber(1, 0), ChannelKind::External)
            .expect("reuse");
        assert_eq!(outcome, RegisterOutcome::Registered(SlotId(0)));
    }

    #[test]
    fn soft_ownership_passes_to_next_declarer() {
        let registry = registry(4);
        let macros = MacroTable::new();
        let first = subscriber(0, 0);
        let second = subscriber(1, 0);
        let RegisterOutcome::Registered(slot) =
            register(&registry, "CALC1", &macros, first, ChannelKind::Soft).expect("first")
        else {
            panic!("expected slot");
        };
        register(&registry, "CALC1", &macros, second, ChannelKind::Soft).expect("second");
        assert!(registry.owns_soft(slot, first));
        assert!(!registry.owns_soft(slot, second));
        assert_eq!(registry.release(WindowId(0)), 0);
        assert!(registry.owns_soft(slot, second));
    }

    #[test]
    fn soft_publish_ignores_unchanged_values() {
        let registry = registry(4);
        let RegisterOutcome::Registered(slot) = register(
            &registry,
            "CALC1",
            &MacroTable::new(),
            subscriber(0, 0),
            ChannelKind::Soft,
        )
        .expect("soft") else {
            panic!("expected slot");
        };
        while registry.try_next().is_some() {}
        assert!(registry.publish_soft(slot, 2.0));
        assert!(!registry.publish_soft(slot, 2.0));
        let update = registry.try_next().expect("queued");
        assert_eq!(update.state.value, 2.0);
        assert!(registry.try_next().is_none());
    }
}
