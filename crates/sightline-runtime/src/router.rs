//! Dispatch router: applies queued channel updates to subscribed elements.
//!
//! Connection handling is shared by every kind. A disconnected input forces
//! the element into the not-connected state, whatever its colour policy,
//! and drops write access. A connected input is handed to the element kind
//! once all of the element's bound inputs are connected. Kinds that only
//! evaluate expressions run on every connected update and read inputs that
//! are still down as 0.0, while the element keeps showing not connected.

use tracing::trace;

use crate::element::{BindingState, Element, ElementKind, Palette, UpdateContext};
use crate::registry::{MonitorRegistry, SlotId, Target, Update};
use crate::value::Severity;

/// Follow-up action an update asks the engine to perform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    /// Publish a calc result into the soft channel it owns.
    PublishSoft { slot: SlotId, value: f64 },
}

#[derive(Debug, Default)]
pub struct DispatchRouter {
    dispatched: u64,
    dropped: u64,
}

impl DispatchRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `update` to the element behind `target`.
    pub fn dispatch(
        &mut self,
        registry: &MonitorRegistry,
        element: &mut Element,
        update: &Update,
        target: Target,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Element {
            name,
            class,
            kind,
            binding,
            view,
            ..
        } = element;
        if binding.state == BindingState::Released {
            self.dropped += 1;
            return effects;
        }
        let position = usize::from(target.subscriber.position);
        let Some(input) = binding
            .inputs
            .get_mut(position)
            .filter(|input| input.slot == Some(update.slot))
        else {
            self.dropped += 1;
            return effects;
        };
        let connected = update.state.is_connected();
        input.connected = connected;
        let role = input.role;
        let channel = input.name.clone();
        self.dispatched += 1;

        if !connected {
            trace!("'{}' lost '{channel}'", name);
            binding.state = BindingState::Disconnected;
            binding.static_applied = false;
            view.connected = false;
            view.severity = Severity::NotConnected;
            view.palette = Palette::NotConnected;
            view.writable = false;
            return effects;
        }
        let complete = binding.all_connected();
        if !complete && !evaluates_partial(kind) {
            return effects;
        }
        if complete {
            binding.state = BindingState::Connected;
            view.connected = true;
        }

        let mut ctx = UpdateContext {
            registry,
            subscriber: target.subscriber,
            class: *class,
            element: name,
            channel: &channel,
            role,
            state: &update.state,
            initialize: target.initialize,
            effects: &mut effects,
        };
        kind.on_update(binding, view, &mut ctx);
        if !complete {
            binding.static_applied = false;
            view.severity = Severity::NotConnected;
            view.palette = Palette::NotConnected;
            return effects;
        }
        if class.accepts_input() {
            view.writable = update.state.access.write;
        }
        effects
    }

    /// Updates applied to an element so far.
    #[must_use]
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Updates that found no live subscriber.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

fn evaluates_partial(kind: &ElementKind) -> bool {
    matches!(
        kind,
        ElementKind::Calc(_) | ElementKind::Decoration(_) | ElementKind::Image(_)
    )
}
