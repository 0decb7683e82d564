//! Global event registry
//!
//! Indexes compiled sequences by id, by event type and by registration key,
//! and turns dispatched occurrences into running handlers. Structural changes
//! requested from inside a dispatch or update pass go through the runtime's
//! deferred queue.

use crate::runtime::Runtime;
use crate::runtime::debug::TARGET_REGISTRY;
use crate::runtime::handler::{EventHandler, HandlerList};
use crate::types::{AmbientBindings, EventType, SequenceRef};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Options of a single dispatch
#[derive(Debug, Clone, Default)]
pub struct DispatchOptions {
    /// Only run sequences whose priority flag equals this
    pub priority: Option<bool>,
    /// Payload forwarded to script listeners
    pub argument: Option<Value>,
    /// Ambient bindings applied to every created handler
    pub bindings: Option<AmbientBindings>,
    /// Handler whose context the created handlers continue
    pub inherit: Option<EventHandler>,
}

impl DispatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: bool) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn argument(mut self, argument: Value) -> Self {
        self.argument = Some(argument);
        self
    }

    pub fn bindings(mut self, bindings: AmbientBindings) -> Self {
        self.bindings = Some(bindings);
        self
    }

    pub fn inherit(mut self, parent: EventHandler) -> Self {
        self.inherit = Some(parent);
        self
    }
}

#[derive(Debug, Clone)]
struct Registration {
    event_type: EventType,
    sequence: SequenceRef,
}

#[derive(Default)]
struct RegistryInner {
    version: Cell<u64>,
    by_id: RefCell<HashMap<String, SequenceRef>>,
    by_type: RefCell<HashMap<EventType, Vec<SequenceRef>>>,
    by_key: RefCell<HashMap<String, Registration>>,
    active: HandlerList,
    pending: HandlerList,
}

/// Shared handle to the registry
#[derive(Clone, Default)]
pub struct EventRegistry(Rc<RegistryInner>);

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a compiled global event at load time.
    ///
    /// Applied immediately: loading happens outside any dispatch pass.
    pub fn load(&self, sequence: SequenceRef) {
        if let Some(id) = sequence.id() {
            let previous = self
                .0
                .by_id
                .borrow_mut()
                .insert(id.to_string(), sequence.clone());
            if let Some(previous) = previous {
                log::warn!(
                    target: TARGET_REGISTRY,
                    "Event id {} loaded twice; {} replaces {}",
                    id,
                    sequence.path(),
                    previous.path()
                );
                self.remove_from_type(&previous);
            }
        }
        self.0
            .by_type
            .borrow_mut()
            .entry(sequence.event_type().clone())
            .or_default()
            .push(sequence);
    }

    /// Sequence loaded under `id`
    pub fn get(&self, id: &str) -> Option<SequenceRef> {
        self.0.by_id.borrow().get(id).cloned()
    }

    /// Sequences of a type in dispatch order
    pub fn events(&self, event_type: &EventType) -> Vec<SequenceRef> {
        self.0
            .by_type
            .borrow()
            .get(event_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Currently enabled sequences of a type, in dispatch order
    pub fn enabled_events(&self, event_type: &EventType) -> Vec<SequenceRef> {
        self.events(event_type)
            .into_iter()
            .filter(|sequence| sequence.is_enabled())
            .collect()
    }

    /// Sequence registered under `key`
    pub fn registered(&self, key: &str) -> Option<SequenceRef> {
        self.0
            .by_key
            .borrow()
            .get(key)
            .map(|registration| registration.sequence.clone())
    }

    /// Handlers suspended across frames
    pub fn active(&self) -> &HandlerList {
        &self.0.active
    }

    /// Handlers suspended in the frame they were created, waiting for the
    /// next flush to join their tracking list
    pub(crate) fn pending(&self) -> &HandlerList {
        &self.0.pending
    }

    /// Generation counter, bumped by [`reset`](Self::reset)
    pub fn version(&self) -> u64 {
        self.0.version.get()
    }

    /// Register `sequence` under `key`, replacing any previous registration.
    ///
    /// The type-list insertion is deferred so a sequence registered during a
    /// dispatch of its own type is not visited by that dispatch. Autorun
    /// sequences also run immediately.
    pub fn register(&self, runtime: &Runtime, key: &str, event_type: EventType, sequence: SequenceRef) {
        if key.is_empty() {
            return;
        }
        if let Some(current) = self.registered(key) {
            if Rc::ptr_eq(&current, &sequence) {
                return;
            }
            self.unregister(key);
        }
        log::debug!(
            target: TARGET_REGISTRY,
            "Register {} as {} under {}",
            sequence.path(),
            event_type,
            key
        );
        self.0.by_key.borrow_mut().insert(
            key.to_string(),
            Registration {
                event_type: event_type.clone(),
                sequence: sequence.clone(),
            },
        );

        let registry = self.clone();
        let deferred_key = key.to_string();
        let deferred_sequence = sequence.clone();
        let deferred_type = event_type.clone();
        runtime.queue().push(move || {
            if !registry
                .registered(&deferred_key)
                .is_some_and(|current| Rc::ptr_eq(&current, &deferred_sequence))
            {
                return;
            }
            let mut by_type = registry.0.by_type.borrow_mut();
            let list = by_type.entry(deferred_type).or_default();
            if !list.iter().any(|s| Rc::ptr_eq(s, &deferred_sequence)) {
                list.push(deferred_sequence);
            }
        });

        if event_type == EventType::Autorun {
            runtime.call(EventHandler::new(sequence), None);
        }
    }

    /// Drop the registration under `key` and stop its handlers
    pub fn unregister(&self, key: &str) {
        let removed = self.0.by_key.borrow_mut().remove(key);
        if let Some(registration) = removed {
            log::debug!(
                target: TARGET_REGISTRY,
                "Unregister {} under {}",
                registration.sequence.path(),
                key
            );
            self.remove_from_type(&registration.sequence);
            self.stop_events(&registration.sequence);
        }
    }

    /// Drop every keyed registration
    pub fn unregister_all(&self) {
        let keys: Vec<String> = self.0.by_key.borrow().keys().cloned().collect();
        for key in keys {
            self.unregister(&key);
        }
    }

    /// Finish every live handler started from `sequence`, including ones
    /// not yet flushed into the active list
    pub fn stop_events(&self, sequence: &SequenceRef) {
        let mut handlers = self.0.active.snapshot();
        handlers.extend(self.0.pending.snapshot());
        for handler in handlers {
            if Rc::ptr_eq(handler.initial(), sequence) && !handler.is_complete() {
                handler.finish();
            }
        }
    }

    /// Run the sequence loaded under `id`. Unknown ids produce nothing.
    pub fn call(&self, runtime: &Runtime, id: &str) -> Option<EventHandler> {
        let sequence = self.get(id)?;
        Some(runtime.call(EventHandler::new(sequence), None))
    }

    /// Run every enabled sequence of `event_type` that passes the priority
    /// filter, in list order, then notify plugin scripts.
    ///
    /// Iterates a snapshot of the type list: registrations and removals made
    /// by the visited handlers do not change which sequences this pass visits.
    /// Input dispatches stop at the first handler that stops propagation.
    pub fn dispatch(&self, runtime: &Runtime, event_type: &EventType, options: DispatchOptions) {
        let input = event_type.is_input();
        if input {
            runtime.bubbles().push();
        }
        let stopped = self.dispatch_sequences(runtime, event_type, &options, input);
        if !stopped && options.priority != Some(false) {
            runtime
                .scripts()
                .emit(runtime, event_type, options.argument.as_ref());
        }
        if input {
            runtime.bubbles().pop();
        }
    }

    // Returns whether propagation was stopped.
    fn dispatch_sequences(
        &self,
        runtime: &Runtime,
        event_type: &EventType,
        options: &DispatchOptions,
        input: bool,
    ) -> bool {
        for sequence in self.events(event_type) {
            if !sequence.is_enabled() {
                continue;
            }
            if options
                .priority
                .is_some_and(|priority| priority != sequence.is_priority())
            {
                continue;
            }
            let handler = match &options.inherit {
                Some(parent) => EventHandler::inheriting(sequence.clone(), parent),
                None => EventHandler::new(sequence.clone()),
            };
            if let Some(bindings) = &options.bindings {
                handler.apply_bindings(bindings);
            }
            handler.set_priority(sequence.is_priority());
            log::trace!(target: TARGET_REGISTRY, "Dispatch {} to {}", event_type, sequence.path());
            runtime.call(handler, None);
            if input && !runtime.bubbles().bubbles() {
                log::trace!(target: TARGET_REGISTRY, "Propagation of {} stopped", event_type);
                return true;
            }
        }
        false
    }

    /// Enable the sequence loaded under `id` at the next flush, unless the
    /// registry is reset or the sequence disabled before then
    pub fn enable(&self, runtime: &Runtime, id: &str) {
        let Some(sequence) = self.get(id) else {
            return;
        };
        let version = self.version();
        sequence.set_pending_enable(Some(version));
        let registry = self.clone();
        runtime.queue().push(move || {
            if sequence.pending_enable() == Some(version) {
                if registry.version() == version {
                    sequence.set_enabled(true);
                }
                sequence.set_pending_enable(None);
            }
        });
    }

    /// Disable the sequence loaded under `id` immediately
    pub fn disable(&self, id: &str) {
        if let Some(sequence) = self.get(id) {
            sequence.set_enabled(false);
            sequence.set_pending_enable(None);
        }
    }

    /// At the next flush, move the sequence to the front of its type list
    /// and flag it high priority
    pub fn set_highest_priority(&self, runtime: &Runtime, id: &str) {
        let Some(sequence) = self.get(id) else {
            return;
        };
        let registry = self.clone();
        runtime.queue().push(move || {
            sequence.set_priority(true);
            let mut by_type = registry.0.by_type.borrow_mut();
            if let Some(list) = by_type.get_mut(sequence.event_type())
                && let Some(pos) = list.iter().position(|s| Rc::ptr_eq(s, &sequence))
            {
                let moved = list.remove(pos);
                list.insert(0, moved);
            }
        });
    }

    /// Drop keyed registrations, restore authored enabled flags and
    /// invalidate pending enables
    pub fn reset(&self) {
        self.unregister_all();
        for sequence in self.0.by_id.borrow().values() {
            sequence.restore_default();
        }
        self.0.version.set(self.version() + 1);
        log::debug!(target: TARGET_REGISTRY, "Reset to version {}", self.version());
    }

    /// Update active handlers and report long-running ones
    pub fn update(&self, runtime: &Runtime, delta: f64) {
        self.0.active.update(runtime, delta);

        let Some(threshold) = runtime.config().stuck_handler_warning_ms else {
            return;
        };
        for handler in self.0.active.snapshot() {
            if handler.is_complete() {
                continue;
            }
            if handler.add_age(delta) >= threshold && handler.mark_reported() {
                log::warn!(
                    target: TARGET_REGISTRY,
                    "Event {} has been running for over {} ms",
                    handler.path(),
                    threshold
                );
            }
        }
    }

    fn remove_from_type(&self, sequence: &SequenceRef) {
        if let Some(list) = self.0.by_type.borrow_mut().get_mut(sequence.event_type())
            && let Some(pos) = list.iter().position(|s| Rc::ptr_eq(s, sequence))
        {
            list.remove(pos);
        }
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("version", &self.version())
            .field("ids", &self.0.by_id.borrow().len())
            .field("keys", &self.0.by_key.borrow().len())
            .field("active", &self.0.active.len())
            .field("pending", &self.0.pending.len())
            .finish()
    }
}
