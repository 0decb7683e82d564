//! Event handler: one in-flight execution of a sequence
//!
//! A handler owns a program counter into its current sequence, a call stack
//! of suspended caller frames, and the ambient context its steps read. Each
//! `update` runs steps in a tight loop until one of them yields (returns
//! `false`), suspends the handler, or the sequence is exhausted.

use crate::runtime::Runtime;
use crate::runtime::debug::TARGET_HANDLER;
use crate::types::{AmbientBindings, Attributes, EventType, SequenceRef, Step};
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Observable execution state of a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Running,
    /// Waiting for a duration to elapse
    SuspendedTimed,
    /// Paused until [`EventHandler::resume`] is called
    SuspendedIndefinite,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Suspension {
    None,
    Timed { remaining: f64 },
    Indefinite,
}

/// A (sequence, resume index) pair
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub sequence: SequenceRef,
    pub index: usize,
}

type FinishCallback = Box<dyn FnOnce(&EventHandler)>;

struct HandlerInner {
    initial: SequenceRef,
    cursor: RefCell<CallFrame>,
    stack: RefCell<Vec<CallFrame>>,
    complete: Cell<bool>,
    priority: Cell<bool>,
    suspension: Cell<Suspension>,
    attributes: Attributes,
    bindings: RefCell<AmbientBindings>,
    callbacks: RefCell<Vec<FinishCallback>>,
    age: Cell<f64>,
    reported: Cell<bool>,
}

/// Shared handle to a running event; identity is pointer identity
#[derive(Clone)]
pub struct EventHandler(Rc<HandlerInner>);

impl EventHandler {
    /// Fresh handler with an empty attribute bag
    pub fn new(sequence: SequenceRef) -> Self {
        Self::with_context(sequence, Attributes::new(), AmbientBindings::default(), false)
    }

    /// Handler continuing `parent`'s context.
    ///
    /// The attribute bag is shared with the parent, the ambient bindings and
    /// the priority flag are copied.
    pub fn inheriting(sequence: SequenceRef, parent: &EventHandler) -> Self {
        let bindings = parent.bindings().clone();
        Self::with_context(
            sequence,
            parent.attributes().clone(),
            bindings,
            parent.priority(),
        )
    }

    fn with_context(
        sequence: SequenceRef,
        attributes: Attributes,
        bindings: AmbientBindings,
        priority: bool,
    ) -> Self {
        Self(Rc::new(HandlerInner {
            initial: sequence.clone(),
            cursor: RefCell::new(CallFrame { sequence, index: 0 }),
            stack: RefCell::new(Vec::new()),
            complete: Cell::new(false),
            priority: Cell::new(priority),
            suspension: Cell::new(Suspension::None),
            attributes,
            bindings: RefCell::new(bindings),
            callbacks: RefCell::new(Vec::new()),
            age: Cell::new(0.0),
            reported: Cell::new(false),
        }))
    }

    /// Sequence this handler was created for; never changes
    pub fn initial(&self) -> &SequenceRef {
        &self.0.initial
    }

    pub fn event_type(&self) -> &EventType {
        self.0.initial.event_type()
    }

    pub fn path(&self) -> &str {
        self.0.initial.path()
    }

    /// Sequence currently being stepped
    pub fn sequence(&self) -> SequenceRef {
        self.0.cursor.borrow().sequence.clone()
    }

    /// Index of the next step to run
    pub fn index(&self) -> usize {
        self.0.cursor.borrow().index
    }

    /// Move the program counter within the current sequence
    pub fn set_index(&self, index: usize) {
        self.0.cursor.borrow_mut().index = index;
    }

    pub fn call_depth(&self) -> usize {
        self.0.stack.borrow().len()
    }

    /// Begin stepping `sequence`, resuming the current one when it is exhausted
    pub fn push_call(&self, sequence: SequenceRef) {
        let caller = self.0.cursor.replace(CallFrame { sequence, index: 0 });
        self.0.stack.borrow_mut().push(caller);
    }

    pub fn is_complete(&self) -> bool {
        self.0.complete.get()
    }

    pub fn state(&self) -> HandlerState {
        if self.is_complete() {
            return HandlerState::Complete;
        }
        match self.0.suspension.get() {
            Suspension::None => HandlerState::Running,
            Suspension::Timed { .. } => HandlerState::SuspendedTimed,
            Suspension::Indefinite => HandlerState::SuspendedIndefinite,
        }
    }

    /// Remaining wait time, if the handler is waiting on a duration
    pub fn remaining_wait(&self) -> Option<f64> {
        match self.0.suspension.get() {
            Suspension::Timed { remaining } => Some(remaining),
            _ => None,
        }
    }

    /// High-priority handlers keep updating while the game is paused
    pub fn priority(&self) -> bool {
        self.0.priority.get()
    }

    pub fn set_priority(&self, priority: bool) {
        self.0.priority.set(priority);
    }

    pub fn attributes(&self) -> &Attributes {
        &self.0.attributes
    }

    pub fn bindings(&self) -> Ref<'_, AmbientBindings> {
        self.0.bindings.borrow()
    }

    /// Overlay the bindings that are set in `bindings`
    pub fn apply_bindings(&self, bindings: &AmbientBindings) {
        self.0.bindings.borrow_mut().apply(bindings);
    }

    /// Suspend for `duration` ms of scaled time. Returns `false` so a step
    /// can `return handler.wait(..)`.
    pub fn wait(&self, duration: f64) -> bool {
        self.0.suspension.set(Suspension::Timed {
            remaining: duration,
        });
        false
    }

    /// Suspend until [`resume`](Self::resume). Returns `false`.
    pub fn pause(&self) -> bool {
        self.0.suspension.set(Suspension::Indefinite);
        false
    }

    /// Leave any suspension; stepping continues on the next update
    pub fn resume(&self) {
        self.0.suspension.set(Suspension::None);
    }

    /// Mark complete and fire the finish callbacks in registration order
    pub fn finish(&self) {
        self.0.complete.set(true);
        self.0.suspension.set(Suspension::None);
        let callbacks = std::mem::take(&mut *self.0.callbacks.borrow_mut());
        for callback in callbacks {
            callback(self);
        }
    }

    /// Run `callback` when the handler finishes, or now if it already has
    pub fn on_finish(&self, callback: impl FnOnce(&EventHandler) + 'static) {
        if self.is_complete() {
            callback(self);
        } else {
            self.0.callbacks.borrow_mut().push(Box::new(callback));
        }
    }

    pub fn ptr_eq(&self, other: &EventHandler) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Advance by `delta` ms. Returns whether the handler is complete.
    ///
    /// Prefer [`Runtime::run`], which also records the handler as the
    /// current execution context.
    pub fn update(&self, runtime: &Runtime, delta: f64) -> bool {
        if self.is_complete() {
            return true;
        }
        match self.0.suspension.get() {
            Suspension::None => {}
            Suspension::Indefinite => return false,
            Suspension::Timed { remaining } => {
                let remaining = remaining - delta;
                if remaining > 0.0 {
                    self.0.suspension.set(Suspension::Timed { remaining });
                    return false;
                }
                self.0.suspension.set(Suspension::None);
            }
        }
        self.run_steps(runtime)
    }

    fn run_steps(&self, runtime: &Runtime) -> bool {
        let context = StepContext {
            runtime,
            handler: self,
        };
        let limit = runtime.config().max_steps_per_update;
        let mut executed = 0usize;

        while !self.is_complete() {
            let Some(step) = self.next_step() else {
                self.finish();
                break;
            };
            if let Some(limit) = limit {
                executed += 1;
                if executed > limit {
                    log::error!(
                        target: TARGET_HANDLER,
                        "Step limit of {} exceeded in {} at index {}; handler stopped",
                        limit,
                        self.path(),
                        self.index()
                    );
                    self.finish();
                    break;
                }
            }
            if !step(&context) || self.0.suspension.get() != Suspension::None {
                if self.0.suspension.get() == Suspension::None && self.is_exhausted() {
                    self.finish();
                }
                break;
            }
        }
        self.is_complete()
    }

    // Fetch the step at the cursor, popping caller frames past exhausted callees.
    fn next_step(&self) -> Option<Step> {
        loop {
            let mut cursor = self.0.cursor.borrow_mut();
            if let Some(step) = cursor.sequence.step(cursor.index).cloned() {
                cursor.index += 1;
                return Some(step);
            }
            let caller = self.0.stack.borrow_mut().pop()?;
            log::trace!(
                target: TARGET_HANDLER,
                "Returning from {} to {} at index {}",
                cursor.sequence.path(),
                caller.sequence.path(),
                caller.index
            );
            *cursor = caller;
        }
    }

    fn is_exhausted(&self) -> bool {
        let cursor = self.0.cursor.borrow();
        cursor.index >= cursor.sequence.len() && self.0.stack.borrow().is_empty()
    }

    /// Accumulate time spent in an active list; returns the new age
    pub(crate) fn add_age(&self, delta: f64) -> f64 {
        let age = self.0.age.get() + delta;
        self.0.age.set(age);
        age
    }

    /// Returns `true` the first time it is called
    pub(crate) fn mark_reported(&self) -> bool {
        !self.0.reported.replace(true)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("path", &self.path())
            .field("index", &self.index())
            .field("state", &self.state())
            .field("call_depth", &self.call_depth())
            .field("priority", &self.priority())
            .finish()
    }
}

/// Context handed to every step invocation
pub struct StepContext<'a> {
    runtime: &'a Runtime,
    handler: &'a EventHandler,
}

impl<'a> StepContext<'a> {
    pub fn runtime(&self) -> &'a Runtime {
        self.runtime
    }

    pub fn handler(&self) -> &'a EventHandler {
        self.handler
    }

    pub fn attributes(&self) -> &'a Attributes {
        self.handler.attributes()
    }

    /// Index of the next step
    pub fn index(&self) -> usize {
        self.handler.index()
    }

    /// Continue at `index` of the current sequence. Returns `true`.
    pub fn jump(&self, index: usize) -> bool {
        self.handler.set_index(index);
        true
    }

    pub fn wait(&self, duration: f64) -> bool {
        self.handler.wait(duration)
    }

    pub fn pause(&self) -> bool {
        self.handler.pause()
    }

    /// Step into `sequence` as a sub-event. Returns `true`.
    pub fn call(&self, sequence: SequenceRef) -> bool {
        self.handler.push_call(sequence);
        true
    }

    /// End this handler, skipping the remaining steps. Returns `false`.
    pub fn finish(&self) -> bool {
        self.handler.finish();
        false
    }

    /// Stop the input dispatch that started this handler
    pub fn stop_propagation(&self) {
        self.runtime.bubbles().stop();
    }
}

/// List of handlers updated every frame
///
/// Cloning shares the list. The registry's active list is one; callers may
/// supply their own to [`Runtime::call`].
#[derive(Clone, Default)]
pub struct HandlerList(Rc<RefCell<Vec<EventHandler>>>);

/// Non-owning handle to a [`HandlerList`]
#[derive(Clone)]
pub struct WeakHandlerList(Weak<RefCell<Vec<EventHandler>>>);

impl WeakHandlerList {
    pub fn upgrade(&self) -> Option<HandlerList> {
        self.0.upgrade().map(HandlerList)
    }
}

impl HandlerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, handler: EventHandler) {
        self.0.borrow_mut().push(handler);
    }

    pub fn remove(&self, handler: &EventHandler) {
        let mut handlers = self.0.borrow_mut();
        if let Some(pos) = handlers.iter().position(|h| h.ptr_eq(handler)) {
            handlers.remove(pos);
        }
    }

    pub fn contains(&self, handler: &EventHandler) -> bool {
        self.0.borrow().iter().any(|h| h.ptr_eq(handler))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Owned copy of the handles, safe to iterate while the list changes
    pub fn snapshot(&self) -> Vec<EventHandler> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn downgrade(&self) -> WeakHandlerList {
        WeakHandlerList(Rc::downgrade(&self.0))
    }

    /// Update every handler; only high-priority ones while paused
    pub fn update(&self, runtime: &Runtime, delta: f64) {
        let paused = runtime.is_paused();
        for handler in self.snapshot() {
            if !paused || handler.priority() {
                runtime.run(&handler, delta);
            }
        }
    }
}

impl fmt::Debug for HandlerList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.borrow().iter()).finish()
    }
}
