//! Runtime execution engine for event sequences
//!
//! [`Runtime`] owns everything a frame touches: the clock, the timer
//! collections, the global registry, plugin scripts and the deferred queue.
//! Handlers are stepped through [`Runtime::call`] and [`Runtime::run`], which
//! keep track of the handler currently executing.

use crate::config::EngineConfig;
use crate::scripts::ScriptManager;
use crate::types::{EventType, SequenceRef};
use std::cell::{Cell, Ref, RefCell};
use std::fmt;

pub mod bubble;
pub mod clock;
pub mod debug;
pub mod deferred;
pub mod handler;
pub mod registry;
pub mod timer;


pub use bubble::BubbleStack;
pub use clock::Clock;
pub use deferred::DeferredQueue;
pub use handler::{CallFrame, EventHandler, HandlerList, HandlerState, StepContext};
pub use registry::{DispatchOptions, EventRegistry};
pub use timer::{Timer, TimerManager, TimerMode};

use debug::TARGET_RUNTIME;

/// Single-threaded engine instance
pub struct Runtime {
    config: EngineConfig,
    queue: DeferredQueue,
    timers: TimerManager,
    clock: RefCell<Clock>,
    registry: EventRegistry,
    scripts: ScriptManager,
    bubbles: BubbleStack,
    paused: Cell<bool>,
    contexts: RefCell<Vec<EventHandler>>,
    frame: Cell<u64>,
}

impl Runtime {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            queue: DeferredQueue::new(),
            timers: TimerManager::new(config.timer_pool_capacity),
            clock: RefCell::new(Clock::new(config.max_delta_time)),
            registry: EventRegistry::new(),
            scripts: ScriptManager::new("plugins"),
            bubbles: BubbleStack::new(),
            paused: Cell::new(false),
            contexts: RefCell::new(Vec::new()),
            frame: Cell::new(0),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn queue(&self) -> &DeferredQueue {
        &self.queue
    }

    pub fn timers(&self) -> &TimerManager {
        &self.timers
    }

    pub fn clock(&self) -> Ref<'_, Clock> {
        self.clock.borrow()
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    /// Plugin-level script behaviors
    pub fn scripts(&self) -> &ScriptManager {
        &self.scripts
    }

    pub fn bubbles(&self) -> &BubbleStack {
        &self.bubbles
    }

    /// While paused only high-priority handlers and raw timers advance
    pub fn is_paused(&self) -> bool {
        self.paused.get()
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.set(paused);
    }

    /// Frames completed by [`update`](Self::update)
    pub fn frame(&self) -> u64 {
        self.frame.get()
    }

    /// Handler whose steps are executing right now
    pub fn current(&self) -> Option<EventHandler> {
        self.contexts.borrow().last().cloned()
    }

    /// Step a handler with this runtime as context. Returns whether it is
    /// complete.
    ///
    /// The handler is the [`current`](Self::current) one for the duration;
    /// the previous one is restored afterwards.
    pub fn run(&self, handler: &EventHandler, delta: f64) -> bool {
        self.contexts.borrow_mut().push(handler.clone());
        let complete = handler.update(self, delta);
        self.contexts.borrow_mut().pop();
        complete
    }

    /// Start a handler: step it once with zero delta, and if it did not
    /// finish, track it in `tracking` (default: the registry's active list)
    /// from the next flush until it finishes.
    pub fn call(&self, handler: EventHandler, tracking: Option<&HandlerList>) -> EventHandler {
        if self.run(&handler, 0.0) {
            return handler;
        }
        let list = tracking
            .cloned()
            .unwrap_or_else(|| self.registry.active().clone());

        let pending = self.registry.pending().clone();
        pending.append(handler.clone());
        let appended = handler.clone();
        let target = list.clone();
        self.queue.push(move || {
            pending.remove(&appended);
            if !appended.is_complete() {
                target.append(appended);
            }
        });

        let queue = self.queue.clone();
        let weak = list.downgrade();
        handler.on_finish(move |finished| {
            let finished = finished.clone();
            queue.push(move || {
                if let Some(list) = weak.upgrade() {
                    list.remove(&finished);
                }
            });
        });
        handler
    }

    /// Run a one-off sequence as a new handler
    pub fn call_sequence(&self, sequence: SequenceRef) -> EventHandler {
        self.call(EventHandler::new(sequence), None)
    }

    /// Dispatch an occurrence through the registry
    pub fn dispatch(&self, event_type: impl Into<EventType>, options: DispatchOptions) {
        self.registry.dispatch(self, &event_type.into(), options);
    }

    pub fn emit(&self, event_type: impl Into<EventType>) {
        self.dispatch(event_type, DispatchOptions::default());
    }

    /// Run the global event loaded under `id`; unknown ids do nothing
    pub fn call_event(&self, id: &str) -> Option<EventHandler> {
        self.registry.call(self, id)
    }

    pub fn register(&self, key: &str, event_type: impl Into<EventType>, sequence: SequenceRef) {
        self.registry.register(self, key, event_type.into(), sequence);
    }

    pub fn unregister(&self, key: &str) {
        self.registry.unregister(key);
    }

    pub fn enable(&self, id: &str) {
        self.registry.enable(self, id);
    }

    pub fn disable(&self, id: &str) {
        self.registry.disable(id);
    }

    pub fn set_highest_priority(&self, id: &str) {
        self.registry.set_highest_priority(self, id);
    }

    /// Reset registry state between sessions
    pub fn reset(&self) {
        self.registry.reset();
    }

    /// Change the time scale, optionally over `duration` ms
    pub fn set_time_scale(&self, time_scale: f64, duration: f64) {
        let due = self.clock.borrow_mut().set_time_scale(time_scale, duration);
        for callback in due {
            callback();
        }
    }

    pub fn on_time_scale_end(&self, callback: impl FnOnce() + 'static) {
        self.clock.borrow_mut().on_transition_end(callback);
    }

    /// Advance one frame of `frame_delta` real milliseconds.
    ///
    /// Order: clock, timers, plugin scripts, active handlers, deferred flush.
    pub fn update(&self, frame_delta: f64) {
        let due = self.clock.borrow_mut().advance(frame_delta);
        for callback in due {
            callback();
        }
        let (delta, raw_delta) = {
            let clock = self.clock.borrow();
            (clock.delta(), clock.raw_delta())
        };

        self.timers.update(delta, raw_delta, self.is_paused());
        if !self.is_paused() {
            self.scripts.update(self, delta);
        }
        self.registry.update(self, delta);
        let flushed = self.queue.flush();

        let frame = self.frame.get() + 1;
        self.frame.set(frame);
        log::trace!(
            target: TARGET_RUNTIME,
            "Frame {} done: delta {:.2} ms, {} deferred, {} active",
            frame,
            delta,
            flushed,
            self.registry.active().len()
        );
    }

    /// Drop all runtime state: registrations, active handlers, timers and
    /// queued mutations
    pub fn shutdown(&self) {
        self.registry.reset();
        let mut handlers = self.registry.active().snapshot();
        handlers.extend(self.registry.pending().snapshot());
        for handler in handlers {
            handler.finish();
        }
        self.registry.active().clear();
        self.registry.pending().clear();
        self.timers.clear();
        self.queue.reset();
        self.clock.borrow_mut().reset();
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("frame", &self.frame.get())
            .field("paused", &self.paused.get())
            .field("clock", &*self.clock.borrow())
            .field("registry", &self.registry)
            .field("timers", &self.timers)
            .field("queue", &self.queue)
            .finish()
    }
}
