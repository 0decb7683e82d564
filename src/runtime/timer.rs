//! General-purpose timers
//!
//! Timers drive engine-level transitions (camera pans, audio fades) that are
//! not tied to an event handler. Two ordered collections exist: `scaled`
//! timers follow the game time scale and stop while the game is paused,
//! `raw` timers always advance in real time.

use crate::runtime::debug::TARGET_TIMER;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Which clock a timer follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    #[default]
    Scaled,
    Raw,
}

type TimerFn = Box<dyn FnMut(&Timer)>;

struct TimerState {
    elapsed: Cell<f64>,
    duration: Cell<f64>,
    mode: Cell<TimerMode>,
    active: Cell<bool>,
    pooled: Cell<bool>,
    update: RefCell<Option<TimerFn>>,
    callback: RefCell<Option<TimerFn>>,
}

/// Shared handle to a timer; identity is pointer identity
#[derive(Clone)]
pub struct Timer(Rc<TimerState>);

impl Timer {
    pub fn new(duration: f64, mode: TimerMode) -> Self {
        Self(Rc::new(TimerState {
            elapsed: Cell::new(0.0),
            duration: Cell::new(duration),
            mode: Cell::new(mode),
            active: Cell::new(false),
            pooled: Cell::new(false),
            update: RefCell::new(None),
            callback: RefCell::new(None),
        }))
    }

    /// Per-tick callback, called after `elapsed` advances
    pub fn on_update(self, f: impl FnMut(&Timer) + 'static) -> Self {
        *self.0.update.borrow_mut() = Some(Box::new(f));
        self
    }

    /// Completion callback, called once `elapsed` reaches `duration`
    pub fn on_complete(self, f: impl FnMut(&Timer) + 'static) -> Self {
        *self.0.callback.borrow_mut() = Some(Box::new(f));
        self
    }

    pub fn elapsed(&self) -> f64 {
        self.0.elapsed.get()
    }

    pub fn duration(&self) -> f64 {
        self.0.duration.get()
    }

    pub fn set_duration(&self, duration: f64) {
        self.0.duration.set(duration);
    }

    pub fn mode(&self) -> TimerMode {
        self.0.mode.get()
    }

    pub fn set_mode(&self, mode: TimerMode) {
        self.0.mode.set(mode);
    }

    /// Fraction of the duration already elapsed, in `0.0..=1.0`
    pub fn progress(&self) -> f64 {
        let duration = self.duration();
        if duration <= 0.0 {
            1.0
        } else {
            (self.elapsed() / duration).min(1.0)
        }
    }

    /// Whether the timer is currently in a manager's active collection
    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed() >= self.duration()
    }

    pub fn ptr_eq(&self, other: &Timer) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Whether the timer came from a manager's pool and goes back on completion
    pub fn is_pooled(&self) -> bool {
        self.0.pooled.get()
    }

    /// Advance by `delta` ms, fire callbacks, remove itself when done.
    /// Pooled timers are recycled once removed.
    pub fn tick(&self, delta: f64, manager: &TimerManager) {
        let elapsed = (self.elapsed() + delta).min(self.duration());
        self.0.elapsed.set(elapsed);
        Self::invoke(&self.0.update, self);
        if self.is_finished() {
            Self::invoke(&self.0.callback, self);
            manager.remove(self);
            if self.is_pooled() && !self.is_active() {
                manager.recycle(self.clone());
            }
        }
    }

    // The callback is taken out while it runs so it may replace itself.
    fn invoke(slot: &RefCell<Option<TimerFn>>, timer: &Timer) {
        let taken = slot.borrow_mut().take();
        if let Some(mut f) = taken {
            f(timer);
            let mut current = slot.borrow_mut();
            if current.is_none() {
                *current = Some(f);
            }
        }
    }

    fn clear(&self) {
        self.0.elapsed.set(0.0);
        self.0.update.borrow_mut().take();
        self.0.callback.borrow_mut().take();
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("elapsed", &self.elapsed())
            .field("duration", &self.duration())
            .field("mode", &self.mode())
            .finish()
    }
}

struct TimerLists {
    scaled: RefCell<Vec<Timer>>,
    raw: RefCell<Vec<Timer>>,
    pool: RefCell<Vec<Timer>>,
    pool_capacity: usize,
}

/// Active timer collections plus a bounded free-list of spare timers
#[derive(Clone)]
pub struct TimerManager(Rc<TimerLists>);

impl TimerManager {
    pub fn new(pool_capacity: usize) -> Self {
        Self(Rc::new(TimerLists {
            scaled: RefCell::new(Vec::new()),
            raw: RefCell::new(Vec::new()),
            pool: RefCell::new(Vec::new()),
            pool_capacity,
        }))
    }

    fn list(&self, mode: TimerMode) -> &RefCell<Vec<Timer>> {
        match mode {
            TimerMode::Scaled => &self.0.scaled,
            TimerMode::Raw => &self.0.raw,
        }
    }

    /// Start ticking a timer
    pub fn add(&self, timer: Timer) -> Timer {
        timer.0.active.set(true);
        self.list(timer.mode()).borrow_mut().push(timer.clone());
        timer
    }

    /// Stop ticking a timer; no-op if it is not active
    pub fn remove(&self, timer: &Timer) {
        let mut list = self.list(timer.mode()).borrow_mut();
        if let Some(pos) = list.iter().position(|t| t.ptr_eq(timer)) {
            list.remove(pos);
            timer.0.active.set(false);
        }
    }

    pub fn contains(&self, timer: &Timer) -> bool {
        self.list(timer.mode())
            .borrow()
            .iter()
            .any(|t| t.ptr_eq(timer))
    }

    /// Tick every active timer. Scaled timers are skipped while paused.
    pub fn update(&self, scaled_delta: f64, raw_delta: f64, paused: bool) {
        if !paused {
            self.tick_all(TimerMode::Scaled, scaled_delta);
        }
        self.tick_all(TimerMode::Raw, raw_delta);
    }

    // Newest first over a snapshot; timers removed mid-pass are skipped.
    fn tick_all(&self, mode: TimerMode, delta: f64) {
        let snapshot = self.list(mode).borrow().clone();
        for timer in snapshot.iter().rev() {
            if timer.is_active() {
                timer.tick(delta, self);
            }
        }
    }

    /// Take a spare timer from the pool, or allocate one.
    ///
    /// The timer returns to the pool when it completes, so its handle must
    /// not be used after the completion callback.
    pub fn fetch(&self) -> Timer {
        let timer = self
            .0
            .pool
            .borrow_mut()
            .pop()
            .unwrap_or_else(|| Timer::new(0.0, TimerMode::Scaled));
        timer.0.pooled.set(true);
        timer
    }

    /// Start a pooled timer of `duration` ms that runs `f` on completion
    pub fn start(&self, duration: f64, mode: TimerMode, f: impl FnMut(&Timer) + 'static) -> Timer {
        let timer = self.fetch();
        timer.set_duration(duration);
        timer.set_mode(mode);
        self.add(timer.on_complete(f))
    }

    /// Return a finished timer to the pool. Beyond capacity it is dropped.
    pub fn recycle(&self, timer: Timer) {
        let mut pool = self.0.pool.borrow_mut();
        if pool.len() < self.0.pool_capacity {
            timer.clear();
            pool.push(timer);
        } else {
            log::trace!(target: TARGET_TIMER, "Timer pool full ({}); timer dropped", pool.len());
        }
    }

    pub fn pooled(&self) -> usize {
        self.0.pool.borrow().len()
    }

    pub fn active(&self, mode: TimerMode) -> usize {
        self.list(mode).borrow().len()
    }

    /// Drop every active timer; pooled ones go back to the pool
    pub fn clear(&self) {
        log::debug!(
            target: TARGET_TIMER,
            "Clearing {} scaled and {} raw timers",
            self.active(TimerMode::Scaled),
            self.active(TimerMode::Raw)
        );
        let mut dropped = Vec::new();
        for list in [&self.0.scaled, &self.0.raw] {
            dropped.extend(list.borrow_mut().drain(..));
        }
        for timer in dropped {
            timer.0.active.set(false);
            if timer.is_pooled() {
                self.recycle(timer);
            }
        }
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl fmt::Debug for TimerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerManager")
            .field("scaled", &self.active(TimerMode::Scaled))
            .field("raw", &self.active(TimerMode::Raw))
            .field("pooled", &self.pooled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_completes_and_removes_itself() {
        let manager = TimerManager::default();
        let done = Rc::new(Cell::new(0));
        let seen = done.clone();
        let timer = manager.add(
            Timer::new(100.0, TimerMode::Scaled).on_complete(move |_| seen.set(seen.get() + 1)),
        );

        manager.update(60.0, 60.0, false);
        assert_eq!(done.get(), 0);
        assert_eq!(timer.elapsed(), 60.0);

        manager.update(60.0, 60.0, false);
        assert_eq!(done.get(), 1);
        assert_eq!(timer.elapsed(), 100.0);
        assert!(!manager.contains(&timer));
    }

    #[test]
    fn update_callback_sees_progress() {
        let manager = TimerManager::default();
        let progress = Rc::new(RefCell::new(Vec::new()));
        let sink = progress.clone();
        manager.add(
            Timer::new(40.0, TimerMode::Raw).on_update(move |t| sink.borrow_mut().push(t.progress())),
        );

        manager.update(0.0, 10.0, false);
        manager.update(0.0, 30.0, false);

        assert_eq!(*progress.borrow(), vec![0.25, 1.0]);
        assert_eq!(manager.active(TimerMode::Raw), 0);
    }

    #[test]
    fn paused_game_freezes_only_scaled_timers() {
        let manager = TimerManager::default();
        let scaled = manager.add(Timer::new(100.0, TimerMode::Scaled));
        let raw = manager.add(Timer::new(100.0, TimerMode::Raw));

        manager.update(16.0, 16.0, true);

        assert_eq!(scaled.elapsed(), 0.0);
        assert_eq!(raw.elapsed(), 16.0);
    }

    #[test]
    fn timer_removing_another_during_iteration_is_safe() {
        let manager = TimerManager::default();
        let victim = manager.add(Timer::new(1000.0, TimerMode::Scaled));
        let handle = manager.clone();
        let target = victim.clone();
        manager.add(
            Timer::new(10.0, TimerMode::Scaled).on_complete(move |_| handle.remove(&target)),
        );
        let survivor = manager.add(Timer::new(1000.0, TimerMode::Scaled));

        manager.update(10.0, 10.0, false);

        assert!(!manager.contains(&victim));
        assert!(manager.contains(&survivor));
        assert_eq!(survivor.elapsed(), 10.0);
        assert_eq!(manager.active(TimerMode::Scaled), 1);
    }

    #[test]
    fn pooled_timers_return_to_the_pool_on_completion() {
        let manager = TimerManager::default();
        let fired = Rc::new(Cell::new(0));
        let seen = fired.clone();
        let timer = manager.start(30.0, TimerMode::Raw, move |_| seen.set(seen.get() + 1));
        assert_eq!(manager.active(TimerMode::Raw), 1);

        manager.update(0.0, 20.0, true);
        assert_eq!(manager.pooled(), 0);
        manager.update(0.0, 20.0, true);

        assert_eq!(fired.get(), 1);
        assert_eq!(manager.active(TimerMode::Raw), 0);
        assert_eq!(manager.pooled(), 1);
        let reused = manager.start(10.0, TimerMode::Scaled, |_| {});
        assert!(reused.ptr_eq(&timer));
        assert_eq!(reused.elapsed(), 0.0);
        assert_eq!(manager.active(TimerMode::Scaled), 1);
        assert_eq!(manager.pooled(), 0);
    }

    #[test]
    fn unpooled_timers_are_not_recycled() {
        let manager = TimerManager::default();
        manager.add(Timer::new(5.0, TimerMode::Scaled));

        manager.update(5.0, 5.0, false);

        assert_eq!(manager.active(TimerMode::Scaled), 0);
        assert_eq!(manager.pooled(), 0);
    }

    #[test]
    fn pool_is_bounded_and_recycled_timers_are_reset() {
        let manager = TimerManager::new(1);
        let first = Timer::new(5.0, TimerMode::Scaled).on_complete(|_| {});
        first.tick(5.0, &manager);
        manager.recycle(first.clone());
        manager.recycle(Timer::new(5.0, TimerMode::Raw));

        assert_eq!(manager.pooled(), 1);
        let reused = manager.fetch();
        assert!(reused.ptr_eq(&first));
        assert_eq!(reused.elapsed(), 0.0);
        assert_eq!(manager.pooled(), 0);
    }
}
