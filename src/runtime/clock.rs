//! Frame time bookkeeping and the global time scale

use std::fmt;

type TransitionCallback = Box<dyn FnOnce()>;

#[derive(Debug, Clone, Copy)]
struct ScaleTransition {
    start: f64,
    end: f64,
    elapsed: f64,
    duration: f64,
}

/// Per-frame delta times, in milliseconds.
///
/// `delta` is scaled by the time scale and drives scaled timers and event
/// handlers; `raw_delta` is the clamped real frame time.
pub struct Clock {
    time_scale: f64,
    max_delta: f64,
    delta: f64,
    raw_delta: f64,
    elapsed: f64,
    play_time: f64,
    frame_count: u32,
    frame_time: f64,
    fps: u32,
    transition: Option<ScaleTransition>,
    callbacks: Vec<TransitionCallback>,
}

impl Clock {
    pub fn new(max_delta: f64) -> Self {
        Self {
            time_scale: 1.0,
            max_delta,
            delta: 0.0,
            raw_delta: 0.0,
            elapsed: 0.0,
            play_time: 0.0,
            frame_count: 0,
            frame_time: 0.0,
            fps: 0,
            transition: None,
            callbacks: Vec::new(),
        }
    }

    /// Advance one frame of `frame_delta` real milliseconds.
    ///
    /// Returns the transition-end callbacks that became due; the caller runs
    /// them once it no longer holds the clock.
    pub fn advance(&mut self, frame_delta: f64) -> Vec<TransitionCallback> {
        self.frame_count += 1;
        self.frame_time += frame_delta;
        if self.frame_time > 995.0 {
            self.fps = (self.frame_count as f64 / (self.frame_time / 1000.0)).round() as u32;
            self.frame_count = 0;
            self.frame_time = 0.0;
        }

        let delta = frame_delta.clamp(0.0, self.max_delta);
        let mut due = Vec::new();
        if let Some(mut transition) = self.transition.take() {
            transition.elapsed = (transition.elapsed + delta).min(transition.duration);
            let time = transition.elapsed / transition.duration;
            self.time_scale = transition.start * (1.0 - time) + transition.end * time;
            if transition.elapsed >= transition.duration {
                due = std::mem::take(&mut self.callbacks);
            } else {
                self.transition = Some(transition);
            }
        }

        self.raw_delta = delta;
        self.delta = delta * self.time_scale;
        self.elapsed += self.delta;
        self.play_time += delta;
        due
    }

    /// Change the time scale, optionally over `duration` ms (linear).
    ///
    /// An immediate change returns the pending transition-end callbacks.
    pub fn set_time_scale(&mut self, time_scale: f64, duration: f64) -> Vec<TransitionCallback> {
        if duration > 0.0 {
            self.transition = Some(ScaleTransition {
                start: self.time_scale,
                end: time_scale,
                elapsed: 0.0,
                duration,
            });
            Vec::new()
        } else {
            self.time_scale = time_scale;
            self.transition = None;
            std::mem::take(&mut self.callbacks)
        }
    }

    /// Run `callback` when the current time-scale transition ends
    pub fn on_transition_end(&mut self, callback: impl FnOnce() + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn reset(&mut self) {
        self.time_scale = 1.0;
        self.play_time = 0.0;
        self.transition = None;
        self.callbacks.clear();
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn raw_delta(&self) -> f64 {
        self.raw_delta
    }

    /// Accumulated scaled time
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Accumulated real time since the last reset
    pub fn play_time(&self) -> f64 {
        self.play_time
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(35.0)
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("time_scale", &self.time_scale)
            .field("delta", &self.delta)
            .field("raw_delta", &self.raw_delta)
            .field("elapsed", &self.elapsed)
            .field("transition", &self.transition)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn delta_is_clamped_and_scaled() {
        let mut clock = Clock::new(35.0);
        clock.set_time_scale(0.5, 0.0);

        clock.advance(100.0);

        assert_eq!(clock.raw_delta(), 35.0);
        assert_eq!(clock.delta(), 17.5);
        assert_eq!(clock.play_time(), 35.0);
    }

    #[test]
    fn transition_interpolates_and_fires_callbacks_once() {
        let mut clock = Clock::new(100.0);
        let fired = Rc::new(Cell::new(0));
        let seen = fired.clone();
        clock.set_time_scale(3.0, 100.0);
        clock.on_transition_end(move || seen.set(seen.get() + 1));

        let due = clock.advance(50.0);
        assert!(due.is_empty());
        assert_eq!(clock.time_scale(), 2.0);

        let due = clock.advance(50.0);
        assert_eq!(due.len(), 1);
        for callback in due {
            callback();
        }
        assert_eq!(clock.time_scale(), 3.0);
        assert!(clock.advance(50.0).is_empty());
        assert_eq!(fired.get(), 1);
    }
}
