//! Stop-propagation channel for input dispatches

use std::cell::RefCell;

/// One flag per in-flight input dispatch; the innermost one is live.
#[derive(Debug, Default)]
pub struct BubbleStack {
    frames: RefCell<Vec<bool>>,
}

impl BubbleStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a frame for a new input dispatch
    pub fn push(&self) {
        self.frames.borrow_mut().push(true);
    }

    /// Close the innermost frame, returning whether it still bubbled
    pub fn pop(&self) -> bool {
        self.frames.borrow_mut().pop().unwrap_or(true)
    }

    /// Whether the innermost dispatch should keep propagating
    pub fn bubbles(&self) -> bool {
        self.frames.borrow().last().copied().unwrap_or(true)
    }

    /// Stop the innermost dispatch after the current receiver
    pub fn stop(&self) {
        if let Some(top) = self.frames.borrow_mut().last_mut() {
            *top = false;
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_only_affects_innermost_frame() {
        let stack = BubbleStack::new();
        stack.push();
        stack.push();
        stack.stop();

        assert!(!stack.bubbles());
        assert!(!stack.pop());
        assert!(stack.bubbles());
        assert!(stack.pop());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn stop_outside_dispatch_is_ignored() {
        let stack = BubbleStack::new();
        stack.stop();
        assert!(stack.bubbles());
    }
}
