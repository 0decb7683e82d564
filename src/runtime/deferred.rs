//! Deferred mutation queue
//!
//! Structural changes to shared collections (type lists, active-handler
//! lists) requested while those collections are being iterated are pushed
//! here and applied once per frame, after every other update has run.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type Deferred = Box<dyn FnOnce()>;

/// Process-wide FIFO buffer of zero-argument callbacks.
///
/// Cloning yields another handle to the same buffer.
#[derive(Clone, Default)]
pub struct DeferredQueue {
    functions: Rc<RefCell<Vec<Deferred>>>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a callback for the next flush
    pub fn push(&self, f: impl FnOnce() + 'static) {
        self.functions.borrow_mut().push(Box::new(f));
    }

    /// Run every queued callback once, in push order.
    ///
    /// Callbacks pushed while flushing wait for the next flush.
    /// Returns how many callbacks ran.
    pub fn flush(&self) -> usize {
        let batch = std::mem::take(&mut *self.functions.borrow_mut());
        let count = batch.len();
        for f in batch {
            f();
        }
        count
    }

    /// Drop every queued callback without running it
    pub fn reset(&self) {
        self.functions.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.functions.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.borrow().is_empty()
    }
}

impl fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredQueue")
            .field("pending", &self.len())
            .finish()
    }
}
