//! Compiled instruction sequences

use crate::runtime::StepContext;
use crate::types::event_type::EventType;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// A single compiled instruction.
///
/// Returns `true` to keep stepping in the same frame slice, `false` to yield.
pub type Step = Rc<dyn Fn(&StepContext<'_>) -> bool>;

/// Shared handle to a compiled sequence. Identity is pointer identity.
pub type SequenceRef = Rc<Sequence>;

/// Ordered, immutable list of steps plus run-time metadata
pub struct Sequence {
    steps: Vec<Step>,
    event_type: EventType,
    id: Option<String>,
    path: String,
    default_enabled: bool,
    enabled: Cell<bool>,
    priority: Cell<bool>,
    /// Registry version captured by a pending deferred enable
    pending_enable: Cell<Option<u64>>,
    signature: Option<Signature>,
}

impl Sequence {
    /// Start building a sequence of the given type
    pub fn builder(event_type: impl Into<EventType>) -> SequenceBuilder {
        SequenceBuilder::new(event_type.into())
    }

    /// Convenience constructor for ad-hoc sequences
    pub fn new(event_type: impl Into<EventType>, steps: Vec<Step>) -> SequenceRef {
        Self::builder(event_type).steps(steps).build()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Authoring location, used in diagnostics
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    pub fn default_enabled(&self) -> bool {
        self.default_enabled
    }

    /// Restore the enabled flag to its authored default
    pub fn restore_default(&self) {
        self.enabled.set(self.default_enabled);
        self.pending_enable.set(None);
    }

    /// High-priority sequences fire before default input handling
    pub fn is_priority(&self) -> bool {
        self.priority.get()
    }

    pub fn set_priority(&self, priority: bool) {
        self.priority.set(priority);
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub(crate) fn pending_enable(&self) -> Option<u64> {
        self.pending_enable.get()
    }

    pub(crate) fn set_pending_enable(&self, version: Option<u64>) {
        self.pending_enable.set(version);
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("event_type", &self.event_type)
            .field("id", &self.id)
            .field("path", &self.path)
            .field("steps", &self.steps.len())
            .field("enabled", &self.enabled.get())
            .field("priority", &self.priority.get())
            .finish()
    }
}

/// Builder for [`Sequence`]
pub struct SequenceBuilder {
    steps: Vec<Step>,
    event_type: EventType,
    id: Option<String>,
    path: String,
    enabled: bool,
    priority: bool,
    signature: Option<Signature>,
}

impl SequenceBuilder {
    fn new(event_type: EventType) -> Self {
        Self {
            steps: Vec::new(),
            event_type,
            id: None,
            path: String::new(),
            enabled: true,
            priority: false,
            signature: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Authored enabled flag, also the value restored on reset
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    pub fn signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn step(mut self, step: impl Fn(&StepContext<'_>) -> bool + 'static) -> Self {
        self.steps.push(Rc::new(step));
        self
    }

    pub fn steps(mut self, steps: Vec<Step>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn build(self) -> SequenceRef {
        let path = if self.path.is_empty() {
            match &self.id {
                Some(id) => format!("@ {id}"),
                None => format!("@ <{}>", self.event_type),
            }
        } else {
            self.path
        };
        Rc::new(Sequence {
            steps: self.steps,
            event_type: self.event_type,
            id: self.id,
            path,
            default_enabled: self.enabled,
            enabled: Cell::new(self.enabled),
            priority: Cell::new(self.priority),
            pending_enable: Cell::new(None),
            signature: self.signature,
        })
    }
}

/// Interface of a sequence that can be invoked by external scripts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub namespace: bool,
    #[serde(default, rename = "returnType")]
    pub return_type: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,
}

/// One declared parameter of an externally invokable sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub key: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: serde_json::Value,
}
