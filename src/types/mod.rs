//! Core data types of the event engine
//!
//! This module contains the plain data the runtime operates on:
//! - EventType: semantic type used to index and dispatch sequences
//! - Sequence: compiled, immutable list of steps plus run-time metadata
//! - Attributes / AmbientBindings: context shared by chained handlers
//! - Entity records: inheritable content entities and their event tables

pub mod context;
pub mod entity;
pub mod event_type;
pub mod sequence;

pub use context::{AmbientBindings, Attributes};
pub use entity::{
    AttributeEntry, CompiledEntity, EntityDefinition, EntityKind, EquipmentEntry,
    EventDefinition, EventTable, InventoryEntry, Keyed, ScriptAttachment, SkillEntry,
};
pub use event_type::{EventType, ScriptMethod};
pub use sequence::{ParameterSchema, Sequence, SequenceBuilder, SequenceRef, Signature, Step};
