//! Content entity records, before and after compilation

use crate::types::event_type::EventType;
use crate::types::sequence::{SequenceRef, Signature};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Kinds of content entity that support inheritance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Actor,
    Skill,
    Item,
    Equipment,
    State,
    Trigger,
}

/// Entries of lists merged by key during inheritance
pub trait Keyed {
    fn merge_key(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeEntry {
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

impl Keyed for AttributeEntry {
    fn merge_key(&self) -> &str {
        &self.key
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillEntry {
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Keyed for SkillEntry {
    fn merge_key(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentEntry {
    pub slot: String,
    pub id: String,
}

impl Keyed for EquipmentEntry {
    fn merge_key(&self) -> &str {
        &self.slot
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub id: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl Keyed for InventoryEntry {
    fn merge_key(&self) -> &str {
        &self.id
    }
}

/// A script behavior attached to an entity or to the plugin layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptAttachment {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

fn default_true() -> bool {
    true
}

/// Declarative event as authored, before compilation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: bool,
    #[serde(flatten)]
    pub signature: Signature,
    /// Command tree handed to the instruction compiler
    #[serde(default)]
    pub commands: Value,
}

/// Entity record as loaded, with raw event trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub id: String,
    pub kind: EntityKind,
    /// Parent entity id; empty or equal to `id` means none
    #[serde(default, rename = "inherit")]
    pub parent_id: String,
    #[serde(default)]
    pub attributes: Vec<AttributeEntry>,
    #[serde(default)]
    pub skills: Vec<SkillEntry>,
    #[serde(default)]
    pub equipments: Vec<EquipmentEntry>,
    #[serde(default)]
    pub inventory: Vec<InventoryEntry>,
    #[serde(default)]
    pub events: Vec<EventDefinition>,
    #[serde(default)]
    pub scripts: Vec<ScriptAttachment>,
}

/// Effective event-type to sequence table of one entity
#[derive(Debug, Clone, Default)]
pub struct EventTable(HashMap<EventType, SequenceRef>);

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, event_type: &EventType) -> Option<&SequenceRef> {
        self.0.get(event_type)
    }

    pub fn insert(&mut self, event_type: EventType, sequence: SequenceRef) -> Option<SequenceRef> {
        self.0.insert(event_type, sequence)
    }

    pub fn contains(&self, event_type: &EventType) -> bool {
        self.0.contains_key(event_type)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn types(&self) -> impl Iterator<Item = &EventType> {
        self.0.keys()
    }

    /// Add every entry of `fallback` whose type this table does not override
    pub fn layer_over(&mut self, fallback: &EventTable) {
        for (event_type, sequence) in &fallback.0 {
            self.0
                .entry(event_type.clone())
                .or_insert_with(|| sequence.clone());
        }
    }
}

/// Entity record with its own events compiled
#[derive(Debug, Clone)]
pub struct CompiledEntity {
    pub id: String,
    pub kind: EntityKind,
    pub parent_id: Option<String>,
    pub attributes: Vec<AttributeEntry>,
    pub skills: Vec<SkillEntry>,
    pub equipments: Vec<EquipmentEntry>,
    pub inventory: Vec<InventoryEntry>,
    pub events: EventTable,
    pub scripts: Vec<ScriptAttachment>,
}

impl CompiledEntity {
    /// Entity with no lists and no events
    pub fn new(id: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            id: id.into(),
            kind,
            parent_id: None,
            attributes: Vec::new(),
            skills: Vec::new(),
            equipments: Vec::new(),
            inventory: Vec::new(),
            events: EventTable::new(),
            scripts: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.value)
    }

    /// Parent id, ignoring empty and self references
    pub fn effective_parent(&self) -> Option<&str> {
        self.parent_id
            .as_deref()
            .filter(|parent| !parent.is_empty() && *parent != self.id)
    }
}
