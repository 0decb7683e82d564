//! Ambient execution context shared between chained handlers

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Key/value attribute bag of a running event.
///
/// Cloning shares the bag: handlers created as continuations of another see
/// and mutate the same values.
#[derive(Debug, Clone, Default)]
pub struct Attributes(Rc<RefCell<HashMap<String, Value>>>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.borrow().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.borrow_mut().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.0.borrow_mut().remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Get value as string
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.0.borrow().get(key).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    /// Set value from its textual form, keeping numbers and booleans typed
    pub fn set_var(&self, key: impl Into<String>, value: &str) {
        let typed = if let Ok(n) = value.parse::<i64>() {
            Value::Number(n.into())
        } else if let Ok(f) = value.parse::<f64>() {
            serde_json::json!(f)
        } else if let Ok(b) = value.parse::<bool>() {
            Value::Bool(b)
        } else {
            Value::String(value.to_string())
        };
        self.set(key, typed);
    }

    /// Whether both handles point at the same bag
    pub fn ptr_eq(&self, other: &Attributes) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Owned copy of the current contents
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.0.borrow().clone()
    }
}

/// Ambient bindings copied from a parent handler into its continuations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbientBindings {
    pub trigger_actor: Option<String>,
    pub trigger_skill: Option<String>,
    pub trigger_state: Option<String>,
    pub trigger_equipment: Option<String>,
    pub trigger_item: Option<String>,
    pub trigger_object: Option<String>,
    pub trigger_light: Option<String>,
    pub trigger_region: Option<String>,
    pub trigger_tilemap: Option<String>,
    pub trigger_element: Option<String>,
    pub caster_actor: Option<String>,
    pub target_actor: Option<String>,
    /// Local-variable scope id
    pub self_var_id: Option<String>,
}

impl AmbientBindings {
    /// Overlay every binding that is set in `other`
    pub fn apply(&mut self, other: &AmbientBindings) {
        fn overlay(slot: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        overlay(&mut self.trigger_actor, &other.trigger_actor);
        overlay(&mut self.trigger_skill, &other.trigger_skill);
        overlay(&mut self.trigger_state, &other.trigger_state);
        overlay(&mut self.trigger_equipment, &other.trigger_equipment);
        overlay(&mut self.trigger_item, &other.trigger_item);
        overlay(&mut self.trigger_object, &other.trigger_object);
        overlay(&mut self.trigger_light, &other.trigger_light);
        overlay(&mut self.trigger_region, &other.trigger_region);
        overlay(&mut self.trigger_tilemap, &other.trigger_tilemap);
        overlay(&mut self.trigger_element, &other.trigger_element);
        overlay(&mut self.caster_actor, &other.caster_actor);
        overlay(&mut self.target_actor, &other.target_actor);
        overlay(&mut self.self_var_id, &other.self_var_id);
    }
}
