//! Inheritance resolution - merging parent entities into their children.
//!
//! Entities of one kind are resolved in dependency order with a fixed-point
//! worklist, so parents may appear anywhere in the input. Each resolved
//! entity carries its full ancestry: keyed lists contain the child's entries
//! followed by every ancestor's novel ones, and the event table is flat.

use crate::errors::ResolveError;
use crate::runtime::debug::TARGET_RESOLVE;
use crate::types::{CompiledEntity, EntityKind, Keyed, ScriptAttachment};
use std::collections::{HashMap, HashSet};

/// Outcome of resolving one entity collection
#[derive(Debug, Default)]
pub struct Resolution {
    /// Resolved entities by id
    pub entities: HashMap<String, CompiledEntity>,
    /// Ids in the order they were resolved; parents precede children
    pub order: Vec<String>,
    /// Entities left out, with the reason
    pub excluded: Vec<ResolveError>,
}

impl Resolution {
    pub fn get(&self, id: &str) -> Option<&CompiledEntity> {
        self.entities.get(id)
    }

    /// Resolved entities in resolution order
    pub fn iter(&self) -> impl Iterator<Item = &CompiledEntity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }
}

/// Resolve a collection of entities of one kind.
///
/// A parent id that names no entity in the collection is logged and the
/// entity is treated as a root. Entities on a parent cycle, and entities
/// whose ancestry passes through one, are excluded.
pub fn resolve(entities: Vec<CompiledEntity>) -> Resolution {
    let known: HashSet<String> = entities.iter().map(|e| e.id.clone()).collect();
    let mut worklist: Vec<CompiledEntity> = Vec::with_capacity(entities.len());
    for mut entity in entities {
        if let Some(parent) = entity.effective_parent()
            && !known.contains(parent)
        {
            log::warn!(
                target: TARGET_RESOLVE,
                "{:?} '{}' inherits from unknown '{}'; resolved without a parent",
                entity.kind,
                entity.id,
                parent
            );
            entity.parent_id = None;
        }
        worklist.push(entity);
    }

    let mut resolution = Resolution::default();
    while !worklist.is_empty() {
        let before = worklist.len();
        let mut pending = Vec::with_capacity(before);
        for mut entity in worklist {
            let parent = match entity.effective_parent() {
                None => None,
                Some(parent_id) => match resolution.entities.get(parent_id) {
                    Some(parent) => Some(parent),
                    None => {
                        pending.push(entity);
                        continue;
                    }
                },
            };
            match parent {
                Some(parent) => inherit(&mut entity, parent),
                None => {
                    dedup_scripts(&mut entity.scripts);
                }
            }
            log::trace!(target: TARGET_RESOLVE, "Resolved {:?} '{}'", entity.kind, entity.id);
            resolution.order.push(entity.id.clone());
            resolution.entities.insert(entity.id.clone(), entity);
        }
        worklist = pending;

        if worklist.len() == before {
            resolution.excluded = exclude(&worklist);
            for error in &resolution.excluded {
                log::error!(target: TARGET_RESOLVE, "{}; entity excluded", error);
            }
            break;
        }
    }
    resolution
}

/// Merge an already-resolved parent into `child`
pub fn inherit(child: &mut CompiledEntity, parent: &CompiledEntity) {
    if merges_attributes(child.kind) {
        merge_keyed(&mut child.attributes, &parent.attributes);
    }
    merge_keyed(&mut child.skills, &parent.skills);
    merge_keyed(&mut child.equipments, &parent.equipments);
    merge_keyed(&mut child.inventory, &parent.inventory);
    child.events.layer_over(&parent.events);
    merge_scripts(&mut child.scripts, &parent.scripts);
}

// Trigger templates only inherit events and scripts.
fn merges_attributes(kind: EntityKind) -> bool {
    kind != EntityKind::Trigger
}

/// Append the parent entries whose key the child does not declare
pub fn merge_keyed<T: Keyed + Clone>(child: &mut Vec<T>, parent: &[T]) {
    let mut seen: HashSet<String> = child.iter().map(|e| e.merge_key().to_string()).collect();
    for entry in parent {
        if seen.insert(entry.merge_key().to_string()) {
            child.push(entry.clone());
        }
    }
}

/// Child's scripts first, then the parent's novel ones; duplicates dropped
pub fn merge_scripts(child: &mut Vec<ScriptAttachment>, parent: &[ScriptAttachment]) {
    let mut seen = dedup_scripts(child);
    for script in parent {
        if seen.insert(script.id.clone()) {
            child.push(script.clone());
        }
    }
}

fn dedup_scripts(scripts: &mut Vec<ScriptAttachment>) -> HashSet<String> {
    let mut seen = HashSet::new();
    scripts.retain(|script| seen.insert(script.id.clone()));
    seen
}

// Classify the entities a stalled worklist could not resolve.
fn exclude(stalled: &[CompiledEntity]) -> Vec<ResolveError> {
    let parents: HashMap<&str, &str> = stalled
        .iter()
        .filter_map(|e| e.effective_parent().map(|p| (e.id.as_str(), p)))
        .collect();

    stalled
        .iter()
        .map(|entity| {
            let parent = entity.effective_parent().unwrap_or_default().to_string();
            match cycle_through(&entity.id, &parents) {
                Some(cycle) => ResolveError::Cycle {
                    kind: entity.kind,
                    id: entity.id.clone(),
                    cycle,
                },
                None => ResolveError::ParentUnresolved {
                    kind: entity.kind,
                    id: entity.id.clone(),
                    parent,
                },
            }
        })
        .collect()
}

// Follow parent links from `start`; returns the loop if it comes back.
fn cycle_through(start: &str, parents: &HashMap<&str, &str>) -> Option<Vec<String>> {
    let mut path = vec![start.to_string()];
    let mut visited = HashSet::from([start]);
    let mut current = start;
    while let Some(&parent) = parents.get(current) {
        path.push(parent.to_string());
        if parent == start {
            return Some(path);
        }
        if !visited.insert(parent) {
            return None;
        }
        current = parent;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttributeEntry, EventType, InventoryEntry, Sequence};
    use serde_json::{Map, json};

    fn actor(id: &str, parent: &str) -> CompiledEntity {
        CompiledEntity::new(id, EntityKind::Actor).with_parent(parent)
    }

    fn attr(key: &str, value: serde_json::Value) -> AttributeEntry {
        AttributeEntry {
            key: key.into(),
            value,
        }
    }

    fn script(id: &str) -> ScriptAttachment {
        ScriptAttachment {
            id: id.into(),
            enabled: true,
            parameters: Map::new(),
        }
    }

    #[test]
    fn nearest_ancestor_wins() {
        let mut a = actor("A", "");
        a.attributes.push(attr("hp", json!(10)));
        a.attributes.push(attr("mp", json!(5)));
        let mut b = actor("B", "A");
        b.attributes.push(attr("hp", json!(20)));
        let c = actor("C", "B");

        let resolution = resolve(vec![c, b, a]);

        let c = resolution.get("C").unwrap();
        assert_eq!(c.attribute("hp"), Some(&json!(20)));
        assert_eq!(c.attribute("mp"), Some(&json!(5)));
        assert_eq!(resolution.order, vec!["A", "B", "C"]);
        assert!(resolution.excluded.is_empty());
    }

    #[test]
    fn child_declaration_beats_every_ancestor() {
        let mut a = actor("A", "");
        a.attributes.push(attr("hp", json!(10)));
        let mut b = actor("B", "A");
        b.attributes.push(attr("hp", json!(1)));

        let resolution = resolve(vec![a, b]);

        assert_eq!(resolution.get("B").unwrap().attribute("hp"), Some(&json!(1)));
    }

    #[test]
    fn child_entries_come_first() {
        let mut parent = actor("P", "");
        parent.inventory.push(InventoryEntry {
            id: "potion".into(),
            quantity: 3,
        });
        parent.inventory.push(InventoryEntry {
            id: "ether".into(),
            quantity: 1,
        });
        let mut child = actor("C", "P");
        child.inventory.push(InventoryEntry {
            id: "ether".into(),
            quantity: 9,
        });

        let resolution = resolve(vec![parent, child]);

        let inventory = &resolution.get("C").unwrap().inventory;
        let ids: Vec<(&str, u32)> = inventory.iter().map(|e| (e.id.as_str(), e.quantity)).collect();
        assert_eq!(ids, vec![("ether", 9), ("potion", 3)]);
    }

    #[test]
    fn events_fall_through_the_whole_chain() {
        let create = Sequence::new("create", Vec::new());
        let base_destroy = Sequence::new("destroy", Vec::new());
        let own_destroy = Sequence::new("destroy", Vec::new());

        let mut a = actor("A", "");
        a.events.insert(EventType::Create, create.clone());
        a.events.insert(EventType::Destroy, base_destroy);
        let b = actor("B", "A");
        let mut c = actor("C", "B");
        c.events.insert(EventType::Destroy, own_destroy.clone());

        let resolution = resolve(vec![a, b, c]);

        let c = resolution.get("C").unwrap();
        assert!(std::rc::Rc::ptr_eq(c.events.get(&EventType::Create).unwrap(), &create));
        assert!(std::rc::Rc::ptr_eq(c.events.get(&EventType::Destroy).unwrap(), &own_destroy));
        assert_eq!(c.events.len(), 2);
    }

    #[test]
    fn scripts_are_deduplicated_child_first() {
        let mut parent = actor("P", "");
        parent.scripts = vec![script("shadow"), script("glow")];
        let mut child = actor("C", "P");
        child.scripts = vec![script("glow"), script("aura"), script("glow")];

        let resolution = resolve(vec![child, parent]);

        let ids: Vec<&str> = resolution
            .get("C")
            .unwrap()
            .scripts
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["glow", "aura", "shadow"]);
    }

    #[test]
    fn root_scripts_are_deduplicated_too() {
        let mut root = CompiledEntity::new("R", EntityKind::Actor);
        root.scripts = vec![script("glow"), script("glow"), script("aura")];

        let resolution = resolve(vec![root]);

        let ids: Vec<&str> = resolution
            .get("R")
            .unwrap()
            .scripts
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(ids, vec!["glow", "aura"]);
    }

    #[test]
    fn triggers_do_not_inherit_attributes() {
        let mut parent = CompiledEntity::new("P", EntityKind::Trigger);
        parent.attributes.push(attr("speed", json!(3)));
        let child = CompiledEntity::new("C", EntityKind::Trigger).with_parent("P");

        let resolution = resolve(vec![parent, child]);

        assert!(resolution.get("C").unwrap().attributes.is_empty());
    }

    #[test]
    fn self_parent_and_unknown_parent_resolve_as_roots() {
        let own = actor("A", "A");
        let orphan = actor("B", "ghost");

        let resolution = resolve(vec![own, orphan]);

        assert_eq!(resolution.entities.len(), 2);
        assert!(resolution.excluded.is_empty());
        assert_eq!(resolution.get("B").unwrap().parent_id, None);
    }

    #[test]
    fn cycles_are_excluded_with_their_path() {
        let a = actor("A", "B");
        let b = actor("B", "A");
        let c = actor("C", "A");
        let root = actor("R", "");

        let resolution = resolve(vec![a, b, c, root]);

        assert_eq!(resolution.order, vec!["R"]);
        assert_eq!(resolution.excluded.len(), 3);
        assert!(resolution.excluded.contains(&ResolveError::Cycle {
            kind: EntityKind::Actor,
            id: "A".into(),
            cycle: vec!["A".into(), "B".into(), "A".into()],
        }));
        assert!(resolution.excluded.contains(&ResolveError::ParentUnresolved {
            kind: EntityKind::Actor,
            id: "C".into(),
            parent: "A".into(),
        }));
    }
}
