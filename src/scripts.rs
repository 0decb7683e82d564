//! Attached script behaviors
//!
//! A behavior declares which [`ScriptMethod`]s it implements when it is
//! attached; the manager caches one index per method so dispatch never
//! visits behaviors that do not respond to an event type.

use crate::errors::ScriptError;
use crate::runtime::Runtime;
use crate::runtime::debug::TARGET_SCRIPTS;
use crate::types::{EventType, ScriptAttachment, ScriptMethod};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Arguments of one behavior invocation
pub struct ScriptContext<'a> {
    pub runtime: &'a Runtime,
    /// Id of the entity (or `"plugins"`) the behavior is attached to
    pub owner: &'a str,
    /// Payload of the dispatch, e.g. the input event
    pub argument: Option<&'a Value>,
    /// Scaled frame delta for [`ScriptMethod::Update`], otherwise 0
    pub delta: f64,
}

/// Behavior attached to an entity or to the plugin layer
pub trait ScriptBehavior {
    /// Methods this behavior responds to; read once at attachment
    fn capabilities(&self) -> Vec<ScriptMethod>;

    fn invoke(&mut self, method: ScriptMethod, context: &ScriptContext<'_>) -> anyhow::Result<()>;

    fn on_attach(&mut self, _owner: &str) {}

    fn on_detach(&mut self, _owner: &str) {}
}

type ScriptFactory = Rc<dyn Fn(&Map<String, Value>) -> Box<dyn ScriptBehavior>>;

/// Script ids to behavior constructors
#[derive(Clone, Default)]
pub struct ScriptCatalog {
    factories: HashMap<String, ScriptFactory>,
}

impl ScriptCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor; it receives the attachment's parameters
    pub fn register<F, B>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&Map<String, Value>) -> B + 'static,
        B: ScriptBehavior + 'static,
    {
        self.factories.insert(
            id.into(),
            Rc::new(move |parameters| Box::new(factory(parameters)) as Box<dyn ScriptBehavior>),
        );
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn instantiate(&self, id: &str, parameters: &Map<String, Value>) -> Option<Box<dyn ScriptBehavior>> {
        self.factories.get(id).map(|factory| factory(parameters))
    }
}

impl fmt::Debug for ScriptCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

struct AttachedScript {
    id: String,
    behavior: RefCell<Box<dyn ScriptBehavior>>,
}

/// Ordered behaviors of one owner plus the per-method index
#[derive(Default)]
pub struct ScriptManager {
    owner: String,
    instances: RefCell<Vec<Rc<AttachedScript>>>,
    index: RefCell<HashMap<ScriptMethod, Vec<Rc<AttachedScript>>>>,
}

impl ScriptManager {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            ..Self::default()
        }
    }

    /// Build a manager from attachment records in their final order.
    ///
    /// Disabled attachments are skipped. Unknown script ids are logged and
    /// skipped; the errors are returned for reporting.
    pub fn compose(
        owner: impl Into<String>,
        catalog: &ScriptCatalog,
        attachments: &[ScriptAttachment],
    ) -> (Self, Vec<ScriptError>) {
        let manager = Self::new(owner);
        let errors = manager.attach_all(catalog, attachments);
        (manager, errors)
    }

    pub fn attach_all(&self, catalog: &ScriptCatalog, attachments: &[ScriptAttachment]) -> Vec<ScriptError> {
        let mut errors = Vec::new();
        for attachment in attachments.iter().filter(|a| a.enabled) {
            match catalog.instantiate(&attachment.id, &attachment.parameters) {
                Some(behavior) => self.add(attachment.id.clone(), behavior),
                None => {
                    let error = ScriptError::not_found(&attachment.id, &self.owner);
                    log::error!(target: TARGET_SCRIPTS, "{}; skipped", error);
                    errors.push(error);
                }
            }
        }
        errors
    }

    /// Attach a behavior at the end of the execution order
    pub fn add(&self, id: impl Into<String>, mut behavior: Box<dyn ScriptBehavior>) {
        behavior.on_attach(&self.owner);
        let capabilities = behavior.capabilities();
        let script = Rc::new(AttachedScript {
            id: id.into(),
            behavior: RefCell::new(behavior),
        });
        let mut index = self.index.borrow_mut();
        for method in capabilities {
            let entry = index.entry(method).or_default();
            if !entry.iter().any(|s| Rc::ptr_eq(s, &script)) {
                entry.push(script.clone());
            }
        }
        log::debug!(target: TARGET_SCRIPTS, "Attached {} to {}", script.id, self.owner);
        self.instances.borrow_mut().push(script);
    }

    /// Detach every behavior with this id
    pub fn remove(&self, id: &str) {
        let removed: Vec<Rc<AttachedScript>> = {
            let mut instances = self.instances.borrow_mut();
            let (removed, kept): (Vec<_>, Vec<_>) = instances.drain(..).partition(|s| s.id == id);
            *instances = kept;
            removed
        };
        if removed.is_empty() {
            return;
        }
        for list in self.index.borrow_mut().values_mut() {
            list.retain(|s| s.id != id);
        }
        for script in removed {
            if let Ok(mut behavior) = script.behavior.try_borrow_mut() {
                behavior.on_detach(&self.owner);
            }
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Attached script ids in execution order
    pub fn ids(&self) -> Vec<String> {
        self.instances.borrow().iter().map(|s| s.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.instances.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.borrow().is_empty()
    }

    /// Number of behaviors responding to `method`
    pub fn responders(&self, method: ScriptMethod) -> usize {
        self.index.borrow().get(&method).map_or(0, Vec::len)
    }

    /// Deliver an event to every behavior responding to its type.
    ///
    /// Input events stop at the first behavior that stops propagation.
    pub fn emit(&self, runtime: &Runtime, event_type: &EventType, argument: Option<&Value>) {
        let Some(method) = event_type.script_method() else {
            return;
        };
        let context = ScriptContext {
            runtime,
            owner: &self.owner,
            argument,
            delta: 0.0,
        };
        for script in self.responders_snapshot(method) {
            self.invoke(&script, method, &context);
            if event_type.is_input() && !runtime.bubbles().bubbles() {
                return;
            }
        }
    }

    /// Run the per-frame [`ScriptMethod::Update`] of every behavior
    pub fn update(&self, runtime: &Runtime, delta: f64) {
        let context = ScriptContext {
            runtime,
            owner: &self.owner,
            argument: None,
            delta,
        };
        for script in self.responders_snapshot(ScriptMethod::Update) {
            self.invoke(&script, ScriptMethod::Update, &context);
        }
    }

    fn responders_snapshot(&self, method: ScriptMethod) -> Vec<Rc<AttachedScript>> {
        self.index.borrow().get(&method).cloned().unwrap_or_default()
    }

    fn invoke(&self, script: &AttachedScript, method: ScriptMethod, context: &ScriptContext<'_>) {
        let Ok(mut behavior) = script.behavior.try_borrow_mut() else {
            log::warn!(
                target: TARGET_SCRIPTS,
                "{} of {} re-entered {:?}; nested call skipped",
                script.id,
                self.owner,
                method
            );
            return;
        };
        if let Err(e) = behavior.invoke(method, context) {
            let error = ScriptError::Failed {
                script: script.id.clone(),
                method: format!("{:?}", method),
                reason: format!("{:#}", e),
            };
            log::error!(target: TARGET_SCRIPTS, "{}", error);
        }
    }
}

impl fmt::Debug for ScriptManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptManager")
            .field("owner", &self.owner)
            .field("scripts", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    struct Recorder {
        name: String,
        methods: Vec<ScriptMethod>,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl ScriptBehavior for Recorder {
        fn capabilities(&self) -> Vec<ScriptMethod> {
            self.methods.clone()
        }

        fn invoke(&mut self, method: ScriptMethod, context: &ScriptContext<'_>) -> anyhow::Result<()> {
            let arg = context.argument.map(|v| v.to_string()).unwrap_or_default();
            self.log
                .borrow_mut()
                .push(format!("{}:{:?}{}", self.name, method, arg));
            Ok(())
        }
    }

    fn recorder(name: &str, methods: Vec<ScriptMethod>, log: &Rc<RefCell<Vec<String>>>) -> Box<dyn ScriptBehavior> {
        Box::new(Recorder {
            name: name.to_string(),
            methods,
            log: log.clone(),
        })
    }

    #[test]
    fn emit_reaches_only_capable_behaviors_in_order() {
        let rt = Runtime::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let manager = ScriptManager::new("hero");
        manager.add("a", recorder("a", vec![ScriptMethod::OnKeyDown], &log));
        manager.add("b", recorder("b", vec![ScriptMethod::Update], &log));
        manager.add("c", recorder("c", vec![ScriptMethod::OnKeyDown], &log));

        manager.emit(&rt, &EventType::KeyDown, Some(&Value::from("Escape")));

        assert_eq!(
            *log.borrow(),
            vec!["a:OnKeyDown\"Escape\"", "c:OnKeyDown\"Escape\""]
        );
        assert_eq!(manager.responders(ScriptMethod::OnKeyDown), 2);
    }

    #[test]
    fn compose_skips_missing_and_disabled_scripts() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut catalog = ScriptCatalog::new();
        let sink = log.clone();
        catalog.register("glow", move |_| Recorder {
            name: "glow".into(),
            methods: vec![ScriptMethod::Update],
            log: sink.clone(),
        });
        let attachments = vec![
            ScriptAttachment {
                id: "missing".into(),
                enabled: true,
                parameters: Map::new(),
            },
            ScriptAttachment {
                id: "glow".into(),
                enabled: false,
                parameters: Map::new(),
            },
            ScriptAttachment {
                id: "glow".into(),
                enabled: true,
                parameters: Map::new(),
            },
        ];

        let (manager, errors) = ScriptManager::compose("torch", &catalog, &attachments);

        assert_eq!(manager.ids(), vec!["glow"]);
        assert_eq!(errors, vec![ScriptError::not_found("missing", "torch")]);
    }

    #[test]
    fn remove_drops_behavior_from_index() {
        let rt = Runtime::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let manager = ScriptManager::new("plugins");
        manager.add("tick", recorder("tick", vec![ScriptMethod::Update], &log));

        manager.update(&rt, 16.0);
        manager.remove("tick");
        manager.update(&rt, 16.0);

        assert_eq!(log.borrow().len(), 1);
        assert!(manager.is_empty());
        assert_eq!(manager.responders(ScriptMethod::Update), 0);
    }
}
