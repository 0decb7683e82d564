//! Project loading - reading content and installing it into a runtime
//!
//! Project data is read through a [`ProjectSource`], then [`ProjectLoader`]
//! compiles every event, resolves entity inheritance per kind, indexes global
//! events in the registry and attaches plugin scripts. A bad event, script or
//! entity is logged and skipped; the rest of the project still loads.

use crate::compiler::InstructionCompiler;
use crate::config::EngineConfig;
use crate::errors::{EngineError, ResolveError, ScriptError};
use crate::resolve::{Resolution, resolve};
use crate::runtime::debug::TARGET_LOADER;
use crate::runtime::{EventHandler, Runtime};
use crate::scripts::{ScriptCatalog, ScriptManager};
use crate::types::{
    AmbientBindings, CompiledEntity, EntityDefinition, EntityKind, EventDefinition, EventTable,
    EventType, ScriptAttachment, Sequence, SequenceRef, Signature,
};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Raw project content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectData {
    pub config: EngineConfig,
    /// Global events, indexed by the registry
    pub events: Vec<EventDefinition>,
    /// Inheritable entities of every kind
    pub entities: Vec<EntityDefinition>,
    /// Plugin-level script attachments
    pub plugins: Vec<ScriptAttachment>,
}

/// Where project data comes from
#[async_trait]
pub trait ProjectSource: Send + Sync {
    async fn read_project(&self) -> Result<ProjectData, EngineError>;

    /// Human-readable location for diagnostics
    fn describe(&self) -> String;
}

/// Project stored as one JSON file
pub struct FileSystemProjectSource {
    path: PathBuf,
}

impl FileSystemProjectSource {
    /// `path` may name the file itself or a directory holding `project.json`
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    fn project_file(&self) -> PathBuf {
        if self.path.is_dir() {
            self.path.join("project.json")
        } else {
            self.path.clone()
        }
    }
}

#[async_trait]
impl ProjectSource for FileSystemProjectSource {
    async fn read_project(&self) -> Result<ProjectData, EngineError> {
        let path = self.project_file();
        if !path.exists() {
            return Err(EngineError::invalid_project(format!(
                "project file {} not found",
                path.display()
            )));
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let data = serde_json::from_str(&content)?;
        Ok(data)
    }

    fn describe(&self) -> String {
        self.project_file().display().to_string()
    }
}

/// Project held in memory
#[derive(Default)]
pub struct InMemoryProjectSource {
    data: ProjectData,
}

impl InMemoryProjectSource {
    pub fn new(data: ProjectData) -> Self {
        Self { data }
    }
}

#[async_trait]
impl ProjectSource for InMemoryProjectSource {
    async fn read_project(&self) -> Result<ProjectData, EngineError> {
        Ok(self.data.clone())
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}

/// Read project data, adding the source location to errors
pub async fn read_project(source: &dyn ProjectSource) -> anyhow::Result<ProjectData> {
    source
        .read_project()
        .await
        .with_context(|| format!("Failed to load project from {}", source.describe()))
}

/// What a load installed and what it skipped
#[derive(Debug, Default)]
pub struct LoadReport {
    pub events_loaded: usize,
    pub entities_resolved: usize,
    pub compile_errors: Vec<EngineError>,
    pub excluded: Vec<ResolveError>,
    pub script_errors: Vec<ScriptError>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.compile_errors.is_empty() && self.excluded.is_empty() && self.script_errors.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.compile_errors.len() + self.excluded.len() + self.script_errors.len()
    }
}

/// Installed project: resolved entities and their script managers
#[derive(Debug, Default)]
pub struct Project {
    pub entities: HashMap<EntityKind, Resolution>,
    pub scripts: HashMap<(EntityKind, String), ScriptManager>,
    pub report: LoadReport,
}

impl Project {
    pub fn entity(&self, kind: EntityKind, id: &str) -> Option<&CompiledEntity> {
        self.entities.get(&kind)?.get(id)
    }

    pub fn scripts(&self, kind: EntityKind, id: &str) -> Option<&ScriptManager> {
        self.scripts.get(&(kind, id.to_string()))
    }

    /// Run an entity's effective event of `event_type`, then notify its
    /// scripts. Returns the handler, if the entity has such an event.
    pub fn trigger(
        &self,
        runtime: &Runtime,
        kind: EntityKind,
        id: &str,
        event_type: &EventType,
        bindings: Option<&AmbientBindings>,
    ) -> Option<EventHandler> {
        let entity = self.entity(kind, id)?;
        let handler = entity.events.get(event_type).map(|sequence| {
            let handler = EventHandler::new(sequence.clone());
            if let Some(bindings) = bindings {
                handler.apply_bindings(bindings);
            }
            runtime.call(handler, None)
        });
        if let Some(scripts) = self.scripts(kind, id) {
            scripts.emit(runtime, event_type, None);
        }
        handler
    }
}

/// Compiles and installs project data
pub struct ProjectLoader<C: InstructionCompiler> {
    compiler: C,
    catalog: ScriptCatalog,
}

impl<C: InstructionCompiler> ProjectLoader<C> {
    pub fn new(compiler: C, catalog: ScriptCatalog) -> Self {
        Self { compiler, catalog }
    }

    pub fn compiler(&self) -> &C {
        &self.compiler
    }

    pub fn catalog(&self) -> &ScriptCatalog {
        &self.catalog
    }

    /// Compile one event definition; `fallback_path` is used when the
    /// definition names none
    pub fn compile_event(&self, definition: &EventDefinition, fallback_path: &str) -> Result<SequenceRef, EngineError> {
        let path = format!("@ {}", definition.path.as_deref().unwrap_or(fallback_path));
        let steps = self
            .compiler
            .compile(&definition.commands, &path)
            .map_err(|e| EngineError::compile(&path, format!("{:#}", e)))?;

        let mut builder = Sequence::builder(definition.event_type.clone())
            .path(path)
            .enabled(definition.enabled)
            .priority(definition.priority)
            .steps(steps);
        if let Some(id) = &definition.id {
            builder = builder.id(id.clone());
        }
        if definition.signature != Signature::default() {
            builder = builder.signature(definition.signature.clone());
        }
        Ok(builder.build())
    }

    /// Compile an entity's own events. Failing events are recorded and left out.
    pub fn compile_entity(&self, definition: &EntityDefinition, report: &mut LoadReport) -> CompiledEntity {
        let mut events = EventTable::new();
        for event in &definition.events {
            let fallback = format!("{:?}/{}/{}", definition.kind, definition.id, event.event_type);
            match self.compile_event(event, &fallback) {
                Ok(sequence) => {
                    if events.insert(event.event_type.clone(), sequence).is_some() {
                        log::warn!(
                            target: TARGET_LOADER,
                            "{:?} '{}' declares {} twice; the last one is used",
                            definition.kind,
                            definition.id,
                            event.event_type
                        );
                    }
                }
                Err(e) => {
                    log::error!(target: TARGET_LOADER, "{}; event skipped", e);
                    report.compile_errors.push(e);
                }
            }
        }

        CompiledEntity {
            id: definition.id.clone(),
            kind: definition.kind,
            parent_id: Some(definition.parent_id.clone()).filter(|p| !p.is_empty()),
            attributes: definition.attributes.clone(),
            skills: definition.skills.clone(),
            equipments: definition.equipments.clone(),
            inventory: definition.inventory.clone(),
            events,
            scripts: definition.scripts.clone(),
        }
    }

    /// Install project data into `runtime`.
    ///
    /// The runtime should have been created from `data.config`.
    pub fn install(&self, runtime: &Runtime, data: ProjectData) -> Project {
        let mut project = Project::default();

        for (index, definition) in data.events.iter().enumerate() {
            let fallback = definition
                .id
                .clone()
                .unwrap_or_else(|| format!("events/{}", index));
            match self.compile_event(definition, &fallback) {
                Ok(sequence) => {
                    runtime.registry().load(sequence);
                    project.report.events_loaded += 1;
                }
                Err(e) => {
                    log::error!(target: TARGET_LOADER, "{}; event skipped", e);
                    project.report.compile_errors.push(e);
                }
            }
        }

        let mut by_kind: HashMap<EntityKind, Vec<CompiledEntity>> = HashMap::new();
        for definition in &data.entities {
            let entity = self.compile_entity(definition, &mut project.report);
            by_kind.entry(entity.kind).or_default().push(entity);
        }
        for (kind, entities) in by_kind {
            let mut resolution = resolve(entities);
            project.report.entities_resolved += resolution.entities.len();
            project.report.excluded.append(&mut resolution.excluded);
            for entity in resolution.iter() {
                let (manager, mut errors) = ScriptManager::compose(entity.id.clone(), &self.catalog, &entity.scripts);
                project.report.script_errors.append(&mut errors);
                project.scripts.insert((kind, entity.id.clone()), manager);
            }
            project.entities.insert(kind, resolution);
        }

        let mut errors = runtime.scripts().attach_all(&self.catalog, &data.plugins);
        project.report.script_errors.append(&mut errors);

        log::info!(
            target: TARGET_LOADER,
            "Loaded {} events and {} entities ({} skipped)",
            project.report.events_loaded,
            project.report.entities_resolved,
            project.report.skipped()
        );
        project
    }

    /// Read a project from `source`, build a runtime from its configuration
    /// and install it
    pub async fn load(&self, source: &dyn ProjectSource) -> anyhow::Result<(Runtime, Project)> {
        let data = read_project(source).await?;
        let runtime = Runtime::new(data.config.clone());
        let project = self.install(&runtime, data);
        Ok((runtime, project))
    }
}

/// Read project data from a path
pub async fn read_project_file(path: impl AsRef<Path>) -> anyhow::Result<ProjectData> {
    read_project(&FileSystemProjectSource::new(path.as_ref())).await
}
