//! Engine errors
//!
//! None of these stop the run-time. They describe the single item that was
//! skipped so hosts can report it.

use crate::types::EntityKind;
use thiserror::Error;

/// Failures while loading or compiling content
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to compile event {path}: {reason}")]
    Compile { path: String, reason: String },

    #[error("Invalid project data: {reason}")]
    InvalidProject { reason: String },

    #[error("Invalid engine configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Script(#[from] ScriptError),
}

impl EngineError {
    pub fn compile(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Compile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_project(reason: impl Into<String>) -> Self {
        Self::InvalidProject {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// Entities excluded by inheritance resolution
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("{kind:?} '{id}' is part of a parent cycle: {}", .cycle.join(" -> "))]
    Cycle {
        kind: EntityKind,
        id: String,
        cycle: Vec<String>,
    },

    #[error("{kind:?} '{id}' inherits from '{parent}', which could not be resolved")]
    ParentUnresolved {
        kind: EntityKind,
        id: String,
        parent: String,
    },
}

impl ResolveError {
    /// Id of the excluded entity
    pub fn entity_id(&self) -> &str {
        match self {
            Self::Cycle { id, .. } | Self::ParentUnresolved { id, .. } => id,
        }
    }
}

/// Script attachment failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScriptError {
    #[error("Script '{script}' attached to '{owner}' is not registered")]
    NotFound { script: String, owner: String },

    #[error("Script '{script}' failed in {method}: {reason}")]
    Failed {
        script: String,
        method: String,
        reason: String,
    },
}

impl ScriptError {
    pub fn not_found(script: impl Into<String>, owner: impl Into<String>) -> Self {
        Self::NotFound {
            script: script.into(),
            owner: owner.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_members() {
        let err = ResolveError::Cycle {
            kind: EntityKind::Actor,
            id: "a".into(),
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Actor 'a' is part of a parent cycle: a -> b -> a");
        assert_eq!(err.entity_id(), "a");
    }

    #[test]
    fn resolve_error_converts_to_engine_error() {
        let err: EngineError = ResolveError::ParentUnresolved {
            kind: EntityKind::Skill,
            id: "fireball+".into(),
            parent: "fireball".into(),
        }
        .into();
        assert!(matches!(err, EngineError::Resolve(_)));
    }
}
