//! Engine configuration

use crate::runtime::debug::DebugConfig;
use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Steps a handler may run in one update before it is stopped.
    /// `None` disables the guard.
    pub max_steps_per_update: Option<usize>,
    /// Bound of the spare timer pool
    pub timer_pool_capacity: usize,
    /// Per-frame clamp of the raw delta (milliseconds)
    pub max_delta_time: f64,
    /// Age after which an active handler is reported once (milliseconds)
    pub stuck_handler_warning_ms: Option<f64>,
    /// Debug logging configuration
    pub debug: DebugConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps_per_update: None,
            timer_pool_capacity: 100_000,
            max_delta_time: 35.0,
            stuck_handler_warning_ms: Some(60_000.0),
            debug: DebugConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.max_steps_per_update = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_steps_per_update, None);
        assert_eq!(config.timer_pool_capacity, 100_000);
        assert_eq!(config.max_delta_time, 35.0);
        assert_eq!(config.stuck_handler_warning_ms, Some(60_000.0));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(r#"{ "max_steps_per_update": 500 }"#).unwrap();
        assert_eq!(config.max_steps_per_update, Some(500));
        assert_eq!(config.max_delta_time, 35.0);
    }

    #[test]
    fn null_disables_stuck_warning() {
        let config = EngineConfig::from_json(r#"{ "stuck_handler_warning_ms": null }"#).unwrap();
        assert_eq!(config.stuck_handler_warning_ms, None);
    }
}
