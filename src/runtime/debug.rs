//! Debug logging for runtime execution
//!
//! Diagnostics are emitted through the `log` facade with one target per
//! engine component. [`DebugLogger`] is a small backend hosts can install to
//! see them on stderr or in a file, filtered by [`DebugConfig`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

pub const TARGET_RUNTIME: &str = "eventloom::runtime";
pub const TARGET_HANDLER: &str = "eventloom::handler";
pub const TARGET_REGISTRY: &str = "eventloom::registry";
pub const TARGET_TIMER: &str = "eventloom::timer";
pub const TARGET_RESOLVE: &str = "eventloom::resolve";
pub const TARGET_SCRIPTS: &str = "eventloom::scripts";
pub const TARGET_LOADER: &str = "eventloom::loader";

/// Debug log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// All internal state changes
    Trace,
    /// Development debugging information
    Debug,
    /// Important state changes
    Info,
    /// Potential issues
    Warn,
    /// Error situations
    Error,
}

impl LogLevel {
    fn filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// Debug log category, one per engine component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DebugCategory {
    /// Frame driver and invocation protocol
    Engine,
    /// Handler stepping, call stack, suspension
    Flow,
    /// Registration and dispatch
    Registry,
    Timers,
    /// Inheritance resolution
    Resolve,
    Scripts,
    Loader,
}

impl DebugCategory {
    /// Category of a log target, if it belongs to this crate
    pub fn from_target(target: &str) -> Option<Self> {
        let category = match target {
            TARGET_RUNTIME => DebugCategory::Engine,
            TARGET_HANDLER => DebugCategory::Flow,
            TARGET_REGISTRY => DebugCategory::Registry,
            TARGET_TIMER => DebugCategory::Timers,
            TARGET_RESOLVE => DebugCategory::Resolve,
            TARGET_SCRIPTS => DebugCategory::Scripts,
            TARGET_LOADER => DebugCategory::Loader,
            _ => return None,
        };
        Some(category)
    }
}

/// Debug configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Enable debug logging
    pub enabled: bool,
    /// Minimum log level
    pub level: LogLevel,
    /// Output destination
    pub output: DebugOutput,
    /// Enabled categories
    pub categories: HashSet<DebugCategory>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        let mut categories = HashSet::new();
        categories.insert(DebugCategory::Engine);
        categories.insert(DebugCategory::Flow);
        categories.insert(DebugCategory::Registry);
        categories.insert(DebugCategory::Resolve);
        categories.insert(DebugCategory::Scripts);
        categories.insert(DebugCategory::Loader);

        Self {
            enabled: std::env::var("EVENTLOOM_DEBUG").is_ok(),
            level: LogLevel::Debug,
            output: DebugOutput::Stderr,
            categories,
        }
    }
}

impl DebugConfig {
    /// Whether a record of `level` for `target` passes the filter.
    ///
    /// Targets outside this crate are only filtered by level.
    pub fn allows(&self, target: &str, level: log::Level) -> bool {
        if !self.enabled || level > self.level.filter() {
            return false;
        }
        match DebugCategory::from_target(target) {
            Some(category) => self.categories.contains(&category),
            None => true,
        }
    }
}

/// Debug output destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DebugOutput {
    /// Output to stderr
    Stderr,
    /// Append to a file
    File(String),
}

/// `log` backend writing `[LEVEL] Category message` lines
pub struct DebugLogger {
    config: DebugConfig,
    file: Option<Mutex<File>>,
}

impl DebugLogger {
    pub fn new(config: DebugConfig) -> std::io::Result<Self> {
        let file = match &config.output {
            DebugOutput::Stderr => None,
            DebugOutput::File(path) => Some(Mutex::new(
                OpenOptions::new().create(true).append(true).open(path)?,
            )),
        };
        Ok(Self { config, file })
    }

    /// Install as the global logger.
    ///
    /// Fails if another logger is already installed.
    pub fn install(config: DebugConfig) -> anyhow::Result<()> {
        let max_level = if config.enabled {
            config.level.filter()
        } else {
            log::LevelFilter::Off
        };
        let logger = Self::new(config)?;
        log::set_boxed_logger(Box::new(logger))
            .map_err(|e| anyhow::anyhow!("logger already installed: {e}"))?;
        log::set_max_level(max_level);
        Ok(())
    }

    pub fn config(&self) -> &DebugConfig {
        &self.config
    }
}

/// Render one log line
pub fn format_line(level: log::Level, target: &str, message: &str) -> String {
    let category = match DebugCategory::from_target(target) {
        Some(category) => format!("{:?}", category),
        None => target.to_string(),
    };
    format!("[{}] {:10} {}", level, category, message)
}

impl log::Log for DebugLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.config.allows(metadata.target(), metadata.level())
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(record.level(), record.target(), &record.args().to_string());
        match &self.file {
            None => eprintln!("{}", line),
            Some(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = writeln!(file, "{}", line);
                }
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file
            && let Ok(mut file) = file.lock()
        {
            let _ = file.flush();
        }
    }
}
