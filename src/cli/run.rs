//! Headless project runner
//!
//! Loads a project, dispatches the start event and steps a fixed number of
//! frames, printing what the events logged.

use crate::compiler::{CoreCompiler, Transcript, undefined_labels};
use crate::loader::{LoadReport, ProjectData, ProjectLoader, read_project_file};
use crate::runtime::Runtime;
use crate::runtime::debug::DebugLogger;
use crate::scripts::ScriptCatalog;
use crate::types::EventType;
use std::path::{Path, PathBuf};

/// Options of the `run` command
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub path: PathBuf,
    pub frames: u64,
    /// Real milliseconds per frame
    pub delta: f64,
    pub debug: bool,
    /// Event type dispatched before the first frame
    pub start: EventType,
}

impl RunOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frames: 600,
            delta: 1000.0 / 60.0,
            debug: false,
            start: EventType::Startup,
        }
    }

    /// Parse the arguments following `run <project>`
    pub fn parse(path: impl Into<PathBuf>, args: &[String]) -> anyhow::Result<Self> {
        let mut options = Self::new(path);
        let mut args = args.iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--debug" => options.debug = true,
                "--frames" => options.frames = value_of(arg, args.next())?,
                "--delta" => options.delta = value_of(arg, args.next())?,
                "--start" => options.start = value_of::<String>(arg, args.next())?.as_str().into(),
                other => anyhow::bail!("Unknown option '{}'", other),
            }
        }
        Ok(options)
    }
}

fn value_of<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> anyhow::Result<T> {
    let value = value.ok_or_else(|| anyhow::anyhow!("{} needs a value", flag))?;
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid value '{}' for {}", value, flag))
}

/// Summary of a finished run
#[derive(Debug)]
pub struct RunSummary {
    pub frames: u64,
    pub transcript: Vec<String>,
    pub still_active: usize,
    pub report: LoadReport,
}

/// Load and run the project named by `options`
pub async fn run_project(options: &RunOptions) -> anyhow::Result<RunSummary> {
    let mut data = read_project_file(&options.path).await?;
    if options.debug {
        data.config.debug.enabled = true;
    }
    if data.config.debug.enabled {
        DebugLogger::install(data.config.debug.clone())?;
    }
    Ok(run_data(data, options))
}

/// Run already-read project data
pub fn run_data(data: ProjectData, options: &RunOptions) -> RunSummary {
    let transcript = Transcript::new();
    let loader = ProjectLoader::new(CoreCompiler::with_transcript(transcript.clone()), ScriptCatalog::new());
    let runtime = Runtime::new(data.config.clone());
    let project = loader.install(&runtime, data);

    runtime.emit(options.start.clone());
    for _ in 0..options.frames {
        runtime.update(options.delta);
    }

    let summary = RunSummary {
        frames: runtime.frame(),
        transcript: transcript.lines(),
        still_active: runtime.registry().active().len(),
        report: project.report,
    };
    runtime.shutdown();
    summary
}

/// Print a run summary to stdout
pub fn print_summary(summary: &RunSummary) {
    for line in &summary.transcript {
        println!("{}", line);
    }
    println!();
    println!("== {} frames ==", summary.frames);
    println!(
        "events loaded: {}, entities resolved: {}",
        summary.report.events_loaded, summary.report.entities_resolved
    );
    if summary.still_active > 0 {
        println!("handlers still active: {}", summary.still_active);
    }
    print_problems(&summary.report);
}

fn print_problems(report: &LoadReport) {
    for error in &report.compile_errors {
        println!("[skipped] {}", error);
    }
    for error in &report.excluded {
        println!("[excluded] {}", error);
    }
    for error in &report.script_errors {
        println!("[script] {}", error);
    }
}

/// Validate a project without running it. Returns whether it is clean.
pub async fn check_project(path: &Path) -> anyhow::Result<bool> {
    let data = read_project_file(path).await?;
    let mut clean = true;
    for (index, event) in data.events.iter().enumerate() {
        let undefined = undefined_labels(&event.commands);
        if !undefined.is_empty() {
            let name = event.id.clone().unwrap_or_else(|| format!("events/{}", index));
            println!("[labels] {}: undefined {}", name, undefined.join(", "));
            clean = false;
        }
    }

    let summary = run_data(
        data,
        &RunOptions {
            frames: 0,
            ..RunOptions::new(path)
        },
    );
    print_problems(&summary.report);
    println!(
        "events: {}, entities: {}, problems: {}",
        summary.report.events_loaded,
        summary.report.entities_resolved,
        summary.report.skipped()
    );
    Ok(clean && summary.report.is_clean())
}
