//! # eventloom
//!
//! A single-threaded event execution engine for game content. Compiled event
//! sequences are run by cooperative handlers that can suspend on time or
//! indefinitely, call other sequences, and finish with callbacks. A global
//! registry indexes sequences by type and dispatches occurrences to them;
//! changes to shared collections are deferred to the end of the frame.
//!
//! ## Quick Start
//!
//! ```rust
//! use eventloom::runtime::{DispatchOptions, Runtime};
//! use eventloom::types::Sequence;
//!
//! let runtime = Runtime::default();
//! let greeting = Sequence::builder("startup")
//!     .id("greeting")
//!     .step(|ctx| {
//!         ctx.attributes().set("greeted", true.into());
//!         true
//!     })
//!     .step(|ctx| ctx.wait(100.0))
//!     .build();
//! runtime.registry().load(greeting);
//!
//! runtime.dispatch("startup", DispatchOptions::default());
//! for _ in 0..10 {
//!     runtime.update(16.0);
//! }
//! assert!(runtime.registry().active().is_empty());
//! ```
//!
//! ## Loading Projects
//!
//! ```rust,no_run
//! use eventloom::compiler::CoreCompiler;
//! use eventloom::loader::{FileSystemProjectSource, ProjectLoader};
//! use eventloom::scripts::ScriptCatalog;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> anyhow::Result<()> {
//! let loader = ProjectLoader::new(CoreCompiler::new(), ScriptCatalog::new());
//! let (runtime, project) = loader.load(&FileSystemProjectSource::new("game")).await?;
//! println!("{} events loaded", project.report.events_loaded);
//! runtime.emit("startup");
//! runtime.update(16.0);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod compiler;
pub mod config;
pub mod errors;
pub mod loader;
pub mod resolve;
pub mod runtime;
pub mod scripts;
pub mod types;

pub use compiler::{CoreCompiler, InstructionCompiler, Transcript};
pub use config::EngineConfig;
pub use errors::{EngineError, ResolveError, ScriptError};
pub use loader::{LoadReport, Project, ProjectData, ProjectLoader, ProjectSource};
pub use resolve::{Resolution, resolve};
pub use runtime::{DispatchOptions, EventHandler, EventRegistry, Runtime, StepContext};
pub use scripts::{ScriptBehavior, ScriptCatalog, ScriptContext, ScriptManager};
pub use types::{EventType, Sequence, SequenceRef};
