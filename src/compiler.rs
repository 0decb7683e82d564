//! Instruction compilation
//!
//! The engine runs opaque steps; turning authored command trees into steps is
//! the job of an [`InstructionCompiler`]. [`CoreCompiler`] implements a small
//! command set that only touches the engine itself (attributes, waits,
//! dispatch, registry flags), enough to run content from the command line.

use crate::runtime::debug::TARGET_HANDLER;
use crate::runtime::{DispatchOptions, StepContext};
use crate::types::{EventType, Step};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Compiles one event's command tree into steps
pub trait InstructionCompiler {
    fn compile(&self, commands: &Value, path: &str) -> anyhow::Result<Vec<Step>>;
}

/// Lines written by `log` commands, shared between clones
#[derive(Debug, Clone, Default)]
pub struct Transcript(Rc<RefCell<Vec<String>>>);

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        self.0.borrow_mut().push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Compiler for the built-in command set
///
/// Commands are JSON objects with an `op` field:
///
/// | op | fields |
/// |----|--------|
/// | `log` | `message` (`{key}` expands an attribute) |
/// | `wait` | `duration` (ms) |
/// | `pause` | |
/// | `set` | `key`, `value` |
/// | `add` | `key`, `value` (numeric) |
/// | `call` | `event` (global event id) |
/// | `emit` | `type`, optional `priority`, `argument`, `inherit` |
/// | `enable` / `disable` | `event` |
/// | `label` | `name` |
/// | `jump` | `label` |
/// | `jump_if` | `key`, `cmp` (`eq`, `ne`, `lt`, `le`, `gt`, `ge`), `value`, `label` |
/// | `stop_propagation` | |
/// | `finish` | |
#[derive(Debug, Clone, Default)]
pub struct CoreCompiler {
    transcript: Transcript,
}

impl CoreCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transcript(transcript: Transcript) -> Self {
        Self { transcript }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }
}

impl InstructionCompiler for CoreCompiler {
    fn compile(&self, commands: &Value, path: &str) -> anyhow::Result<Vec<Step>> {
        CommandCompiler::new(path, self.transcript.clone()).compile(commands)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

impl Comparison {
    fn holds(self, left: Option<&Value>, right: &Value) -> bool {
        match self {
            Comparison::Equal => left == Some(right),
            Comparison::NotEqual => left != Some(right),
            _ => {
                let (Some(l), Some(r)) = (left.and_then(Value::as_f64), right.as_f64()) else {
                    return false;
                };
                match self {
                    Comparison::LessThan => l < r,
                    Comparison::LessThanOrEqual => l <= r,
                    Comparison::GreaterThan => l > r,
                    _ => l >= r,
                }
            }
        }
    }
}

// A jump whose target label is resolved after the first pass.
type Pending = Box<dyn FnOnce(usize) -> Step>;

enum Compiled {
    Ready(Step),
    Jump { label: String, build: Pending },
}

struct CommandCompiler<'a> {
    path: &'a str,
    transcript: Transcript,
    current: usize,
    steps: Vec<Compiled>,
    labels: HashMap<String, usize>,
}

impl<'a> CommandCompiler<'a> {
    fn new(path: &'a str, transcript: Transcript) -> Self {
        Self {
            path,
            transcript,
            current: 0,
            steps: Vec::new(),
            labels: HashMap::new(),
        }
    }

    fn compile(mut self, commands: &Value) -> anyhow::Result<Vec<Step>> {
        let list = match commands {
            Value::Null => return Ok(Vec::new()),
            Value::Array(list) => list,
            _ => anyhow::bail!("Commands of {} must be an array", self.path),
        };

        // First pass: compile commands, record labels
        for (index, command) in list.iter().enumerate() {
            self.current = index;
            self.compile_command(command)?;
        }

        // Second pass: resolve jump targets
        let labels = self.labels;
        let path = self.path;
        self.steps
            .into_iter()
            .map(|compiled| match compiled {
                Compiled::Ready(step) => Ok(step),
                Compiled::Jump { label, build } => labels
                    .get(&label)
                    .map(|&target| build(target))
                    .ok_or_else(|| anyhow::anyhow!("Undefined label '{}' in {}", label, path)),
            })
            .collect()
    }

    fn compile_command(&mut self, command: &Value) -> anyhow::Result<()> {
        let fields = command.as_object().ok_or_else(|| {
            anyhow::anyhow!("Command {} in {} is not an object", self.current, self.path)
        })?;
        let op = self.require_str(fields, "op", "command")?;

        match op {
            "log" => {
                let message = self.require_str(fields, "message", op)?.to_string();
                let transcript = self.transcript.clone();
                self.push(move |ctx| {
                    let line = expand(&message, ctx);
                    log::info!(target: TARGET_HANDLER, "{}", line);
                    transcript.push(line);
                    true
                });
            }
            "wait" => {
                let duration = self.require_f64(fields, "duration", op)?;
                self.push(move |ctx| ctx.wait(duration));
            }
            "pause" => self.push(|ctx| ctx.pause()),
            "set" => {
                let key = self.require_str(fields, "key", op)?.to_string();
                let value = fields.get("value").cloned().unwrap_or(Value::Null);
                self.push(move |ctx| {
                    ctx.attributes().set(key.clone(), value.clone());
                    true
                });
            }
            "add" => {
                let key = self.require_str(fields, "key", op)?.to_string();
                let amount = self.require_f64(fields, "value", op)?;
                self.push(move |ctx| {
                    let current = ctx.attributes().get(&key).and_then(|v| v.as_f64()).unwrap_or(0.0);
                    ctx.attributes().set(key.clone(), number(current + amount));
                    true
                });
            }
            "call" => {
                let id = self.require_str(fields, "event", op)?.to_string();
                self.push(move |ctx| match ctx.runtime().registry().get(&id) {
                    Some(sequence) => ctx.call(sequence),
                    None => true,
                });
            }
            "emit" => {
                let event_type = EventType::from(self.require_str(fields, "type", op)?);
                let priority = fields.get("priority").and_then(Value::as_bool);
                let argument = fields.get("argument").cloned();
                let inherit = fields.get("inherit").and_then(Value::as_bool).unwrap_or(false);
                self.push(move |ctx| {
                    let options = DispatchOptions {
                        priority,
                        argument: argument.clone(),
                        bindings: None,
                        inherit: inherit.then(|| ctx.handler().clone()),
                    };
                    ctx.runtime().dispatch(event_type.clone(), options);
                    true
                });
            }
            "enable" => {
                let id = self.require_str(fields, "event", op)?.to_string();
                self.push(move |ctx| {
                    ctx.runtime().enable(&id);
                    true
                });
            }
            "disable" => {
                let id = self.require_str(fields, "event", op)?.to_string();
                self.push(move |ctx| {
                    ctx.runtime().disable(&id);
                    true
                });
            }
            "label" => {
                let name = self.require_str(fields, "name", op)?.to_string();
                if self.labels.insert(name.clone(), self.steps.len()).is_some() {
                    anyhow::bail!("Duplicate label '{}' in {}", name, self.path);
                }
            }
            "jump" => {
                let label = self.require_str(fields, "label", op)?.to_string();
                self.steps.push(Compiled::Jump {
                    label,
                    build: Box::new(|target| -> Step { Rc::new(move |ctx: &StepContext<'_>| ctx.jump(target)) }),
                });
            }
            "jump_if" => {
                let key = self.require_str(fields, "key", op)?.to_string();
                let label = self.require_str(fields, "label", op)?.to_string();
                let cmp = self.parse_comparison(fields.get("cmp").and_then(Value::as_str).unwrap_or("eq"))?;
                let value = fields.get("value").cloned().unwrap_or(Value::Null);
                self.steps.push(Compiled::Jump {
                    label,
                    build: Box::new(move |target| -> Step {
                        Rc::new(move |ctx: &StepContext<'_>| {
                            if cmp.holds(ctx.attributes().get(&key).as_ref(), &value) {
                                ctx.jump(target)
                            } else {
                                true
                            }
                        })
                    }),
                });
            }
            "stop_propagation" => self.push(|ctx| {
                ctx.stop_propagation();
                true
            }),
            "finish" => self.push(|ctx| ctx.finish()),
            other => anyhow::bail!(
                "Unknown command '{}' at {} in {}",
                other,
                self.current,
                self.path
            ),
        }
        Ok(())
    }

    fn push(&mut self, step: impl Fn(&StepContext<'_>) -> bool + 'static) {
        self.steps.push(Compiled::Ready(Rc::new(step)));
    }

    fn require_str<'v>(&self, fields: &'v Map<String, Value>, key: &str, command: &str) -> anyhow::Result<&'v str> {
        fields.get(key).and_then(Value::as_str).ok_or_else(|| {
            anyhow::anyhow!(
                "Missing required parameter '{}' for command '{}' at {} in {}",
                key,
                command,
                self.current,
                self.path
            )
        })
    }

    fn require_f64(&self, fields: &Map<String, Value>, key: &str, command: &str) -> anyhow::Result<f64> {
        fields.get(key).and_then(Value::as_f64).ok_or_else(|| {
            anyhow::anyhow!(
                "Missing numeric parameter '{}' for command '{}' at {} in {}",
                key,
                command,
                self.current,
                self.path
            )
        })
    }

    fn parse_comparison(&self, cmp: &str) -> anyhow::Result<Comparison> {
        match cmp {
            "eq" | "==" => Ok(Comparison::Equal),
            "ne" | "!=" => Ok(Comparison::NotEqual),
            "lt" | "<" => Ok(Comparison::LessThan),
            "le" | "<=" => Ok(Comparison::LessThanOrEqual),
            "gt" | ">" => Ok(Comparison::GreaterThan),
            "ge" | ">=" => Ok(Comparison::GreaterThanOrEqual),
            _ => anyhow::bail!(
                "Invalid comparison operator '{}' at {} in {}",
                cmp,
                self.current,
                self.path
            ),
        }
    }
}

/// Labels referenced by jumps but never defined
pub fn undefined_labels(commands: &Value) -> Vec<String> {
    let Some(list) = commands.as_array() else {
        return Vec::new();
    };
    let field = |command: &Value, key: &str| command.get(key).and_then(Value::as_str).map(str::to_string);
    let op = |command: &Value| field(command, "op").unwrap_or_default();
    let defined: HashSet<String> = list
        .iter()
        .filter(|c| op(c) == "label")
        .filter_map(|c| field(c, "name"))
        .collect();
    list.iter()
        .filter(|c| matches!(op(c).as_str(), "jump" | "jump_if"))
        .filter_map(|c| field(c, "label"))
        .filter(|label| !defined.contains(label))
        .collect()
}

// Integers stay integers so `{key}` expansion prints "3", not "3.0".
fn number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Value::from(value as i64)
    } else {
        Value::from(value)
    }
}

fn expand(message: &str, ctx: &StepContext<'_>) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let key = &rest[start + 1..start + len];
        out.push_str(&ctx.attributes().get_var(key).unwrap_or_default());
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}
