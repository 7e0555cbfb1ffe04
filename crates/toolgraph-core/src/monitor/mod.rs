//! Run monitoring.
//!
//! A [`Monitor`] follows one run of a program. It receives [`Event`]s from
//! the runner, keeps a record of every call and the chat messages it
//! exchanged, logs progress through `tracing`, and can dump the whole
//! record as JSON when the run stops.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::program::Program;

/// Identity of a call within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallContext {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub tool_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EventKind {
    CallStart {
        input: String,
    },
    CallProgress {
        content: String,
    },
    #[serde(rename_all = "camelCase")]
    CallContinue {
        tool_results: usize,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        completion_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        response: Option<Value>,
        #[serde(default)]
        cached: bool,
    },
    CallFinish {
        output: String,
    },
}

/// Something that happened during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: DateTime<Utc>,
    pub call: CallContext,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    /// An event stamped with the current time.
    pub fn now(call: CallContext, kind: EventKind) -> Self {
        Self {
            time: Utc::now(),
            call,
            kind,
        }
    }
}

/// A chat exchange recorded for a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub completion_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cached: bool,
}

/// Record of one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub tool_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub input: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
}

impl Call {
    fn new(context: &CallContext) -> Self {
        Self {
            id: context.id.clone(),
            parent_id: context.parent_id.clone(),
            tool_id: context.tool_id.clone(),
            messages: Vec::new(),
            start: None,
            end: None,
            input: String::new(),
            output: String::new(),
        }
    }
}

/// Everything recorded about a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunDump {
    pub id: String,
    pub program: Program,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<Call>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub input: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
    #[serde(rename = "err", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Creates monitors and numbers their runs.
#[derive(Debug, Default)]
pub struct MonitorFactory {
    dump_state: Option<PathBuf>,
    run_counter: AtomicU64,
}

impl MonitorFactory {
    /// `dump_state` is where each run's record is written when it stops.
    pub fn new(dump_state: Option<PathBuf>) -> Self {
        Self {
            dump_state,
            run_counter: AtomicU64::new(0),
        }
    }

    /// Begin monitoring a run of `program`.
    pub fn start(&self, program: &Program, input: &str) -> Monitor {
        let id = self.run_counter.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(run_id = id, %input, program = %program.name(), "run started");

        Monitor {
            dump_state: self.dump_state.clone(),
            state: Mutex::new(RunState {
                dump: RunDump {
                    id: id.to_string(),
                    program: program.clone(),
                    calls: Vec::new(),
                    input: input.to_string(),
                    output: String::new(),
                    error: None,
                },
                pretty_ids: HashMap::new(),
                pretty_counter: 0,
            }),
        }
    }
}

struct RunState {
    dump: RunDump,
    /// call id -> short sequential id used in log lines
    pretty_ids: HashMap<String, u64>,
    pretty_counter: u64,
}

impl RunState {
    fn call_index(&mut self, context: &CallContext) -> usize {
        if let Some(idx) = self.dump.calls.iter().position(|c| c.id == context.id) {
            return idx;
        }
        self.dump.calls.push(Call::new(context));
        self.dump.calls.len() - 1
    }

    fn pretty_id(&mut self, call_id: &str) -> u64 {
        if let Some(id) = self.pretty_ids.get(call_id) {
            return *id;
        }
        self.pretty_counter += 1;
        self.pretty_ids
            .insert(call_id.to_string(), self.pretty_counter);
        self.pretty_counter
    }

    /// `main` for the root call, otherwise the tool chain below the root
    /// with the call's short id, e.g. `lister->fetch(3)`.
    fn call_name(&self, call_id: &str) -> String {
        let Some(mut current) = self.dump.calls.iter().find(|c| c.id == call_id) else {
            return call_id.to_string();
        };

        let mut names = Vec::new();
        let mut visited = HashSet::from([current.id.as_str()]);
        loop {
            let name = self
                .dump
                .program
                .tool(&current.tool_id)
                .map(|tool| tool.display_name().to_string())
                .unwrap_or_else(|| current.tool_id.clone());

            let parent = current
                .parent_id
                .as_deref()
                .and_then(|parent| self.dump.calls.iter().find(|c| c.id == parent));

            match (parent, &current.parent_id) {
                (Some(parent), _) if visited.insert(parent.id.as_str()) => {
                    names.push(name);
                    current = parent;
                }
                // parent not seen yet or already in the chain
                (Some(_), _) | (None, Some(_)) => {
                    names.push(name);
                    break;
                }
                // root call
                (None, None) => break,
            }
        }

        if names.is_empty() {
            return "main".to_string();
        }

        names.reverse();
        let pretty = self.pretty_ids.get(call_id).copied().unwrap_or_default();
        format!("{}({})", names.join("->"), pretty)
    }
}

/// Monitor for a single run.
pub struct Monitor {
    dump_state: Option<PathBuf>,
    state: Mutex<RunState>,
}

impl Monitor {
    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn run_id(&self) -> String {
        self.state().dump.id.clone()
    }

    /// Record an event. Calls are created on first sight, so events of a
    /// child may arrive before its parent has finished.
    pub fn event(&self, event: Event) {
        let mut state = self.state();
        let idx = state.call_index(&event.call);
        state.pretty_id(&event.call.id);
        let name = state.call_name(&event.call.id);

        let call_id = event.call.id.as_str();
        let parent_id = event.call.parent_id.as_deref().unwrap_or_default();
        let tool_id = event.call.tool_id.as_str();

        let call = &mut state.dump.calls[idx];
        match event.kind {
            EventKind::CallStart { input } => {
                tracing::info!(call_id, parent_id, tool_id, %input, "started  [{}]", name);
                call.start = Some(event.time);
                call.input = input;
            }
            EventKind::CallProgress { content } => {
                tracing::trace!(call_id, len = content.len(), "progress [{}]", name);
            }
            EventKind::CallContinue { tool_results } => {
                tracing::info!(call_id, parent_id, tool_id, tool_results, "continue [{}]", name);
            }
            EventKind::Chat {
                completion_id,
                request,
                response,
                cached,
            } => {
                if request.is_some() {
                    tracing::info!(call_id, parent_id, tool_id, "sent     [{}]", name);
                }
                tracing::debug!(call_id, %completion_id, cached, "messages [{}]", name);
                call.messages.push(Message {
                    completion_id,
                    request,
                    response,
                    cached,
                });
            }
            EventKind::CallFinish { output } => {
                tracing::info!(call_id, parent_id, tool_id, %output, "ended    [{}]", name);
                call.end = Some(event.time);
                call.output = output;
            }
        }
    }

    /// Display name of a call, see [`Event`].
    pub fn call_name(&self, call_id: &str) -> String {
        self.state().call_name(call_id)
    }

    /// Snapshot of the recorded calls.
    pub fn calls(&self) -> Vec<Call> {
        self.state().dump.calls.clone()
    }

    /// Record the result of the run and write the dump if configured.
    pub fn stop(&self, output: &str, error: Option<&str>) -> Result<()> {
        let run_id = {
            let mut state = self.state();
            state.dump.output = output.to_string();
            state.dump.error = error.map(str::to_string);
            state.dump.id.clone()
        };
        tracing::debug!(%run_id, %output, error, "run stopped");

        if let Some(path) = &self.dump_state {
            let mut writer = BufWriter::new(File::create(path)?);
            self.dump(&mut writer)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        Ok(())
    }

    /// Write the current record as pretty JSON.
    pub fn dump<W: Write>(&self, writer: W) -> Result<()> {
        let dump = self.state().dump.clone();
        serde_json::to_writer_pretty(writer, &dump)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{Tool, ToolSet};

    fn program() -> Program {
        let mut tool_set = ToolSet::new();
        for (line, name) in [(1, ""), (5, "lister"), (9, "fetch")] {
            let mut tool = Tool::new("/w/main.gpt", line, "/w");
            tool.name = name.to_string();
            tool_set.insert(tool.id.clone(), tool);
        }
        Program::new("main.gpt", "/w/main.gpt:1", tool_set).unwrap()
    }

    fn context(id: &str, parent: Option<&str>, line: usize) -> CallContext {
        CallContext {
            id: id.to_string(),
            parent_id: parent.map(str::to_string),
            tool_id: format!("/w/main.gpt:{}", line),
        }
    }

    fn start(monitor: &Monitor, ctx: CallContext) {
        monitor.event(Event::now(
            ctx,
            EventKind::CallStart {
                input: String::new(),
            },
        ));
    }

    #[test]
    fn test_call_names() {
        let factory = MonitorFactory::new(None);
        let monitor = factory.start(&program(), "hi");

        start(&monitor, context("1", None, 1));
        start(&monitor, context("2", Some("1"), 5));
        start(&monitor, context("3", Some("2"), 9));

        assert_eq!(monitor.call_name("1"), "main");
        assert_eq!(monitor.call_name("2"), "lister(2)");
        assert_eq!(monitor.call_name("3"), "lister->fetch(3)");
    }

    #[test]
    fn test_child_before_parent() {
        let monitor = MonitorFactory::new(None).start(&program(), "");
        start(&monitor, context("7", Some("1"), 9));
        assert_eq!(monitor.call_name("7"), "fetch(1)");
        assert_eq!(monitor.calls().len(), 1);
    }

    #[test]
    fn test_parent_loops_end() {
        let monitor = MonitorFactory::new(None).start(&program(), "");
        start(&monitor, context("1", Some("1"), 5));
        assert_eq!(monitor.call_name("1"), "lister(1)");

        start(&monitor, context("2", Some("3"), 5));
        start(&monitor, context("3", Some("2"), 9));
        assert_eq!(monitor.call_name("3"), "lister->fetch(3)");
        assert_eq!(monitor.call_name("2"), "fetch->lister(2)");
    }

    #[test]
    fn test_run_ids_are_scoped_to_factory() {
        let first = MonitorFactory::new(None);
        let second = MonitorFactory::new(None);
        assert_eq!(first.start(&program(), "").run_id(), "1");
        assert_eq!(first.start(&program(), "").run_id(), "2");
        assert_eq!(second.start(&program(), "").run_id(), "1");
    }

    #[test]
    fn test_events_fill_call_record() {
        let monitor = MonitorFactory::new(None).start(&program(), "in");
        let ctx = context("1", None, 1);
        start(&monitor, ctx.clone());
        monitor.event(Event::now(
            ctx.clone(),
            EventKind::Chat {
                completion_id: "c1".to_string(),
                request: Some(serde_json::json!({"model": "m"})),
                response: None,
                cached: false,
            },
        ));
        monitor.event(Event::now(
            ctx,
            EventKind::CallFinish {
                output: "done".to_string(),
            },
        ));

        let calls = monitor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].messages.len(), 1);
        assert_eq!(calls[0].output, "done");
        assert!(calls[0].start.is_some() && calls[0].end.is_some());
    }

    #[test]
    fn test_event_json_shape() {
        let event = Event::now(
            context("1", None, 1),
            EventKind::CallContinue { tool_results: 2 },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "callContinue");
        assert_eq!(json["toolResults"], 2);
        assert_eq!(json["call"]["toolId"], "/w/main.gpt:1");
    }
}
