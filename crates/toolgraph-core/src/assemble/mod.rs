//! Self-contained program artifacts.
//!
//! An artifact is a single JSON document holding every tool reachable
//! from the entry, with references rewritten to positions in the `tools`
//! array. The entry is always at index 0 and the rest follow in id order,
//! so assembling the same program twice yields identical bytes.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LoadError, Result};
use crate::parser::ParsedSource;
use crate::program::{Program, Tool, ToolSet};
use crate::source::Source;

/// Top-level key identifying an artifact.
pub const ASSEMBLY_MARKER: &str = "toolgraphAssembly";

/// Current artifact format version.
pub const ASSEMBLY_VERSION: u32 = 1;

const TOOL_MAPPING: &str = "toolMapping";
const LOCAL_TOOLS: &str = "localTools";

#[derive(Debug, Serialize, Deserialize)]
struct Artifact {
    #[serde(rename = "toolgraphAssembly")]
    version: u32,
    name: String,
    entry: usize,
    tools: Vec<Value>,
}

/// Write `program` as an artifact.
pub fn assemble<W: Write>(program: &Program, writer: W) -> Result<()> {
    let order = closure(program);
    let index: BTreeMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, tool)| (tool.id.as_str(), i))
        .collect();

    let mut tools = Vec::with_capacity(order.len());
    for tool in &order {
        let mut value = serde_json::to_value(tool)?;
        let Some(fields) = value.as_object_mut() else {
            return Err(LoadError::InvalidProgram {
                message: format!("tool {} did not serialize to an object", tool.id),
            });
        };

        let mapping = indexed(&tool.tool_mapping, &index);
        if mapping.len() != tool.tool_mapping.len() {
            return Err(LoadError::InvalidProgram {
                message: format!("tool {} references a tool outside the program", tool.id),
            });
        }
        fields.remove(TOOL_MAPPING);
        if !mapping.is_empty() {
            fields.insert(TOOL_MAPPING.to_string(), serde_json::to_value(mapping)?);
        }

        let local = indexed(&tool.local_tools, &index);
        if local.len() != tool.local_tools.len() {
            tracing::debug!(
                tool = %tool.id,
                dropped = tool.local_tools.len() - local.len(),
                "dropping unreachable local tools"
            );
        }
        fields.insert(LOCAL_TOOLS.to_string(), serde_json::to_value(local)?);

        tools.push(value);
    }

    let artifact = Artifact {
        version: ASSEMBLY_VERSION,
        name: program.name().to_string(),
        entry: 0,
        tools,
    };

    let mut writer = writer;
    serde_json::to_writer_pretty(&mut writer, &artifact)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Write `program` as an artifact to `path`.
pub fn assemble_to_path(program: &Program, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    assemble(program, BufWriter::new(file))
}

/// Rebuild a program from an artifact.
pub fn disassemble<R: Read>(reader: R) -> Result<Program> {
    let artifact: Artifact = serde_json::from_reader(reader)?;
    let (name, entry, tool_set) = unpack(artifact)?;
    Program::new(name, entry, tool_set)
}

/// Treat an artifact fetched as a source like an already linked source.
pub(crate) fn artifact_source(source: &Source) -> Result<ParsedSource> {
    let location = source.location.to_string();
    let program = serde_json::from_slice::<Artifact>(&source.content)
        .map_err(LoadError::from)
        .and_then(unpack)
        .and_then(|(name, entry, tool_set)| Program::new(name, entry, tool_set))
        .map_err(|e| LoadError::parse(&location, source.line_anchor, e.to_string()))?;

    let entry = program.entry_tool_id().to_string();
    let mut local_tools = program
        .entry_tool()
        .map(|tool| tool.local_tools.clone())
        .unwrap_or_default();
    local_tools.insert(String::new(), entry.clone());

    let mut tools: Vec<Tool> = Vec::with_capacity(program.tool_set().len());
    if let Some(tool) = program.entry_tool() {
        tools.push(tool.clone());
    }
    tools.extend(
        program
            .tool_set()
            .values()
            .filter(|tool| tool.id != entry)
            .cloned(),
    );

    tracing::debug!(%location, tools = tools.len(), "loaded assembled program");

    Ok(ParsedSource {
        location,
        tools,
        local_tools,
        linked: true,
    })
}

/// Tools reachable from the entry: entry first, the rest by id.
fn closure(program: &Program) -> Vec<&Tool> {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([program.entry_tool_id()]);
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(tool) = program.tool(id) {
            queue.extend(tool.tool_mapping.values().map(String::as_str));
        }
    }

    let mut order: Vec<&Tool> = Vec::with_capacity(seen.len());
    order.extend(program.entry_tool());
    order.extend(
        seen.iter()
            .copied()
            .filter(|id| *id != program.entry_tool_id())
            .filter_map(|id| program.tool(id)),
    );
    order
}

fn indexed(
    ids: &BTreeMap<String, String>,
    index: &BTreeMap<&str, usize>,
) -> BTreeMap<String, usize> {
    ids.iter()
        .filter_map(|(key, id)| index.get(id.as_str()).map(|i| (key.clone(), *i)))
        .collect()
}

fn unpack(artifact: Artifact) -> Result<(String, String, ToolSet)> {
    let invalid = |message: String| LoadError::InvalidProgram { message };

    if artifact.version != ASSEMBLY_VERSION {
        return Err(invalid(format!(
            "unsupported artifact version {}",
            artifact.version
        )));
    }

    let ids = artifact
        .tools
        .iter()
        .enumerate()
        .map(|(i, tool)| {
            tool.get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| invalid(format!("tool at index {} has no id", i)))
        })
        .collect::<Result<Vec<_>>>()?;

    let entry = ids
        .get(artifact.entry)
        .cloned()
        .ok_or_else(|| invalid(format!("entry index {} out of range", artifact.entry)))?;

    let mut tool_set = ToolSet::new();
    for mut value in artifact.tools {
        if let Some(fields) = value.as_object_mut() {
            for key in [TOOL_MAPPING, LOCAL_TOOLS] {
                let Some(indices) = fields.remove(key) else {
                    continue;
                };
                let indices: BTreeMap<String, usize> = serde_json::from_value(indices)?;
                let mut resolved = serde_json::Map::new();
                for (name, i) in indices {
                    let id = ids
                        .get(i)
                        .ok_or_else(|| invalid(format!("{} index {} out of range", key, i)))?;
                    resolved.insert(name, Value::String(id.clone()));
                }
                fields.insert(key.to_string(), Value::Object(resolved));
            }
        }

        let tool: Tool = serde_json::from_value(value)?;
        tool_set.insert(tool.id.clone(), tool);
    }

    Ok((artifact.name, entry, tool_set))
}
