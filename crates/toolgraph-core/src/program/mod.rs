//! Resolved program model.
//!
//! A [`Program`] is an arena of tools keyed by id plus an entry point.
//! Edges between tools are id references stored in each tool's
//! `tool_mapping`, so shared and cyclic references never create
//! ownership cycles.

mod tool;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};

pub use tool::{Tool, ToolSource, tool_id};

/// Tool id -> tool, ordered for deterministic serialization.
pub type ToolSet = BTreeMap<String, Tool>;

/// The finished result of resolution. Read-only once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProgramRecord")]
pub struct Program {
    name: String,
    #[serde(rename = "entryToolID")]
    entry_tool_id: String,
    #[serde(rename = "toolSet")]
    tool_set: ToolSet,
}

/// Unchecked wire form; deserialization goes through [`Program::new`].
#[derive(Deserialize)]
struct ProgramRecord {
    name: String,
    #[serde(rename = "entryToolID", alias = "entryToolId")]
    entry_tool_id: String,
    #[serde(rename = "toolSet")]
    tool_set: ToolSet,
}

impl TryFrom<ProgramRecord> for Program {
    type Error = LoadError;

    fn try_from(record: ProgramRecord) -> Result<Self> {
        Self::new(record.name, record.entry_tool_id, record.tool_set)
    }
}

impl Program {
    /// Build a program, checking its id invariants.
    pub(crate) fn new(
        name: impl Into<String>,
        entry_tool_id: impl Into<String>,
        tool_set: ToolSet,
    ) -> Result<Self> {
        let program = Self {
            name: name.into(),
            entry_tool_id: entry_tool_id.into(),
            tool_set,
        };
        program.validate()?;
        Ok(program)
    }

    /// The original root reference.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_tool_id(&self) -> &str {
        &self.entry_tool_id
    }

    pub fn tool_set(&self) -> &ToolSet {
        &self.tool_set
    }

    pub fn entry_tool(&self) -> Option<&Tool> {
        self.tool_set.get(&self.entry_tool_id)
    }

    pub fn tool(&self, id: &str) -> Option<&Tool> {
        self.tool_set.get(id)
    }

    /// Follow a raw reference declared by `tool_id` to its target.
    pub fn referenced_tool(&self, tool_id: &str, raw_ref: &str) -> Option<&Tool> {
        let target = self.tool_set.get(tool_id)?.tool_mapping.get(raw_ref)?;
        self.tool_set.get(target)
    }

    /// Check that the entry and every mapped reference exist in the tool set.
    pub fn validate(&self) -> Result<()> {
        if !self.tool_set.contains_key(&self.entry_tool_id) {
            return Err(LoadError::InvalidProgram {
                message: format!("entry tool {} is not in the tool set", self.entry_tool_id),
            });
        }

        for tool in self.tool_set.values() {
            for (raw, target) in &tool.tool_mapping {
                if !self.tool_set.contains_key(target) {
                    return Err(LoadError::InvalidProgram {
                        message: format!(
                            "tool {} maps {:?} to missing tool {}",
                            tool.id, raw, target
                        ),
                    });
                }
            }
        }

        Ok(())
    }
}
