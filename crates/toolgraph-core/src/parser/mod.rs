//! Native tool syntax parser.
//!
//! A source holds one or more tool blocks separated by a `---` line. Each
//! block starts with `key: value` header lines followed by free-text
//! instructions:
//!
//! ```text
//! name: greet
//! description: Says hello
//! tools: ../bob.gpt, lister from ./tools.yaml
//! args: who: Name of the person to greet
//!
//! Say hello to ${who}.
//! ---
//! name: lister
//! ...
//! ```

mod header;

use std::collections::BTreeMap;

use crate::error::{LoadError, Result};
use crate::program::Tool;
use crate::source::Source;

/// Tools produced from a single source, before linking.
#[derive(Debug, Clone)]
pub struct ParsedSource {
    /// Canonical location of the source
    pub location: String,
    /// Tools in definition order
    pub tools: Vec<Tool>,
    /// Local name -> id, shared by every tool in the source
    pub local_tools: BTreeMap<String, String>,
    /// True when the tools already carry complete mappings
    pub linked: bool,
}

impl ParsedSource {
    /// Select the entry tool: the default tool when `sub_tool` is empty,
    /// otherwise the tool with that local name.
    pub fn entry_id(&self, sub_tool: &str) -> Result<&str> {
        self.local_tools
            .get(sub_tool)
            .map(String::as_str)
            .ok_or_else(|| LoadError::EntryNotFound {
                requested_sub_tool: sub_tool.to_string(),
                location: self.location.clone(),
            })
    }

    /// The tool of this source with the given id.
    pub fn tool(&self, id: &str) -> Result<&Tool> {
        self.tools
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| LoadError::InvalidProgram {
                message: format!("{} has no tool {}", self.location, id),
            })
    }
}

/// A `---` separated chunk of the source.
struct Block<'a> {
    lines: Vec<(usize, &'a str)>,
}

/// Parse native tool syntax into tools.
pub fn parse(source: &Source, default_model: &str) -> Result<ParsedSource> {
    let text = source.content_str()?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let location = source.location.to_string();
    let working_dir = source.working_dir();

    let mut tools = Vec::new();
    for block in split_blocks(text, source.line_anchor) {
        if let Some(tool) = parse_block(&block, &location, &working_dir, default_model)? {
            tools.push(tool);
        }
    }

    if tools.is_empty() {
        return Err(LoadError::parse(
            &location,
            source.line_anchor,
            "no tool definitions found",
        ));
    }

    let mut local_tools = BTreeMap::new();
    local_tools.insert(String::new(), tools[0].id.clone());
    for tool in &tools {
        if tool.name.is_empty() {
            continue;
        }
        if local_tools.contains_key(&tool.name) {
            return Err(LoadError::parse(
                &location,
                tool.source.line_no,
                format!("duplicate tool name {:?}", tool.name),
            ));
        }
        local_tools.insert(tool.name.clone(), tool.id.clone());
    }

    for tool in &mut tools {
        tool.local_tools = local_tools.clone();
    }

    tracing::debug!(%location, tools = tools.len(), "parsed native source");

    Ok(ParsedSource {
        location,
        tools,
        local_tools,
        linked: false,
    })
}

fn split_blocks(text: &str, line_anchor: usize) -> Vec<Block<'_>> {
    let mut blocks = vec![Block { lines: Vec::new() }];
    for (idx, line) in text.lines().enumerate() {
        if line.trim() == "---" {
            blocks.push(Block { lines: Vec::new() });
            continue;
        }
        if let Some(block) = blocks.last_mut() {
            block.lines.push((idx + line_anchor, line));
        }
    }
    blocks
}

fn is_skippable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || (trimmed.starts_with('#') && !trimmed.starts_with("#!"))
}

fn parse_block(
    block: &Block<'_>,
    location: &str,
    working_dir: &str,
    default_model: &str,
) -> Result<Option<Tool>> {
    let mut lines = block
        .lines
        .iter()
        .skip_while(|(_, line)| is_skippable(line))
        .peekable();

    let Some(&&(line_no, _)) = lines.peek() else {
        return Ok(None);
    };

    let mut tool = Tool::new(location, line_no, working_dir);
    let mut header_seen = false;
    let mut body = Vec::new();

    for &(num, line) in lines.by_ref() {
        if header_seen && line.trim().is_empty() {
            break;
        }
        if header_seen && is_skippable(line) {
            continue;
        }
        match header::split_line(line) {
            Some((key, value)) => {
                header::apply(&mut tool, key, value)
                    .map_err(|message| LoadError::parse(location, num, message))?;
                header_seen = true;
            }
            None => {
                body.push(line);
                break;
            }
        }
    }
    body.extend(lines.map(|(_, line)| *line));

    tool.instructions = body.join("\n").trim().to_string();
    if tool.model_name.is_empty() {
        tool.model_name = default_model.to_string();
    }

    if !header_seen && tool.instructions.is_empty() {
        return Ok(None);
    }

    Ok(Some(tool))
}
