//! Tool reference grammar.
//!
//! A reference is `<subtool> from <tool> with <args>`, `<tool> with <args>`
//! or a bare `<tool>`.

/// A parsed tool reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolRef {
    /// Location or local name of the tool
    pub tool: String,
    /// Named tool inside `tool`, empty for the default tool
    pub sub_tool: String,
    /// Text after `with`, empty when absent
    pub args: String,
}

impl ToolRef {
    pub fn parse(text: &str) -> Self {
        let tokens: Vec<&str> = text.split_whitespace().collect();

        let (head, args) = match tokens.iter().position(|t| *t == "with") {
            Some(idx) => (&tokens[..idx], tokens[idx + 1..].join(" ")),
            None => (&tokens[..], String::new()),
        };

        match head.iter().position(|t| *t == "from") {
            Some(idx) => Self {
                tool: head[idx + 1..].join(" "),
                sub_tool: head[..idx].join(" "),
                args,
            },
            None => Self {
                tool: head.join(" "),
                sub_tool: String::new(),
                args,
            },
        }
    }

    pub fn has_sub_tool(&self) -> bool {
        !self.sub_tool.is_empty()
    }
}

/// Split a reference into `(tool, sub_tool)`, dropping any `with` clause.
pub fn split_tool_ref(text: &str) -> (String, String) {
    let parsed = ToolRef::parse(text);
    (parsed.tool, parsed.sub_tool)
}
