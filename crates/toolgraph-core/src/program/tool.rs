//! Tool records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a tool was defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSource {
    /// Canonical location of the source (absolute path or URL)
    pub location: String,
    /// 1-based line the tool starts on
    pub line_no: usize,
}

/// The unit of resolution: one callable capability plus its raw references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub model_name: String,

    #[serde(default)]
    pub internal_prompt: Option<bool>,

    /// JSON schema describing the tool arguments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub json_response: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,

    #[serde(default)]
    pub instructions: String,

    pub id: String,

    /// Raw reference -> resolved tool id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tool_mapping: BTreeMap<String, String>,

    /// Local name -> tool id within the same source ("" is the default tool)
    #[serde(default)]
    pub local_tools: BTreeMap<String, String>,

    pub source: ToolSource,

    pub working_dir: String,
}

impl Tool {
    /// Create an empty tool anchored at `location:line_no`.
    pub fn new(location: &str, line_no: usize, working_dir: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            model_name: String::new(),
            internal_prompt: None,
            arguments: None,
            tools: Vec::new(),
            json_response: false,
            temperature: None,
            max_tokens: None,
            cache: None,
            instructions: String::new(),
            id: tool_id(location, line_no),
            tool_mapping: BTreeMap::new(),
            local_tools: BTreeMap::new(),
            source: ToolSource {
                location: location.to_string(),
                line_no,
            },
            working_dir: working_dir.into(),
        }
    }

    /// Display name, falling back to the source location.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.source.location
        } else {
            &self.name
        }
    }
}

/// Build a tool id from a canonical location and a 1-based line.
pub fn tool_id(location: &str, line_no: usize) -> String {
    format!("{}:{}", location, line_no)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tool_id() {
        let tool = Tool::new("/tmp/a.gpt", 4, "/tmp");
        assert_eq!(tool.id, "/tmp/a.gpt:4");
        assert_eq!(tool.source.line_no, 4);
        assert_eq!(tool.display_name(), "/tmp/a.gpt");
    }

    #[test]
    fn test_serialize_omits_unset_fields() {
        let mut tool = Tool::new("/tmp/a.gpt", 1, "/tmp");
        tool.model_name = "m".to_string();
        tool.instructions = "hi".to_string();

        let json = serde_json::to_value(&tool).unwrap();
        let obj = json.as_object().unwrap();
        assert!(obj.contains_key("internalPrompt"));
        assert!(obj["internalPrompt"].is_null());
        assert!(!obj.contains_key("tools"));
        assert!(!obj.contains_key("toolMapping"));
        assert!(!obj.contains_key("jsonResponse"));
        assert_eq!(obj["source"]["lineNo"], 1);
        assert_eq!(obj["workingDir"], "/tmp");
    }
}
