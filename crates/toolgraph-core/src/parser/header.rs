//! Header line handling for native tool blocks.

use serde_json::{Map, Value, json};

use crate::program::Tool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HeaderKey {
    Name,
    Description,
    Tools,
    Arg,
    Model,
    InternalPrompt,
    JsonResponse,
    Temperature,
    MaxTokens,
    Cache,
}

impl HeaderKey {
    fn from_key(key: &str) -> Option<Self> {
        let normalized = key
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let key = match normalized.as_str() {
            "name" => Self::Name,
            "description" => Self::Description,
            "tool" | "tools" => Self::Tools,
            "arg" | "args" | "param" | "params" | "parameter" | "parameters" => Self::Arg,
            "model" | "modelname" | "model name" => Self::Model,
            "internal prompt" => Self::InternalPrompt,
            "json response" => Self::JsonResponse,
            "temperature" => Self::Temperature,
            "max tokens" => Self::MaxTokens,
            "cache" => Self::Cache,
            _ => return None,
        };
        Some(key)
    }
}

/// Split a `key: value` line whose key is a known header key.
pub(super) fn split_line(line: &str) -> Option<(HeaderKey, &str)> {
    let (key, value) = line.split_once(':')?;
    let key = HeaderKey::from_key(key)?;
    Some((key, value.trim()))
}

/// Apply a header value to the tool, returning a message on malformed input.
pub(super) fn apply(tool: &mut Tool, key: HeaderKey, value: &str) -> Result<(), String> {
    match key {
        HeaderKey::Name => {
            if value.is_empty() {
                return Err("tool name must not be empty".to_string());
            }
            tool.name = value.to_string();
        }
        HeaderKey::Description => tool.description = value.to_string(),
        HeaderKey::Tools => tool.tools.extend(
            value
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        ),
        HeaderKey::Arg => add_argument(tool, value)?,
        HeaderKey::Model => tool.model_name = value.to_string(),
        HeaderKey::InternalPrompt => tool.internal_prompt = Some(parse_bool(value)?),
        HeaderKey::JsonResponse => tool.json_response = parse_bool(value)?,
        HeaderKey::Temperature => {
            let temperature = value
                .parse::<f32>()
                .map_err(|_| format!("invalid temperature {:?}", value))?;
            tool.temperature = Some(temperature);
        }
        HeaderKey::MaxTokens => {
            let max_tokens = value
                .parse::<u32>()
                .map_err(|_| format!("invalid max tokens {:?}", value))?;
            tool.max_tokens = Some(max_tokens);
        }
        HeaderKey::Cache => tool.cache = Some(parse_bool(value)?),
    }
    Ok(())
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(format!("invalid boolean {:?}, expected true or false", value)),
    }
}

/// `args: name: description` adds a string property to the argument schema.
fn add_argument(tool: &mut Tool, value: &str) -> Result<(), String> {
    let (name, description) = value
        .split_once(':')
        .ok_or_else(|| format!("invalid argument {:?}, expected 'name: description'", value))?;

    let name = name.trim();
    if name.is_empty() {
        return Err("argument name must not be empty".to_string());
    }

    let schema = tool
        .arguments
        .get_or_insert_with(|| json!({"type": "object", "properties": {}}));

    let Some(properties) = schema
        .as_object_mut()
        .map(|obj| obj.entry("properties").or_insert_with(|| Value::Object(Map::new())))
        .and_then(Value::as_object_mut)
    else {
        return Err("argument schema is not an object".to_string());
    };

    properties.insert(
        name.to_string(),
        json!({"type": "string", "description": description.trim()}),
    );
    Ok(())
}
