//! OpenAPI compatibility layer
//!
//! Adapts an OpenAPI document into native tools: one synthetic root tool
//! that lists every operation, followed by one tool per operation.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::{LoadError, Result};
use crate::parser::ParsedSource;
use crate::program::Tool;
use crate::source::Source;

use super::document::{self, Document, Operation, ParamLocation};
use super::sniff::OpenApiVersion;

/// Instruction prefix for operation tools.
pub const OPENAPI_DIRECTIVE: &str = "#!sys.openapi";

/// Instruction prefix for the synthetic root tool.
pub const OPENAPI_INDEX_DIRECTIVE: &str = "#!sys.openapi.index";

/// Call description embedded in an operation tool's instructions.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallDirective<'a> {
    method: &'a str,
    server: &'a str,
    path: &'a str,
    url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    path_params: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    query_params: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    header_params: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    form_params: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body_content_type: Option<&'a str>,
}

/// Convert an OpenAPI document into tools.
pub fn convert(
    source: &Source,
    version: OpenApiVersion,
    default_model: &str,
) -> Result<ParsedSource> {
    let location = source.location.to_string();
    let conversion_error = |message: String| LoadError::openapi(&location, message);

    let value = document::decode(&source.content).map_err(conversion_error)?;
    let doc = Document::from_value(&value, version, &source.location).map_err(conversion_error)?;

    let working_dir = source.working_dir();
    let anchor = source.line_anchor;

    let mut tools = Vec::with_capacity(doc.operations.len() + 1);
    let mut root = Tool::new(&location, anchor, working_dir.clone());
    root.name = if doc.title.is_empty() {
        "openapi".to_string()
    } else {
        doc.title.clone()
    };
    root.description = doc.description.clone();
    root.model_name = default_model.to_string();
    root.instructions = format!("{} {}", OPENAPI_INDEX_DIRECTIVE, doc.server);
    tools.push(root);

    let mut local_tools = BTreeMap::new();
    local_tools.insert(String::new(), tools[0].id.clone());

    for (ordinal, op) in doc.operations.iter().enumerate() {
        let mut tool = Tool::new(&location, anchor + ordinal + 1, working_dir.clone());
        tool.name = operation_name(op);
        tool.description = if op.summary.is_empty() {
            op.description.clone()
        } else {
            op.summary.clone()
        };
        tool.model_name = default_model.to_string();
        tool.arguments = arguments(op);
        tool.instructions = instructions(op, &doc.server)?;

        if local_tools.contains_key(&tool.name) {
            return Err(LoadError::openapi(
                &location,
                format!("duplicate operation name {:?}", tool.name),
            ));
        }
        local_tools.insert(tool.name.clone(), tool.id.clone());
        tools[0].tools.push(tool.name.clone());
        tools.push(tool);
    }

    // operations keep their names when the title collides with one
    local_tools
        .entry(tools[0].name.clone())
        .or_insert_with(|| tools[0].id.clone());

    for tool in &mut tools {
        tool.local_tools = local_tools.clone();
    }

    tracing::debug!(
        %location,
        version = version.major(),
        operations = doc.operations.len(),
        "converted OpenAPI document"
    );

    Ok(ParsedSource {
        location,
        tools,
        local_tools,
        linked: false,
    })
}

/// `operationId`, or `<method>_<path>` folded to identifier characters.
fn operation_name(op: &Operation) -> String {
    if let Some(id) = op.operation_id.as_deref().filter(|id| !id.trim().is_empty()) {
        return id.trim().to_string();
    }

    let raw = format!("{}_{}", op.method.to_lowercase(), op.path);
    let mut name = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    name.trim_end_matches('_').to_string()
}

fn arguments(op: &Operation) -> Option<Value> {
    if op.parameters.is_empty() && op.body.is_none() {
        return None;
    }

    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &op.parameters {
        let mut property = Map::new();
        property.insert("type".to_string(), Value::String(param.schema_type.clone()));
        if !param.description.is_empty() {
            property.insert(
                "description".to_string(),
                Value::String(param.description.clone()),
            );
        }
        properties.insert(param.name.clone(), Value::Object(property));
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    if let Some(body) = &op.body {
        properties.insert("body".to_string(), body.schema.clone());
        if body.required {
            required.push(Value::String("body".to_string()));
        }
    }

    let mut schema = json!({"type": "object", "properties": properties});
    if !required.is_empty() {
        schema["required"] = Value::Array(required);
    }
    Some(schema)
}

fn params_in(op: &Operation, location: ParamLocation) -> Vec<&str> {
    op.parameters
        .iter()
        .filter(|p| p.location == location)
        .map(|p| p.name.as_str())
        .collect()
}

fn instructions(op: &Operation, server: &str) -> Result<String> {
    let path_params = params_in(op, ParamLocation::Path);
    let query_params = params_in(op, ParamLocation::Query);

    let mut url = format!("{}{}", server, substitute_placeholders(&op.path));
    if !query_params.is_empty() {
        let query = query_params
            .iter()
            .map(|name| format!("{}=${{{}}}", name, name))
            .collect::<Vec<_>>()
            .join("&");
        url.push('?');
        url.push_str(&query);
    }

    let directive = CallDirective {
        method: &op.method,
        server,
        path: &op.path,
        url,
        path_params,
        query_params,
        header_params: params_in(op, ParamLocation::Header),
        form_params: params_in(op, ParamLocation::Form),
        body_content_type: op.body.as_ref().map(|b| b.content_type.as_str()),
    };

    Ok(format!(
        "{} {}",
        OPENAPI_DIRECTIVE,
        serde_json::to_string(&directive)?
    ))
}

/// `/pets/{petId}` -> `/pets/${petId}`
fn substitute_placeholders(path: &str) -> String {
    path.replace('{', "${")
}
