//! Version-independent view of an OpenAPI document.
//!
//! Swagger 2 and OpenAPI 3 differ in where they keep servers, parameter
//! types and request bodies. Both are normalized here into [`Operation`]s
//! so the adapter only deals with one shape.

use serde_json::Value;
use url::Url;

use crate::source::Location;

use super::sniff::OpenApiVersion;

const METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// `$ref` chains longer than this are treated as broken.
const MAX_REF_DEPTH: usize = 16;

static NULL: Value = Value::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ParamLocation {
    Path,
    Query,
    Header,
    Form,
}

#[derive(Debug, Clone)]
pub(super) struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub schema_type: String,
    pub description: String,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub(super) struct RequestBody {
    pub content_type: String,
    pub schema: Value,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub(super) struct Operation {
    pub method: String,
    pub path: String,
    pub operation_id: Option<String>,
    pub summary: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
    pub body: Option<RequestBody>,
}

#[derive(Debug, Clone)]
pub(super) struct Document {
    pub title: String,
    pub description: String,
    pub server: String,
    pub operations: Vec<Operation>,
}

/// Decode a JSON or YAML document.
pub(super) fn decode(data: &[u8]) -> Result<Value, String> {
    match serde_json::from_slice::<Value>(data) {
        Ok(value) => Ok(value),
        Err(json_err) => serde_yaml::from_slice::<Value>(data)
            .map_err(|yaml_err| format!("not valid JSON ({json_err}) or YAML ({yaml_err})")),
    }
}

impl Document {
    pub(super) fn from_value(
        doc: &Value,
        version: OpenApiVersion,
        location: &Location,
    ) -> Result<Self, String> {
        if !doc.is_object() {
            return Err("document root is not an object".to_string());
        }

        let info = doc.get("info");
        let title = str_field(info, "title");
        let description = str_field(info, "description");

        let server = match version {
            OpenApiVersion::V2 => v2_server(doc, location)?,
            OpenApiVersion::V3 => v3_server(doc, location)?,
        };

        let operations = collect_operations(doc, version)?;
        if operations.is_empty() {
            return Err("document defines no operations".to_string());
        }

        Ok(Self {
            title,
            description,
            server,
            operations,
        })
    }
}

fn str_field(value: Option<&Value>, key: &str) -> String {
    value
        .and_then(|v| v.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Follow local `$ref` pointers (`#/components/...`) to their target.
fn deref<'a>(doc: &'a Value, value: &'a Value) -> Result<&'a Value, String> {
    let mut current = value;
    for _ in 0..MAX_REF_DEPTH {
        let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
            return Ok(current);
        };
        let pointer = reference
            .strip_prefix('#')
            .ok_or_else(|| format!("unsupported external reference {:?}", reference))?;
        current = doc
            .pointer(pointer)
            .ok_or_else(|| format!("unresolved reference {:?}", reference))?;
    }
    Err("reference chain too deep".to_string())
}

fn v3_server(doc: &Value, location: &Location) -> Result<String, String> {
    let Some(server) = doc
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|servers| servers.first())
    else {
        return absolutize("/", location);
    };

    let mut url = server
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or("/")
        .to_string();

    if let Some(variables) = server.get("variables").and_then(Value::as_object) {
        for (name, variable) in variables {
            if let Some(default) = variable.get("default").and_then(Value::as_str) {
                url = url.replace(&format!("{{{}}}", name), default);
            }
        }
    }

    absolutize(&url, location)
}

fn v2_server(doc: &Value, location: &Location) -> Result<String, String> {
    let base_path = doc.get("basePath").and_then(Value::as_str).unwrap_or("/");

    let Some(host) = doc.get("host").and_then(Value::as_str) else {
        return absolutize(base_path, location);
    };

    let scheme = doc
        .get("schemes")
        .and_then(Value::as_array)
        .and_then(|schemes| schemes.first())
        .and_then(Value::as_str)
        .or_else(|| location.as_url().map(Url::scheme))
        .unwrap_or("https");

    Ok(format!("{}://{}{}", scheme, host, base_path)
        .trim_end_matches('/')
        .to_string())
}

/// Make a server URL absolute, using the document URL for relative servers.
fn absolutize(server: &str, location: &Location) -> Result<String, String> {
    if let Ok(url) = Url::parse(server) {
        if url.scheme() == "http" || url.scheme() == "https" {
            return Ok(server.trim_end_matches('/').to_string());
        }
    }

    let Some(base) = location.as_url() else {
        return Err(format!(
            "server URL {:?} is relative and the document is not remote",
            server
        ));
    };

    base.join(server)
        .map(|url| url.as_str().trim_end_matches('/').to_string())
        .map_err(|e| format!("invalid server URL {:?}: {}", server, e))
}

fn collect_operations(doc: &Value, version: OpenApiVersion) -> Result<Vec<Operation>, String> {
    let paths = doc
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| "document has no paths".to_string())?;

    let mut operations = Vec::new();
    for (path, item) in paths {
        let item = deref(doc, item)?;
        let shared = item
            .get("parameters")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for method in METHODS {
            let Some(op) = item.get(method) else {
                continue;
            };
            operations.push(operation(doc, version, path, method, shared, op)?);
        }
    }

    Ok(operations)
}

fn operation(
    doc: &Value,
    version: OpenApiVersion,
    path: &str,
    method: &str,
    shared: &[Value],
    op: &Value,
) -> Result<Operation, String> {
    let own = op
        .get("parameters")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut parameters: Vec<Parameter> = Vec::new();
    let mut body = None;

    // operation-level parameters override path-level ones with the same name and location
    for raw in shared.iter().chain(own) {
        let raw = deref(doc, raw)?;
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| format!("parameter without name in {} {}", method, path))?;
        let location = raw.get("in").and_then(Value::as_str).unwrap_or("query");
        let required = raw.get("required").and_then(Value::as_bool).unwrap_or(false);

        let location = match location {
            "path" => ParamLocation::Path,
            "query" => ParamLocation::Query,
            "header" => ParamLocation::Header,
            "formData" => ParamLocation::Form,
            "body" => {
                let schema = raw.get("schema").unwrap_or(&NULL);
                body = Some(RequestBody {
                    content_type: v2_content_type(doc, op),
                    schema: deref(doc, schema)?.clone(),
                    required,
                });
                continue;
            }
            other => {
                tracing::debug!(name, location = other, "skipping unsupported parameter location");
                continue;
            }
        };

        let schema_type = match version {
            OpenApiVersion::V2 => raw.get("type"),
            OpenApiVersion::V3 => match raw.get("schema") {
                Some(schema) => deref(doc, schema)?.get("type"),
                None => None,
            },
        }
        .and_then(Value::as_str)
        .unwrap_or("string")
        .to_string();

        let param = Parameter {
            name: name.to_string(),
            location,
            schema_type,
            description: raw
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            required: required || location == ParamLocation::Path,
        };

        parameters.retain(|p| !(p.name == param.name && p.location == param.location));
        parameters.push(param);
    }

    if let Some(request_body) = op.get("requestBody") {
        body = v3_body(doc, deref(doc, request_body)?)?;
    }

    Ok(Operation {
        method: method.to_uppercase(),
        path: path.to_string(),
        operation_id: op
            .get("operationId")
            .and_then(Value::as_str)
            .map(str::to_string),
        summary: op
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        description: op
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        parameters,
        body,
    })
}

fn v2_content_type(doc: &Value, op: &Value) -> String {
    op.get("consumes")
        .or_else(|| doc.get("consumes"))
        .and_then(Value::as_array)
        .and_then(|types| types.first())
        .and_then(Value::as_str)
        .unwrap_or("application/json")
        .to_string()
}

fn v3_body(doc: &Value, request_body: &Value) -> Result<Option<RequestBody>, String> {
    let Some(content) = request_body.get("content").and_then(Value::as_object) else {
        return Ok(None);
    };

    let entry = match content.get("application/json") {
        Some(media) => Some(("application/json", media)),
        None => content.iter().next().map(|(k, v)| (k.as_str(), v)),
    };

    let Some((content_type, media)) = entry else {
        return Ok(None);
    };

    let schema = match media.get("schema") {
        Some(schema) => deref(doc, schema)?.clone(),
        None => Value::Object(Default::default()),
    };

    Ok(Some(RequestBody {
        content_type: content_type.to_string(),
        schema,
        required: request_body
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn local() -> Location {
        Location::Local(PathBuf::from("/work/api.yaml"))
    }

    #[test]
    fn test_deref_follows_pointer() {
        let doc = serde_json::json!({
            "components": {"schemas": {"A": {"$ref": "#/components/schemas/B"}, "B": {"type": "string"}}}
        });
        let value = serde_json::json!({"$ref": "#/components/schemas/A"});
        assert_eq!(deref(&doc, &value).unwrap()["type"], "string");
    }

    #[test]
    fn test_deref_rejects_cycles_and_external_refs() {
        let doc = serde_json::json!({"a": {"$ref": "#/a"}});
        assert!(deref(&doc, &doc["a"]).is_err());

        let external = serde_json::json!({"$ref": "other.yaml#/a"});
        assert!(deref(&doc, &external).is_err());
    }

    #[test]
    fn test_relative_server_needs_remote_document() {
        assert!(absolutize("/v1", &local()).is_err());

        let remote = Location::parse_absolute("https://api.example.com/specs/api.yaml").unwrap();
        assert_eq!(absolutize("/v1", &remote).unwrap(), "https://api.example.com/v1");
        assert_eq!(absolutize("https://x.io/", &local()).unwrap(), "https://x.io");
    }

    #[test]
    fn test_v2_server() {
        let doc = serde_json::json!({"host": "api.example.com", "basePath": "/v2"});
        assert_eq!(v2_server(&doc, &local()).unwrap(), "https://api.example.com/v2");

        let doc = serde_json::json!({"host": "api.example.com", "schemes": ["http"]});
        assert_eq!(v2_server(&doc, &local()).unwrap(), "http://api.example.com");
    }

    #[test]
    fn test_path_parameters_merged_and_overridden() {
        let doc = serde_json::json!({
            "paths": {"/a/{id}": {
                "parameters": [{"name": "id", "in": "path", "type": "string", "description": "shared"}],
                "get": {"parameters": [{"name": "id", "in": "path", "type": "integer", "description": "own"}]}
            }}
        });
        let ops = collect_operations(&doc, OpenApiVersion::V2).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].parameters.len(), 1);
        assert_eq!(ops[0].parameters[0].schema_type, "integer");
        assert_eq!(ops[0].parameters[0].description, "own");
        assert!(ops[0].parameters[0].required);
    }
}
