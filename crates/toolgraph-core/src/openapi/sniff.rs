//! Cheap pre-parse classification of source bytes.

use serde::Deserialize;
use serde_json::Value;

/// OpenAPI major version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenApiVersion {
    V2,
    V3,
}

impl OpenApiVersion {
    pub fn major(self) -> u8 {
        match self {
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }
}

/// How a source should be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Native tool syntax
    Native,
    /// OpenAPI document, JSON or YAML
    OpenApi(OpenApiVersion),
    /// Artifact written by the assembler
    Assembled,
}

/// Only the top-level fields used for classification are decoded.
#[derive(Debug, Default, Deserialize)]
struct Probe {
    swagger: Option<Value>,
    openapi: Option<Value>,
    #[serde(rename = "toolgraphAssembly")]
    assembly: Option<Value>,
}

fn probe(data: &[u8]) -> Option<Probe> {
    if let Ok(probe) = serde_json::from_slice::<Probe>(data) {
        return Some(probe);
    }
    serde_yaml::from_slice::<Probe>(data).ok()
}

/// Detect the OpenAPI version of a JSON or YAML document.
pub fn sniff(data: &[u8]) -> Option<OpenApiVersion> {
    let probe = probe(data)?;

    if probe.swagger.is_some() {
        return Some(OpenApiVersion::V2);
    }

    let version = match probe.openapi? {
        Value::String(s) => s,
        other => other.to_string(),
    };
    version.starts_with('3').then_some(OpenApiVersion::V3)
}

/// Two-valued form: `(major version, is OpenAPI)`.
pub fn is_openapi(data: &[u8]) -> (u8, bool) {
    match sniff(data) {
        Some(version) => (version.major(), true),
        None => (0, false),
    }
}

/// Classify a source as native, OpenAPI or an assembled artifact.
pub fn detect_format(data: &[u8]) -> SourceFormat {
    if let Some(version) = sniff(data) {
        return SourceFormat::OpenApi(version);
    }

    let is_assembly = serde_json::from_slice::<Probe>(data)
        .map(|probe| probe.assembly.is_some())
        .unwrap_or(false);
    if is_assembly {
        return SourceFormat::Assembled;
    }

    SourceFormat::Native
}
