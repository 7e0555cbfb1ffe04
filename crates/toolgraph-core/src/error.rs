//! Load error types.
//!
//! Every failure is terminal for the `load` call that raised it. Errors
//! from child references are wrapped in [`LoadError::ReferenceResolution`]
//! as they propagate, so the rendered message carries the full chain of
//! referencing tools.

use thiserror::Error;

/// Result type used throughout the loader.
pub type Result<T> = std::result::Result<T, LoadError>;

#[derive(Error, Debug)]
pub enum LoadError {
    /// The location could not be read or fetched.
    #[error("source not found: {location}: {reason}")]
    SourceNotFound { location: String, reason: String },

    /// Native tool syntax was malformed.
    #[error("parse error at {location}:{line}: {message}")]
    Parse {
        location: String,
        line: usize,
        message: String,
    },

    /// An OpenAPI document could not be turned into tools.
    #[error("failed to convert OpenAPI document {location}: {message}")]
    OpenApiConversion { location: String, message: String },

    /// A reference declared by a tool could not be resolved.
    #[error("resolving {raw_ref:?} from {from_tool_id}: {reason}")]
    ReferenceResolution {
        from_tool_id: String,
        raw_ref: String,
        reason: Box<LoadError>,
    },

    /// The requested sub tool does not exist in the source.
    #[error("tool {requested_sub_tool:?} not found in {location}")]
    EntryNotFound {
        requested_sub_tool: String,
        location: String,
    },

    /// The load was aborted by the caller or timed out.
    #[error("load cancelled: {reason}")]
    Cancelled { reason: String },

    /// A program failed its id invariants.
    #[error("invalid program: {message}")]
    InvalidProgram { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LoadError {
    pub fn source_not_found(location: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceNotFound {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(location: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            location: location.into(),
            line,
            message: message.into(),
        }
    }

    pub fn openapi(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenApiConversion {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Wrap a child failure with the referencing tool for provenance.
    pub fn in_reference(self, from_tool_id: &str, raw_ref: &str) -> Self {
        Self::ReferenceResolution {
            from_tool_id: from_tool_id.to_string(),
            raw_ref: raw_ref.to_string(),
            reason: Box::new(self),
        }
    }

    /// Innermost error of a reference chain.
    pub fn root_cause(&self) -> &LoadError {
        let mut current = self;
        while let Self::ReferenceResolution { reason, .. } = current {
            current = reason;
        }
        current
    }
}
