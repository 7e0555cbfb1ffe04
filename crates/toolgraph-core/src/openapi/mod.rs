//! OpenAPI v2/v3 support.
//!
//! Documents are detected by [`sniff`] and converted into the same
//! [`ParsedSource`](crate::parser::ParsedSource) shape the native parser
//! produces.

mod adapter;
mod document;
mod sniff;

pub use adapter::{OPENAPI_DIRECTIVE, OPENAPI_INDEX_DIRECTIVE, convert};
pub use sniff::{OpenApiVersion, SourceFormat, detect_format, is_openapi, sniff};
