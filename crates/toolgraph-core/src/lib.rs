//! Toolgraph Core Library
//!
//! Loads tool definitions from files, URLs and inline text, follows the
//! references between them and produces an immutable [`Program`] graph.
//! OpenAPI documents are accepted alongside the native tool syntax, and a
//! resolved program can be assembled into a single self-contained artifact.

pub mod assemble;
pub mod config;
pub mod error;
pub mod monitor;
pub mod openapi;
pub mod parser;
pub mod program;
pub mod resolver;
pub mod source;

pub use error::{LoadError, Result};
pub use program::Program;

/// Re-exports of commonly used types
pub mod prelude {
    // Errors
    pub use crate::error::{LoadError, Result};

    // Configuration
    pub use crate::config::{ConfigStore, LoaderConfig};

    // Program model
    pub use crate::program::{Program, Tool, ToolSet, ToolSource};

    // Loading
    pub use crate::resolver::Resolver;
    pub use crate::source::{DefaultFetcher, Fetcher, Location, Source, ToolRef, split_tool_ref};

    // Artifacts
    pub use crate::assemble::{assemble, assemble_to_path, disassemble};

    // Monitoring
    pub use crate::monitor::{CallContext, Event, EventKind, Monitor, MonitorFactory};
}
