//! Source location, reference grammar and fetching.
//!
//! This module turns reference strings into canonical locations and
//! reads their content. It handles:
//! - Local files (absolute, relative to a working directory, `~/`)
//! - Remote http(s) URLs, with GitHub blob URLs rewritten to raw content
//! - Inline text placed at a synthetic location

mod fetcher;
mod reference;
mod spec;

pub use fetcher::{DefaultFetcher, Fetcher, normalize_view_url};
pub use reference::{ToolRef, split_tool_ref};
pub use spec::{Location, Source, normalize_path};
