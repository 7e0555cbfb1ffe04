//! Source location types.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use url::Url;

use crate::error::{LoadError, Result};

use super::fetcher::normalize_view_url;

/// A canonical source location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// Absolute, lexically normalized filesystem path
    Local(PathBuf),
    /// Fully-qualified http(s) URL
    Remote(Url),
}

impl Location {
    /// Parse an already-absolute location, or `None` if `raw` is relative.
    pub fn parse_absolute(raw: &str) -> Option<Self> {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Url::parse(raw).ok().map(Self::from_url);
        }

        if let Some(rest) = raw.strip_prefix("~/") {
            let home = dirs::home_dir()?;
            return Some(Self::Local(normalize_path(&home.join(rest))));
        }

        let path = Path::new(raw);
        if path.is_absolute() {
            return Some(Self::Local(normalize_path(path)));
        }

        None
    }

    /// Resolve `reference` against a working directory.
    ///
    /// Handles:
    /// - `https://host/path` -> Remote (view URLs rewritten to raw content)
    /// - `/absolute/path` or `~/path` -> Local
    /// - relative -> joined onto `base`, or `default_dir` when no base is given
    pub fn resolve(reference: &str, base: Option<&str>, default_dir: &Path) -> Result<Self> {
        if let Some(location) = Self::parse_absolute(reference) {
            return Ok(location);
        }

        let base = match base {
            Some(base) => Self::parse_absolute(base).ok_or_else(|| {
                LoadError::source_not_found(
                    reference,
                    format!("working directory {} is not absolute", base),
                )
            })?,
            None => Self::Local(normalize_path(default_dir)),
        };

        match base {
            Self::Local(dir) => Ok(Self::Local(normalize_path(&dir.join(reference)))),
            Self::Remote(dir) => {
                let mut dir = dir;
                if !dir.path().ends_with('/') {
                    let path = format!("{}/", dir.path());
                    dir.set_path(&path);
                }
                let joined = dir
                    .join(reference)
                    .map_err(|e| LoadError::source_not_found(reference, e))?;
                Ok(Self::from_url(joined))
            }
        }
    }

    fn from_url(url: Url) -> Self {
        Self::Remote(normalize_view_url(url))
    }

    /// Directory used to resolve references found inside this source.
    pub fn working_dir(&self) -> String {
        match self {
            Self::Local(path) => path
                .parent()
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned(),
            Self::Remote(url) => {
                let mut dir = url.clone();
                let path = url.path();
                let parent = match path.rfind('/') {
                    Some(0) | None => "/",
                    Some(idx) => &path[..idx],
                };
                dir.set_path(parent);
                dir.set_query(None);
                dir.set_fragment(None);
                dir.to_string()
            }
        }
    }

    /// Get the path if this is a local source.
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Local(path) => Some(path),
            Self::Remote(_) => None,
        }
    }

    /// Get the URL if this is a remote source.
    pub fn as_url(&self) -> Option<&Url> {
        match self {
            Self::Remote(url) => Some(url),
            Self::Local(_) => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Raw content plus the canonical location it came from.
#[derive(Debug, Clone)]
pub struct Source {
    pub location: Location,
    pub content: Vec<u8>,
    /// Line number of the first content line
    pub line_anchor: usize,
}

impl Source {
    pub fn new(location: Location, content: impl Into<Vec<u8>>) -> Self {
        Self {
            location,
            content: content.into(),
            line_anchor: 1,
        }
    }

    /// Inline text placed at a synthetic location.
    pub fn inline(location: Location, text: &str) -> Self {
        Self::new(location, text.as_bytes().to_vec())
    }

    pub fn working_dir(&self) -> String {
        self.location.working_dir()
    }

    pub fn content_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.content)
            .map_err(|e| LoadError::parse(self.location.to_string(), self.line_anchor, e.to_string()))
    }
}

/// Remove `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other),
        }
    }
    out
}
