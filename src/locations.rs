//! Resource location resolution
//!
//! This module handles resolution of WSDL and schema locations. Include and
//! import locations are resolved against the document that references them:
//! file paths join onto the including file's directory, remote documents use
//! URL joining.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Resource location - a file path or an http(s) URL
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// URL (http or https)
    Url(Url),
}

fn is_http(s: &str) -> bool {
    let lower = s.trim_start().to_ascii_lowercase();
    lower.starts_with("http:") || lower.starts_with("https:")
}

fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl Location {
    /// Parse a location string; http(s) strings become URLs, anything else a path
    pub fn parse(s: &str) -> Result<Self> {
        if is_http(s) {
            return Ok(Location::Url(Url::parse(s.trim())?));
        }
        if let Ok(url) = Url::parse(s) {
            if url.scheme() == "file" {
                let path = url
                    .to_file_path()
                    .map_err(|_| Error::Resource(format!("Invalid file URL: {}", s)))?;
                return Ok(Location::Path(path));
            }
        }
        Ok(Location::Path(PathBuf::from(s)))
    }

    /// Resolve `relative` against this location.
    ///
    /// Absolute http(s) references are taken as they are. A remote base joins
    /// any reference as a URL; a file base joins onto its parent directory.
    pub fn resolve(&self, relative: &str) -> Result<Location> {
        if is_http(relative) {
            return Location::parse(relative);
        }
        match self {
            Location::Url(base) => Ok(Location::Url(base.join(relative)?)),
            Location::Path(base) => {
                let dir = base.parent().unwrap_or_else(|| Path::new(""));
                Ok(Location::Path(normalize_path(&dir.join(relative))))
            }
        }
    }

    /// Get the location as a string
    pub fn as_str(&self) -> String {
        match self {
            Location::Path(p) => p.to_string_lossy().to_string(),
            Location::Url(u) => u.to_string(),
        }
    }

    /// Check if this is a remote location (URL)
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(_))
    }

    /// Check if this is a local file
    pub fn is_file(&self) -> bool {
        matches!(self, Location::Path(_))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}
