//! Resource ceilings applied while loading WSDL documents and decoding messages
//!
//! A [`Limits`] value travels with the [`Loader`](crate::loaders::Loader) and the
//! tokenizer. Every check reports a [`Error::LimitExceeded`] naming the ceiling
//! that was hit, so a hostile endpoint cannot exhaust memory with a huge
//! response, a deeply nested body or an endless chain of schema imports.

use crate::error::{Error, Result};

const MIB: usize = 1024 * 1024;

/// Ceilings for document size, element nesting and import chains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Deepest element nesting accepted in a WSDL, XSD or SOAP message
    pub max_xml_depth: usize,

    /// Largest document, in bytes, that is read into memory
    pub max_xml_size: usize,

    /// Longest chain of `xs:import`/`xs:include` hops from the root WSDL
    pub max_include_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_xml_depth: 512,
            max_xml_size: 64 * MIB,
            max_include_depth: 64,
        }
    }
}

impl Limits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tight ceilings for endpoints that talk to untrusted peers
    pub fn strict() -> Self {
        Self {
            max_xml_depth: 128,
            max_xml_size: 4 * MIB,
            max_include_depth: 16,
        }
    }

    /// Loose ceilings for large vendor WSDLs split over many schema files
    pub fn permissive() -> Self {
        Self {
            max_xml_depth: 8192,
            max_xml_size: 512 * MIB,
            max_include_depth: 1024,
        }
    }

    pub fn with_max_xml_depth(mut self, depth: usize) -> Self {
        self.max_xml_depth = depth;
        self
    }

    pub fn with_max_xml_size(mut self, bytes: usize) -> Self {
        self.max_xml_size = bytes;
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    /// Element nesting reached `depth`
    pub fn check_xml_depth(&self, depth: usize) -> Result<()> {
        ceiling("element nesting", depth, self.max_xml_depth, "")
    }

    /// A document of `size` bytes is about to be parsed
    pub fn check_xml_size(&self, size: usize) -> Result<()> {
        ceiling("document size", size, self.max_xml_size, " bytes")
    }

    /// An import/include was found `depth` hops below the root WSDL
    pub fn check_include_depth(&self, depth: usize) -> Result<()> {
        ceiling("schema import chain", depth, self.max_include_depth, "")
    }
}

fn ceiling(what: &str, value: usize, max: usize, unit: &str) -> Result<()> {
    if value <= max {
        return Ok(());
    }
    Err(Error::LimitExceeded(format!(
        "{} of {}{} is over the limit of {}{}",
        what, value, unit, max, unit
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ceilings() {
        let limits = Limits::new();
        assert!(limits.check_xml_depth(512).is_ok());
        assert!(limits.check_xml_depth(513).is_err());
        assert!(limits.check_include_depth(64).is_ok());
    }

    #[test]
    fn test_strict_is_tighter_than_default() {
        let strict = Limits::strict();
        let default = Limits::default();
        assert!(strict.max_xml_depth < default.max_xml_depth);
        assert!(strict.max_xml_size < default.max_xml_size);
        assert!(strict.check_xml_size(5 * MIB).is_err());
        assert!(strict.check_include_depth(17).is_err());
    }

    #[test]
    fn test_permissive_accepts_large_vendor_wsdl() {
        let limits = Limits::permissive();
        assert!(limits.check_include_depth(500).is_ok());
        assert!(limits.check_xml_size(100 * MIB).is_ok());
    }

    #[test]
    fn test_limit_message_names_ceiling() {
        let limits = Limits::new().with_max_xml_size(10);
        let err = limits.check_xml_size(11).unwrap_err();
        assert_eq!(
            err.to_string(),
            "limit exceeded: document size of 11 bytes is over the limit of 10 bytes"
        );
    }
}
