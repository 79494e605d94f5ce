//! XML namespace handling
//!
//! This module provides the scoped namespace context that the serializer
//! threads through a whole rendering pass. Every nested element pushes a
//! scope and pops it on exit; prefixes minted for namespaces that have no
//! binding yet are numbered `ns1`, `ns2`, ... per context.

use indexmap::IndexMap;

/// XML namespace
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

#[derive(Debug, Clone)]
struct Mapping {
    uri: String,
    declared: bool,
}

#[derive(Debug, Clone, Default)]
struct Scope {
    namespaces: IndexMap<String, Mapping>,
}

/// Scoped prefix bindings for a single serialization pass
#[derive(Debug, Clone)]
pub struct NamespaceContext {
    scopes: Vec<Scope>,
    prefix_count: usize,
}

impl NamespaceContext {
    /// Create a context with one root scope
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
            prefix_count: 0,
        }
    }

    /// Enter a nested element
    pub fn push_context(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Leave the current element
    pub fn pop_context(&mut self) {
        self.scopes.pop();
    }

    /// Number of open scopes
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    fn builtin(prefix: &str) -> Option<&'static str> {
        match prefix {
            "xml" => Some(XML_NAMESPACE),
            "xmlns" => Some(XMLNS_NAMESPACE),
            _ => None,
        }
    }

    fn mapping(&self, prefix: &str) -> Option<&Mapping> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.namespaces.get(prefix))
    }

    /// Namespace bound to `prefix`, searching outward unless `local_only`
    pub fn get_namespace_uri(&self, prefix: &str, local_only: bool) -> Option<&str> {
        if let Some(uri) = Self::builtin(prefix) {
            return Some(uri);
        }
        if local_only {
            return self
                .scopes
                .last()
                .and_then(|scope| scope.namespaces.get(prefix))
                .map(|m| m.uri.as_str());
        }
        self.mapping(prefix).map(|m| m.uri.as_str())
    }

    /// First prefix bound to `uri`, innermost scope first
    pub fn get_prefix(&self, uri: &str, local_only: bool) -> Option<&str> {
        match uri {
            XML_NAMESPACE => return Some("xml"),
            XMLNS_NAMESPACE => return Some("xmlns"),
            _ => {}
        }
        let scopes: &[Scope] = if local_only {
            let n = self.scopes.len();
            &self.scopes[n.saturating_sub(1)..]
        } else {
            &self.scopes
        };
        scopes.iter().rev().find_map(|scope| {
            scope
                .namespaces
                .iter()
                .find(|(_, m)| m.uri == uri)
                .map(|(p, _)| p.as_str())
        })
    }

    /// Bind a prefix without marking it declared; returns false when the
    /// binding is already visible
    pub fn add_namespace(&mut self, prefix: &str, uri: &str, local_only: bool) -> bool {
        if self.get_namespace_uri(prefix, local_only) == Some(uri) {
            return false;
        }
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.namespaces.insert(
                    prefix.to_string(),
                    Mapping {
                        uri: uri.to_string(),
                        declared: false,
                    },
                );
                true
            }
            None => false,
        }
    }

    /// Reuse the prefix bound to `uri`, or mint a fresh `nsN` prefix for it
    pub fn register_namespace(&mut self, uri: &str) -> String {
        if let Some(prefix) = self.get_prefix(uri, false).filter(|p| !p.is_empty()) {
            return prefix.to_string();
        }
        let prefix = loop {
            self.prefix_count += 1;
            let candidate = format!("ns{}", self.prefix_count);
            if self.get_namespace_uri(&candidate, false).is_none() {
                break candidate;
            }
        };
        self.add_namespace(&prefix, uri, true);
        prefix
    }

    /// Declare `prefix` in the current scope; returns true when an `xmlns:`
    /// attribute has to be written for it
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) -> bool {
        if let Some(m) = self.mapping(prefix) {
            if m.uri == uri && m.declared {
                return false;
            }
        }
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.namespaces.insert(
                    prefix.to_string(),
                    Mapping {
                        uri: uri.to_string(),
                        declared: true,
                    },
                );
                true
            }
            None => false,
        }
    }
}

impl Default for NamespaceContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_mints_sequential_prefixes() {
        let mut ctx = NamespaceContext::new();
        assert_eq!(ctx.register_namespace("urn:a"), "ns1");
        assert_eq!(ctx.register_namespace("urn:b"), "ns2");
        assert_eq!(ctx.register_namespace("urn:a"), "ns1");
    }

    #[test]
    fn test_register_skips_taken_prefix() {
        let mut ctx = NamespaceContext::new();
        ctx.declare_namespace("ns1", "urn:taken");
        assert_eq!(ctx.register_namespace("urn:new"), "ns2");
    }

    #[test]
    fn test_declare_once_per_visible_scope() {
        let mut ctx = NamespaceContext::new();
        assert!(ctx.declare_namespace("a", "urn:a"));
        ctx.push_context();
        assert!(!ctx.declare_namespace("a", "urn:a"));
        assert!(ctx.declare_namespace("a", "urn:other"));
        ctx.pop_context();
        assert_eq!(ctx.get_namespace_uri("a", false), Some("urn:a"));
    }

    #[test]
    fn test_added_namespace_is_not_declared() {
        let mut ctx = NamespaceContext::new();
        assert!(ctx.add_namespace("t", "urn:t", false));
        assert!(!ctx.add_namespace("t", "urn:t", false));
        assert!(ctx.declare_namespace("t", "urn:t"));
    }

    #[test]
    fn test_scopes_pop() {
        let mut ctx = NamespaceContext::new();
        ctx.push_context();
        ctx.declare_namespace("x", "urn:x");
        assert_eq!(ctx.get_prefix("urn:x", false), Some("x"));
        ctx.pop_context();
        assert_eq!(ctx.get_prefix("urn:x", false), None);
        assert_eq!(ctx.get_namespace_uri("xml", false), Some(XML_NAMESPACE));
    }
}
