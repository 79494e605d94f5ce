//! WSDL/XSD document parser
//!
//! Builds the [`Node`] tree from tokenizer events with an explicit stack.
//! Closed children are handed to their parent's `add_child` hook, so by the
//! time the root closes every schema, message, port type, binding and service
//! has been indexed into [`ParsedDefinitions`].

use crate::error::{Error, ParseError, Result};
use crate::limits::Limits;
use crate::names::split_qname;
use crate::tokenizer::{tokenize_str, XmlHandler};
use crate::wsdl::definitions::ParsedDefinitions;
use crate::wsdl::nodes::{child_kind, wsdl_elements, Node, NodeData, NodeKind};
use indexmap::IndexMap;

/// Parse a WSDL document, or a bare XSD document, into definition tables
pub fn parse_definitions(xml: &str, strict: bool, limits: &Limits) -> Result<ParsedDefinitions> {
    let mut builder = TreeBuilder::new(strict);
    tokenize_str(xml, &mut builder, limits)?;
    builder.finish()
}

struct TreeBuilder {
    strict: bool,
    stack: Vec<Node>,
    /// Root was a bare `schema`
    schema_root: bool,
}

impl TreeBuilder {
    fn new(strict: bool) -> Self {
        Self {
            strict,
            stack: Vec::new(),
            schema_root: false,
        }
    }

    fn open_root(&mut self, name: &str, attrs: &IndexMap<String, String>) -> Result<()> {
        let local = split_qname(name).name;
        let mut root = if local == wsdl_elements::DEFINITIONS {
            Node::new(NodeKind::Definitions, name, attrs)
        } else if local == wsdl_elements::SCHEMA {
            self.schema_root = true;
            Node::new(NodeKind::Schema, name, attrs)
        } else {
            return Err(ParseError::new("Unexpected root element of WSDL or include")
                .with_element(name)
                .into());
        };
        root.target_namespace = root.attr("targetNamespace").map(String::from);
        self.stack.push(root);
        Ok(())
    }

    fn finish(mut self) -> Result<ParsedDefinitions> {
        if self.stack.len() != 1 {
            return Err(ParseError::new("Unexpected root element of WSDL or include").into());
        }
        let root = self.stack.remove(0);

        if self.schema_root {
            let schema = root.into_schema();
            let mut defs = ParsedDefinitions::default();
            defs.add_schema(schema.target_namespace.clone().unwrap_or_default(), schema);
            return Ok(defs);
        }

        let name = root.name().map(String::from);
        let target_namespace = root.attr("targetNamespace").map(String::from);
        let xmlns = root.xmlns;
        match root.data {
            NodeData::Definitions(defs) => {
                let mut defs = *defs;
                defs.name = name;
                defs.target_namespace = target_namespace;
                defs.xmlns = xmlns;
                Ok(defs)
            }
            _ => Err(Error::Other("definitions root lost its tables".to_string())),
        }
    }
}

impl XmlHandler for TreeBuilder {
    fn open_tag(&mut self, name: &str, attrs: &IndexMap<String, String>) -> Result<()> {
        let top = match self.stack.last() {
            Some(top) => top,
            None => return self.open_root(name, attrs),
        };

        let local = split_qname(name).name;
        let kind = match child_kind(top.kind, local) {
            Some(kind) => kind,
            None if self.strict => {
                return Err(ParseError::unexpected(name, top.qualified_name.clone()).into())
            }
            None => NodeKind::Generic,
        };

        let mut node = Node::new(kind, name, attrs);
        node.target_namespace = if kind == NodeKind::Schema {
            node.attr("targetNamespace").map(String::from)
        } else {
            top.target_namespace.clone()
        };
        node.is_global = top.kind == NodeKind::Schema;
        self.stack.push(node);
        Ok(())
    }

    fn close_tag(&mut self, name: &str) -> Result<()> {
        let matches_top = self
            .stack
            .last()
            .map(|top| top.qualified_name == name)
            .unwrap_or(false);
        if !matches_top || self.stack.len() < 2 {
            return Ok(());
        }
        let child = match self.stack.pop() {
            Some(child) => child,
            None => return Ok(()),
        };
        self.stack[0].merge_xmlns(&child.xmlns);
        match self.stack.last_mut() {
            Some(parent) => parent.add_child(child),
            None => Ok(()),
        }
    }

    fn text(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }
}
