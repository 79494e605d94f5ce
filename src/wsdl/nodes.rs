//! WSDL/XSD element tree
//!
//! Every element of a WSDL or schema document becomes a [`Node`] tagged with
//! a [`NodeKind`]. The grammar is table driven: each kind lists the child
//! names it accepts and has an `add_child` hook that decides whether a closed
//! child stays in the visible tree or is absorbed into the parent's tables.

use crate::error::{ParseError, Result};
use crate::names::{is_primitive, split_qname, TNS_PREFIX};
use crate::wsdl::definitions::{Include, ParsedDefinitions, Schema};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

/// SOAP transports whose bindings are kept
pub const HTTP_TRANSPORTS: &[&str] = &[
    "http://schemas.xmlsoap.org/soap/http",
    "http://www.w3.org/2003/05/soap/bindings/HTTP/",
];

/// Local element names with structural meaning
pub mod wsdl_elements {
    pub const DEFINITIONS: &str = "definitions";
    pub const SCHEMA: &str = "schema";
    pub const TYPES: &str = "types";
    pub const INCLUDE: &str = "include";
    pub const IMPORT: &str = "import";
    pub const BODY: &str = "body";
    pub const OPERATION: &str = "operation";
    pub const BINDING: &str = "binding";
    pub const ADDRESS: &str = "address";
    pub const PART: &str = "part";
    pub const PORT: &str = "port";
    pub const INPUT: &str = "input";
    pub const OUTPUT: &str = "output";
}

/// Kind of a parsed WSDL/XSD element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Types,
    Schema,
    Element,
    Any,
    SimpleType,
    Restriction,
    Extension,
    Choice,
    Enumeration,
    ComplexType,
    ComplexContent,
    SimpleContent,
    Sequence,
    All,
    Service,
    Port,
    Binding,
    PortType,
    Message,
    Operation,
    Input,
    Output,
    Definitions,
    Documentation,
    /// Any element without dedicated behavior (part, address, annotation, ...)
    Generic,
}

use NodeKind as K;

const RESTRICTION_EXTRAS: &[(&str, NodeKind)] = &[
    ("pattern", K::Generic),
    ("length", K::Generic),
    ("minLength", K::Generic),
    ("maxLength", K::Generic),
    ("minInclusive", K::Generic),
    ("maxInclusive", K::Generic),
    ("minExclusive", K::Generic),
    ("maxExclusive", K::Generic),
    ("totalDigits", K::Generic),
    ("fractionDigits", K::Generic),
    ("whiteSpace", K::Generic),
    ("attribute", K::Generic),
];

const ATTRIBUTE_DECLS: &[(&str, NodeKind)] = &[
    ("attribute", K::Generic),
    ("attributeGroup", K::Generic),
    ("anyAttribute", K::Generic),
];

/// Child names accepted by a kind
pub(crate) fn allowed_children(kind: NodeKind) -> &'static [(&'static str, NodeKind)] {
    match kind {
        K::Types => &[("schema", K::Schema), ("documentation", K::Documentation)],
        K::Schema => &[
            ("element", K::Element),
            ("complexType", K::ComplexType),
            ("simpleType", K::SimpleType),
            ("include", K::Generic),
            ("import", K::Generic),
            ("annotation", K::Generic),
        ],
        K::Element => &[
            ("annotation", K::Generic),
            ("complexType", K::ComplexType),
            ("simpleType", K::SimpleType),
        ],
        K::SimpleType => &[("restriction", K::Restriction)],
        K::Restriction => &[
            ("enumeration", K::Enumeration),
            ("all", K::All),
            ("choice", K::Choice),
            ("sequence", K::Sequence),
        ],
        K::Extension => &[("all", K::All), ("sequence", K::Sequence), ("choice", K::Choice)],
        K::Choice | K::Sequence => &[
            ("element", K::Element),
            ("sequence", K::Sequence),
            ("choice", K::Choice),
            ("any", K::Any),
        ],
        K::ComplexType => &[
            ("annotation", K::Generic),
            ("sequence", K::Sequence),
            ("all", K::All),
            ("complexContent", K::ComplexContent),
            ("simpleContent", K::SimpleContent),
            ("choice", K::Choice),
        ],
        K::ComplexContent | K::SimpleContent => {
            &[("extension", K::Extension), ("restriction", K::Restriction)]
        }
        K::All => &[("element", K::Element), ("choice", K::Choice)],
        K::Service => &[("port", K::Port), ("documentation", K::Documentation)],
        K::Port => &[("address", K::Generic), ("documentation", K::Documentation)],
        K::Binding => &[
            ("binding", K::Generic),
            ("SecuritySpec", K::Generic),
            ("operation", K::Operation),
            ("documentation", K::Documentation),
        ],
        K::PortType => &[("operation", K::Operation), ("documentation", K::Documentation)],
        K::Message => &[("part", K::Generic), ("documentation", K::Documentation)],
        K::Operation => &[
            ("documentation", K::Documentation),
            ("input", K::Input),
            ("output", K::Output),
            ("fault", K::Generic),
            ("operation", K::Generic),
        ],
        K::Input | K::Output => &[
            ("body", K::Generic),
            ("SecuritySpecRef", K::Generic),
            ("documentation", K::Documentation),
            ("header", K::Generic),
        ],
        K::Definitions => &[
            ("types", K::Types),
            ("message", K::Message),
            ("portType", K::PortType),
            ("binding", K::Binding),
            ("service", K::Service),
            ("import", K::Generic),
            ("documentation", K::Documentation),
        ],
        K::Generic => &[("fault", K::Generic), ("documentation", K::Documentation)],
        K::Any | K::Enumeration | K::Documentation => &[],
    }
}

/// Extra child names accepted on top of the base table
fn extra_children(kind: NodeKind) -> &'static [(&'static str, NodeKind)] {
    match kind {
        K::Restriction => RESTRICTION_EXTRAS,
        K::ComplexType | K::Extension => ATTRIBUTE_DECLS,
        _ => &[],
    }
}

/// Kind of a child element named `local_name` inside a `parent` element
pub fn child_kind(parent: NodeKind, local_name: &str) -> Option<NodeKind> {
    allowed_children(parent)
        .iter()
        .chain(extra_children(parent))
        .find(|(name, _)| *name == local_name)
        .map(|(_, kind)| *kind)
}

/// SOAP `body` settings of a binding input or output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoapBody {
    /// `literal` or `encoded`
    pub use_: Option<String>,
    /// Encoding style URI, kept only for encoded use
    pub encoding_style: Option<String>,
}

/// Data absorbed from children while parsing
#[derive(Debug, Clone, Default)]
pub enum NodeData {
    #[default]
    None,
    /// Type, element and include tables of a schema
    Schema(Schema),
    /// Schemas of a `types` block keyed by target namespace
    Types(IndexMap<String, Schema>),
    /// Tables of the root element
    Definitions(Box<ParsedDefinitions>),
    /// `soap:operation` settings; `None` when the operation had no such child
    Operation {
        soap_action: Option<String>,
        style: Option<String>,
    },
    /// `soap:body` settings of an input or output
    Body(SoapBody),
    /// `soap:binding` settings
    Binding {
        transport: Option<String>,
        style: Option<String>,
    },
    /// `soap:address` location of a port
    Port { location: Option<String> },
}

/// A parsed WSDL/XSD element
#[derive(Debug, Clone)]
pub struct Node {
    /// Element kind
    pub kind: NodeKind,
    /// Name as written, including the prefix
    pub qualified_name: String,
    /// Prefix, or [`TNS_PREFIX`] when unprefixed
    pub prefix: String,
    /// Local name
    pub local_name: String,
    /// Attributes other than namespace declarations and `value`
    pub attributes: IndexMap<String, String>,
    /// The `value` attribute (enumerations)
    pub value: Option<String>,
    /// Namespace declarations made on this element; `targetNamespace`
    /// is recorded under [`TNS_PREFIX`]
    pub xmlns: IndexMap<String, String>,
    /// Children that stayed in the visible tree
    pub children: Vec<Node>,
    /// Target namespace of the enclosing schema
    pub target_namespace: Option<String>,
    /// Whether the element is a direct child of a schema
    pub is_global: bool,
    /// Tables absorbed from children
    pub data: NodeData,
}

impl Node {
    /// Build a node from a start tag
    pub fn new(kind: NodeKind, qualified_name: &str, attrs: &IndexMap<String, String>) -> Self {
        let split = split_qname(qualified_name);
        let mut attributes = IndexMap::new();
        let mut xmlns = IndexMap::new();
        let mut value = None;

        for (key, val) in attrs {
            if key == "xmlns" {
                xmlns.insert(TNS_PREFIX.to_string(), val.clone());
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                let prefix = if prefix.is_empty() { TNS_PREFIX } else { prefix };
                xmlns.insert(prefix.to_string(), val.clone());
            } else if key == "value" {
                value = Some(val.clone());
            } else {
                attributes.insert(key.clone(), val.clone());
            }
        }
        if let Some(tns) = attributes.get("targetNamespace") {
            xmlns.insert(TNS_PREFIX.to_string(), tns.clone());
        }

        let data = match kind {
            K::Schema => NodeData::Schema(Schema::default()),
            K::Types => NodeData::Types(IndexMap::new()),
            K::Definitions => NodeData::Definitions(Box::default()),
            K::Operation => NodeData::Operation {
                soap_action: None,
                style: None,
            },
            K::Input | K::Output => NodeData::Body(SoapBody::default()),
            K::Binding => NodeData::Binding {
                transport: None,
                style: None,
            },
            K::Port => NodeData::Port { location: None },
            _ => NodeData::None,
        };

        Self {
            kind,
            qualified_name: qualified_name.to_string(),
            prefix: split.prefix.to_string(),
            local_name: split.name.to_string(),
            attributes,
            value,
            xmlns,
            children: Vec::new(),
            target_namespace: None,
            is_global: false,
            data,
        }
    }

    /// Attribute value
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    /// The `name` attribute
    pub fn name(&self) -> Option<&str> {
        self.attr("name")
    }

    /// The `type` attribute
    pub fn type_name(&self) -> Option<&str> {
        self.attr("type")
    }

    /// The `ref` attribute
    pub fn ref_name(&self) -> Option<&str> {
        self.attr("ref")
    }

    /// Whether `maxOccurs` allows more than one occurrence
    pub fn is_many(&self) -> bool {
        match self.attr("maxOccurs") {
            None => false,
            Some("unbounded") => true,
            Some(max) => max.trim().parse::<f64>().map(|n| n > 1.0).unwrap_or(false),
        }
    }

    /// Whether the element repeats on the wire and is described with a `[]` suffix
    pub fn is_array(&self) -> bool {
        self.is_many() && self.attr("minOccurs") != self.attr("maxOccurs")
    }

    /// Children of a given kind
    pub fn children_of(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    /// First child of any of the given kinds
    pub fn first_child_of(&self, kinds: &[NodeKind]) -> Option<&Node> {
        self.children.iter().find(|c| kinds.contains(&c.kind))
    }

    /// Merge `other` namespace declarations, keeping existing prefixes
    pub fn merge_xmlns(&mut self, other: &IndexMap<String, String>) {
        for (prefix, uri) in other {
            self.xmlns
                .entry(prefix.clone())
                .or_insert_with(|| uri.clone());
        }
    }

    /// Move the schema tables out of a closed schema node
    pub fn into_schema(self) -> Schema {
        let mut schema = match self.data {
            NodeData::Schema(schema) => schema,
            _ => Schema::default(),
        };
        schema.target_namespace = self.attributes.get("targetNamespace").cloned();
        schema.element_form_default = self.attributes.get("elementFormDefault").cloned();
        schema.xmlns = self.xmlns;
        schema
    }

    /// Hand a closed child to this node.
    ///
    /// Depending on the parent kind the child is indexed into a table,
    /// folded into settings, dropped, or kept as a visible child.
    pub fn add_child(&mut self, child: Node) -> Result<()> {
        match self.kind {
            K::Schema => {
                self.add_schema_child(child);
                Ok(())
            }
            K::Types => self.add_types_child(child),
            K::Input | K::Output => {
                if child.local_name == wsdl_elements::BODY {
                    if let NodeData::Body(body) = &mut self.data {
                        body.use_ = child.attr("use").map(String::from);
                        if body.use_.as_deref() == Some("encoded") {
                            body.encoding_style = child.attr("encodingStyle").map(String::from);
                        }
                    }
                } else {
                    self.children.push(child);
                }
                Ok(())
            }
            K::Operation => {
                if child.local_name == wsdl_elements::OPERATION {
                    self.data = NodeData::Operation {
                        soap_action: Some(child.attr("soapAction").unwrap_or("").to_string()),
                        style: child.attr("style").map(String::from),
                    };
                } else {
                    self.children.push(child);
                }
                Ok(())
            }
            K::Binding => {
                if child.local_name == wsdl_elements::BINDING {
                    self.data = NodeData::Binding {
                        transport: child.attr("transport").map(String::from),
                        style: child.attr("style").map(String::from),
                    };
                } else {
                    self.children.push(child);
                }
                Ok(())
            }
            K::Port => {
                if child.local_name == wsdl_elements::ADDRESS {
                    if let Some(location) = child.attr("location") {
                        self.data = NodeData::Port {
                            location: Some(location.to_string()),
                        };
                    }
                }
                self.children.push(child);
                Ok(())
            }
            K::Definitions => {
                self.add_definitions_child(child);
                Ok(())
            }
            _ => {
                self.children.push(child);
                Ok(())
            }
        }
    }

    fn add_schema_child(&mut self, child: Node) {
        if child.name().map(is_primitive).unwrap_or(false) {
            return;
        }
        let tns = self.attributes.get("targetNamespace").cloned();
        let schema = match &mut self.data {
            NodeData::Schema(schema) => schema,
            _ => return,
        };
        let local = child.local_name.as_str();
        if local == wsdl_elements::INCLUDE || local == wsdl_elements::IMPORT {
            let location = child.attr("schemaLocation").or_else(|| child.attr("location"));
            if let Some(location) = location {
                schema.includes.push(Include {
                    namespace: child
                        .attr("namespace")
                        .or_else(|| child.attr("targetNamespace"))
                        .map(String::from)
                        .or(tns),
                    location: location.to_string(),
                });
            }
        } else if child.kind == K::ComplexType {
            if let Some(name) = child.name().map(String::from) {
                schema.complex_types.insert(name, Arc::new(child));
            }
        } else if child.kind == K::Element {
            if let Some(name) = child.name().map(String::from) {
                schema.elements.insert(name, Arc::new(child));
            }
        } else if let Some(name) = child.name().map(String::from) {
            schema.types.insert(name, Arc::new(child));
        }
    }

    fn add_types_child(&mut self, child: Node) -> Result<()> {
        if child.kind != K::Schema {
            self.children.push(child);
            return Ok(());
        }
        let schema = child.into_schema();
        let key = schema.target_namespace.clone().unwrap_or_default();
        if let NodeData::Types(schemas) = &mut self.data {
            if schemas.contains_key(&key) {
                return Err(ParseError::new(format!(
                    "Target-Namespace \"{}\" already in use by another Schema!",
                    key
                ))
                .with_element("schema")
                .with_container("types")
                .into());
            }
            schemas.insert(key, schema);
        }
        Ok(())
    }

    fn add_definitions_child(&mut self, child: Node) {
        let defs = match &mut self.data {
            NodeData::Definitions(defs) => defs,
            _ => return,
        };
        match child.kind {
            K::Types => {
                if let NodeData::Types(schemas) = child.data {
                    for (ns, schema) in schemas {
                        defs.add_schema(ns, schema);
                    }
                }
            }
            K::Message => {
                if let Some(name) = child.name().map(String::from) {
                    defs.messages.insert(name, Arc::new(child));
                }
            }
            K::PortType => {
                if let Some(name) = child.name().map(String::from) {
                    defs.port_types.insert(name, Arc::new(child));
                }
            }
            K::Binding => {
                let transport = match &child.data {
                    NodeData::Binding { transport, .. } => transport.clone(),
                    _ => None,
                };
                let name = child.name().unwrap_or_default().to_string();
                match transport {
                    Some(t) if HTTP_TRANSPORTS.contains(&t.as_str()) => {
                        defs.bindings.insert(name, Arc::new(child));
                    }
                    other => {
                        debug!(
                            "Dropping binding {} with non-HTTP transport {:?}",
                            name, other
                        );
                    }
                }
            }
            K::Service => {
                if let Some(name) = child.name().map(String::from) {
                    defs.services.insert(name, Arc::new(child));
                }
            }
            _ if child.local_name == wsdl_elements::IMPORT => {
                let namespace = child.attr("namespace").unwrap_or_default().to_string();
                let location = child.attr("location").or_else(|| child.attr("schemaLocation"));
                if let Some(location) = location {
                    let schema = defs.schemas.entry(namespace.clone()).or_insert_with(|| {
                        Schema {
                            target_namespace: Some(namespace.clone()),
                            ..Schema::default()
                        }
                    });
                    schema.includes.push(Include {
                        namespace: Some(namespace),
                        location: location.to_string(),
                    });
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_node_namespaces_and_value() {
        let node = Node::new(
            K::Schema,
            "xs:schema",
            &attrs(&[
                ("xmlns:xs", "http://www.w3.org/2001/XMLSchema"),
                ("xmlns", "urn:default"),
                ("targetNamespace", "urn:tns"),
                ("value", "v"),
            ]),
        );
        assert_eq!(node.prefix, "xs");
        assert_eq!(node.local_name, "schema");
        assert_eq!(node.xmlns.get(TNS_PREFIX).map(String::as_str), Some("urn:tns"));
        assert_eq!(node.xmlns.get("xs").map(String::as_str), Some("http://www.w3.org/2001/XMLSchema"));
        assert_eq!(node.value.as_deref(), Some("v"));
        assert!(node.attr("value").is_none());
    }

    #[test]
    fn test_grammar_table() {
        assert_eq!(child_kind(K::Schema, "complexType"), Some(K::ComplexType));
        assert_eq!(child_kind(K::Sequence, "any"), Some(K::Any));
        assert_eq!(child_kind(K::Restriction, "pattern"), Some(K::Generic));
        assert_eq!(child_kind(K::Operation, "operation"), Some(K::Generic));
        assert_eq!(child_kind(K::Generic, "fault"), Some(K::Generic));
        assert_eq!(child_kind(K::Sequence, "attribute"), None);
        assert_eq!(child_kind(K::Any, "element"), None);
    }

    #[test]
    fn test_occurs() {
        let many = Node::new(K::Element, "element", &attrs(&[("maxOccurs", "unbounded")]));
        assert!(many.is_array());
        let fixed = Node::new(
            K::Element,
            "element",
            &attrs(&[("minOccurs", "2"), ("maxOccurs", "2")]),
        );
        assert!(fixed.is_many());
        assert!(!fixed.is_array());
        let single = Node::new(K::Element, "element", &attrs(&[("maxOccurs", "1")]));
        assert!(!single.is_many());
    }

    #[test]
    fn test_schema_absorbs_children() {
        let mut schema = Node::new(K::Schema, "schema", &attrs(&[("targetNamespace", "urn:a")]));
        schema
            .add_child(Node::new(K::ComplexType, "complexType", &attrs(&[("name", "Person")])))
            .unwrap();
        schema
            .add_child(Node::new(K::Element, "element", &attrs(&[("name", "person")])))
            .unwrap();
        schema
            .add_child(Node::new(K::SimpleType, "simpleType", &attrs(&[("name", "string")])))
            .unwrap();
        schema
            .add_child(Node::new(K::Generic, "import", &attrs(&[("schemaLocation", "b.xsd")])))
            .unwrap();
        assert!(schema.children.is_empty());

        let schema = schema.into_schema();
        assert!(schema.complex_types.contains_key("Person"));
        assert!(schema.elements.contains_key("person"));
        assert!(schema.types.is_empty());
        assert_eq!(schema.includes.len(), 1);
        assert_eq!(schema.includes[0].namespace.as_deref(), Some("urn:a"));
    }

    #[test]
    fn test_duplicate_schema_namespace() {
        let mut types = Node::new(K::Types, "types", &IndexMap::new());
        let schema = || Node::new(K::Schema, "schema", &attrs(&[("targetNamespace", "urn:x")]));
        types.add_child(schema()).unwrap();
        let err = types.add_child(schema()).unwrap_err();
        assert!(err
            .to_string()
            .contains("Target-Namespace \"urn:x\" already in use by another Schema!"));
    }

    #[test]
    fn test_binding_settings_and_transport_filter() {
        let mut defs = Node::new(K::Definitions, "definitions", &IndexMap::new());
        let mut binding = Node::new(K::Binding, "binding", &attrs(&[("name", "B")]));
        binding
            .add_child(Node::new(
                K::Generic,
                "soap:binding",
                &attrs(&[("transport", "http://schemas.xmlsoap.org/soap/http"), ("style", "rpc")]),
            ))
            .unwrap();
        defs.add_child(binding).unwrap();

        let mut smtp = Node::new(K::Binding, "binding", &attrs(&[("name", "Mail")]));
        smtp.add_child(Node::new(
            K::Generic,
            "soap:binding",
            &attrs(&[("transport", "http://example.com/smtp")]),
        ))
        .unwrap();
        defs.add_child(smtp).unwrap();

        match defs.data {
            NodeData::Definitions(d) => {
                assert!(d.bindings.contains_key("B"));
                assert!(!d.bindings.contains_key("Mail"));
            }
            _ => panic!("expected definitions data"),
        }
    }
}
