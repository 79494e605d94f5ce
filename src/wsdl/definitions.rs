//! Parsed and resolved definition tables
//!
//! [`ParsedDefinitions`] is what the parser produces for one document: name
//! indexed tables of raw nodes. The resolver turns the merged tables into
//! [`Definitions`], where messages, operations, bindings and services point at
//! each other and every schema type has a precomputed [`Shape`].

use crate::names::TNS_PREFIX;
use crate::wsdl::describe::{DescriptionRegistry, Shape};
use crate::wsdl::nodes::{Node, SoapBody};
use indexmap::IndexMap;
use std::sync::Arc;

/// A schema include or import awaiting resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    /// Namespace the included document contributes to
    pub namespace: Option<String>,
    /// Location, relative to the including document
    pub location: String,
}

/// Type, element and include tables of one target namespace
#[derive(Debug, Clone, Default)]
pub struct Schema {
    /// Target namespace
    pub target_namespace: Option<String>,
    /// `elementFormDefault` attribute
    pub element_form_default: Option<String>,
    /// Namespace declarations visible in the schema document
    pub xmlns: IndexMap<String, String>,
    /// Named complex types
    pub complex_types: IndexMap<String, Arc<Node>>,
    /// Named simple types and other named declarations
    pub types: IndexMap<String, Arc<Node>>,
    /// Global elements
    pub elements: IndexMap<String, Arc<Node>>,
    /// Pending includes and imports
    pub includes: Vec<Include>,
}

impl Schema {
    /// Whether local elements are namespace qualified by default
    pub fn is_qualified(&self) -> bool {
        self.element_form_default.as_deref() == Some("qualified")
    }

    /// Look up a complex type, then a simple type, then an element
    pub fn find(&self, name: &str) -> Option<&Arc<Node>> {
        self.complex_types
            .get(name)
            .or_else(|| self.types.get(name))
            .or_else(|| self.elements.get(name))
    }

    /// Fold another schema of the same namespace into this one.
    /// Tables and namespace declarations of `other` overwrite; includes concatenate.
    pub fn merge(&mut self, other: &Schema) {
        for (k, v) in &other.complex_types {
            self.complex_types.insert(k.clone(), v.clone());
        }
        for (k, v) in &other.types {
            self.types.insert(k.clone(), v.clone());
        }
        for (k, v) in &other.elements {
            self.elements.insert(k.clone(), v.clone());
        }
        for (k, v) in &other.xmlns {
            self.xmlns.insert(k.clone(), v.clone());
        }
        self.includes.extend(other.includes.iter().cloned());
        if self.target_namespace.is_none() {
            self.target_namespace = other.target_namespace.clone();
        }
        if self.element_form_default.is_none() {
            self.element_form_default = other.element_form_default.clone();
        }
    }
}

/// Tables of one parsed WSDL or schema document
#[derive(Debug, Clone, Default)]
pub struct ParsedDefinitions {
    /// `name` attribute of the root
    pub name: Option<String>,
    /// `targetNamespace` attribute of the root
    pub target_namespace: Option<String>,
    /// Namespace declarations collected from the whole document
    pub xmlns: IndexMap<String, String>,
    /// Schemas keyed by target namespace
    pub schemas: IndexMap<String, Schema>,
    /// Messages by name
    pub messages: IndexMap<String, Arc<Node>>,
    /// Port types by name
    pub port_types: IndexMap<String, Arc<Node>>,
    /// Bindings over an HTTP SOAP transport by name
    pub bindings: IndexMap<String, Arc<Node>>,
    /// Services by name
    pub services: IndexMap<String, Arc<Node>>,
}

impl ParsedDefinitions {
    /// Add a schema, merging into an existing one of the same namespace
    pub fn add_schema(&mut self, namespace: String, schema: Schema) {
        match self.schemas.get_mut(&namespace) {
            Some(existing) => existing.merge(&schema),
            None => {
                self.schemas.insert(namespace, schema);
            }
        }
    }

    /// All pending includes, in schema then declaration order
    pub fn includes(&self) -> Vec<Include> {
        self.schemas
            .values()
            .flat_map(|s| s.includes.iter().cloned())
            .collect()
    }

    /// Fold an included document into this one.
    ///
    /// Schemas merge by namespace; a schema without a target namespace joins
    /// the namespace the include was declared for. Named WSDL entries and
    /// namespace prefixes already present are kept.
    pub fn merge_included(&mut self, other: &ParsedDefinitions, include_namespace: Option<&str>) {
        for (ns, schema) in &other.schemas {
            let key = match (ns.is_empty(), include_namespace) {
                (true, Some(target)) => target.to_string(),
                _ => ns.clone(),
            };
            let mut schema = schema.clone();
            schema.includes.clear();
            self.add_schema(key, schema);
        }
        for (k, v) in &other.messages {
            self.messages.entry(k.clone()).or_insert_with(|| v.clone());
        }
        for (k, v) in &other.port_types {
            self.port_types.entry(k.clone()).or_insert_with(|| v.clone());
        }
        for (k, v) in &other.bindings {
            self.bindings.entry(k.clone()).or_insert_with(|| v.clone());
        }
        for (k, v) in &other.services {
            self.services.entry(k.clone()).or_insert_with(|| v.clone());
        }
        for (k, v) in &other.xmlns {
            if k == TNS_PREFIX {
                continue;
            }
            self.xmlns.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

/// Descendant `type` reference collected from a message element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupType {
    /// Name of the declaring element
    pub name: String,
    /// Qualified type name as written
    pub type_name: String,
    /// Namespace bound to the type prefix
    pub namespace: Option<String>,
}

/// Element-based (document style) message body
#[derive(Debug, Clone)]
pub struct MessageElement {
    /// The referenced global element
    pub node: Arc<Node>,
    /// Prefix used in the part's `element` reference
    pub target_ns_alias: String,
    /// Namespace of that prefix
    pub target_namespace: Option<String>,
    /// The part's `element` reference, used to find the element again
    pub lookup_type: String,
    /// Non-XSD types referenced below the element
    pub lookup_types: Vec<LookupType>,
    /// Shape of the element content
    pub parts: Option<Shape>,
}

impl MessageElement {
    /// Element local name
    pub fn name(&self) -> &str {
        self.node.name().unwrap_or_default()
    }
}

/// One part of an rpc message
#[derive(Debug, Clone)]
pub enum Part {
    /// Part typed by a schema type
    Type {
        /// Type declaration
        node: Arc<Node>,
        /// Prefix used in the part's `type` attribute
        prefix: String,
        /// Namespace of that prefix
        namespace: Option<String>,
    },
    /// Part typed by a name that is not declared in any schema (usually an XSD primitive)
    Name(String),
}

/// How a message body is described
#[derive(Debug, Clone)]
pub enum MessageBody {
    /// Document style: one global element
    Element(MessageElement),
    /// Rpc style: named parts
    Parts(IndexMap<String, Part>),
    /// A message without parts, or whose element is missing
    Empty,
}

/// A resolved message
#[derive(Debug, Clone)]
pub struct Message {
    /// Message name
    pub name: String,
    /// Body description
    pub body: MessageBody,
    /// Shape used when decoding this message: `{wire name: content}`
    pub shape: Shape,
}

impl Message {
    /// Name of the body element on the wire: the element name for document
    /// messages, the message name otherwise
    pub fn wire_name(&self) -> &str {
        match &self.body {
            MessageBody::Element(el) => el.name(),
            _ => &self.name,
        }
    }

    /// The element when the message is element based
    pub fn element(&self) -> Option<&MessageElement> {
        match &self.body {
            MessageBody::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Rpc parts
    pub fn parts(&self) -> Option<&IndexMap<String, Part>> {
        match &self.body {
            MessageBody::Parts(parts) => Some(parts),
            _ => None,
        }
    }
}

/// A resolved operation
#[derive(Debug, Clone, Default)]
pub struct Operation {
    /// Operation name
    pub name: String,
    /// Input message
    pub input: Option<Arc<Message>>,
    /// Output message; one-way operations have none
    pub output: Option<Arc<Message>>,
    /// `rpc` or `document`
    pub style: String,
    /// SOAPAction from the binding, when the binding declares one
    pub soap_action: Option<String>,
    /// Binding body settings of the input
    pub input_soap: Option<SoapBody>,
    /// Binding body settings of the output
    pub output_soap: Option<SoapBody>,
}

/// A resolved port type
#[derive(Debug, Clone, Default)]
pub struct PortType {
    /// Port type name
    pub name: String,
    /// Operations by name
    pub methods: IndexMap<String, Arc<Operation>>,
}

/// Routing entry from a body element name to its method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopElement {
    /// Method name
    pub method_name: String,
    /// Output element name, empty for one-way operations
    pub output_name: String,
}

/// A resolved binding
#[derive(Debug, Clone, Default)]
pub struct Binding {
    /// Binding name
    pub name: String,
    /// `rpc` or `document`
    pub style: String,
    /// SOAP transport URI
    pub transport: String,
    /// Operations with binding settings applied
    pub methods: IndexMap<String, Arc<Operation>>,
    /// Input element name to method, for document style bindings
    pub top_elements: IndexMap<String, TopElement>,
}

/// A resolved port
#[derive(Debug, Clone)]
pub struct Port {
    /// Port name
    pub name: String,
    /// Endpoint address
    pub location: Option<String>,
    /// Bound binding
    pub binding: Arc<Binding>,
}

/// A resolved service
#[derive(Debug, Clone, Default)]
pub struct Service {
    /// Service name
    pub name: String,
    /// Ports by name
    pub ports: IndexMap<String, Port>,
}

/// Fully resolved, immutable definitions shared by the codec
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    /// `name` attribute of the root
    pub name: Option<String>,
    /// Target namespace of the root document
    pub target_namespace: Option<String>,
    /// Namespace declarations collected from all documents
    pub xmlns: IndexMap<String, String>,
    /// Schemas keyed by target namespace
    pub schemas: IndexMap<String, Schema>,
    /// Messages by name and by element name
    pub messages: IndexMap<String, Arc<Message>>,
    /// Port types by name
    pub port_types: IndexMap<String, PortType>,
    /// Bindings by name
    pub bindings: IndexMap<String, Arc<Binding>>,
    /// Services by name
    pub services: IndexMap<String, Service>,
    /// Precomputed type shapes
    pub descriptions: DescriptionRegistry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wsdl::nodes::NodeKind;

    fn node(kind: NodeKind, name: &str) -> Arc<Node> {
        let mut attrs = IndexMap::new();
        attrs.insert("name".to_string(), name.to_string());
        Arc::new(Node::new(kind, "x", &attrs))
    }

    #[test]
    fn test_schema_merge() {
        let mut a = Schema {
            target_namespace: Some("urn:a".into()),
            ..Schema::default()
        };
        a.complex_types.insert("A".into(), node(NodeKind::ComplexType, "A"));
        a.includes.push(Include {
            namespace: None,
            location: "one.xsd".into(),
        });
        let mut b = Schema::default();
        b.complex_types.insert("B".into(), node(NodeKind::ComplexType, "B"));
        b.includes.push(Include {
            namespace: None,
            location: "two.xsd".into(),
        });

        a.merge(&b);
        assert_eq!(a.complex_types.len(), 2);
        assert_eq!(a.includes.len(), 2);
        assert!(a.find("B").is_some());
    }

    #[test]
    fn test_merge_included_chameleon() {
        let mut main = ParsedDefinitions::default();
        main.add_schema("urn:main".into(), Schema::default());
        main.xmlns.insert("tns".into(), "urn:main".into());

        let mut inc = ParsedDefinitions::default();
        let mut schema = Schema::default();
        schema.elements.insert("Thing".into(), node(NodeKind::Element, "Thing"));
        inc.add_schema(String::new(), schema);
        inc.xmlns.insert("tns".into(), "urn:other".into());

        main.merge_included(&inc, Some("urn:main"));
        assert!(main.schemas["urn:main"].elements.contains_key("Thing"));
        assert_eq!(main.xmlns["tns"], "urn:main");
    }
}
