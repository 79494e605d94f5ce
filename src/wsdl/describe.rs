//! Shape descriptions of schema types
//!
//! A [`Shape`] is the plain nested mapping that describes what a message or
//! type looks like: field name to primitive type name or nested shape, with
//! repeated fields suffixed by `[]`. The decoder walks shapes to find the
//! expected type of every element it opens, and `describe_services` renders
//! them as JSON.
//!
//! Named types are described once into a [`DescriptionRegistry`] and referenced
//! everywhere else through [`Shape::Ref`]. A placeholder is registered before a
//! type's own description is computed, so self-referencing and mutually
//! referencing types terminate and share structure.

use crate::names::{is_primitive, split_qname, TNS_PREFIX};
use crate::wsdl::definitions::Schema;
use crate::wsdl::nodes::{Node, NodeKind};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Suffix marking a repeated field
pub const ARRAY_SUFFIX: &str = "[]";

const MAX_REF_HOPS: usize = 32;

/// Description of a message, type or element content
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Primitive or otherwise opaque type name, e.g. `xs:int`
    Type(String),
    /// Nested fields
    Fields(ShapeMap),
    /// Named type described in the registry
    Ref(TypeRef),
}

/// Ordered field table of a shape
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeMap {
    /// Fields in declaration order, repeated ones with a `[]` suffix
    pub fields: IndexMap<String, Shape>,
    /// Prefix the type was first referenced through
    pub target_ns_alias: Option<String>,
    /// Namespace of the type
    pub target_namespace: Option<String>,
}

impl ShapeMap {
    /// Empty field table
    pub fn new() -> Self {
        Self::default()
    }

    /// Field table with the given entries
    pub fn with_fields(fields: IndexMap<String, Shape>) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }
}

/// Reference to a registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    /// Registry key: `{namespace}name` for types, `element:{namespace}name` for elements
    pub key: String,
    /// Name shown when a cycle is cut while rendering
    pub name: String,
}

impl Shape {
    /// Empty field table
    pub fn empty() -> Self {
        Shape::Fields(ShapeMap::new())
    }

    /// Field table with the given entries
    pub fn fields(fields: IndexMap<String, Shape>) -> Self {
        Shape::Fields(ShapeMap::with_fields(fields))
    }

    /// Type name if this is a [`Shape::Type`]
    pub fn as_type(&self) -> Option<&str> {
        match self {
            Shape::Type(t) => Some(t),
            _ => None,
        }
    }
}

/// Registry key of a named type
pub fn type_key(namespace: &str, name: &str) -> String {
    format!("{{{}}}{}", namespace, name)
}

/// Registry key of a global element
pub fn element_key(namespace: &str, name: &str) -> String {
    format!("element:{{{}}}{}", namespace, name)
}

/// Described named types and elements
#[derive(Debug, Clone, Default)]
pub struct DescriptionRegistry {
    entries: IndexMap<String, Shape>,
}

impl DescriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of described entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been described
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry by key
    pub fn get(&self, key: &str) -> Option<&Shape> {
        self.entries.get(key)
    }

    /// Whether a key has been described or is being described
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn insert(&mut self, key: String, shape: Shape) {
        self.entries.insert(key, shape);
    }

    /// Follow references until a concrete shape
    pub fn resolve<'s>(&'s self, mut shape: &'s Shape) -> &'s Shape {
        for _ in 0..MAX_REF_HOPS {
            match shape {
                Shape::Ref(r) => match self.entries.get(&r.key) {
                    Some(next) => shape = next,
                    None => return shape,
                },
                _ => return shape,
            }
        }
        shape
    }

    /// Field table of a shape, following references
    pub fn fields_of<'s>(&'s self, shape: &'s Shape) -> Option<&'s ShapeMap> {
        match self.resolve(shape) {
            Shape::Fields(map) => Some(map),
            _ => None,
        }
    }

    /// Shape of the child `name`, preferring a repeated declaration.
    /// The flag tells whether the child was declared repeated.
    pub fn child<'s>(&'s self, shape: &'s Shape, name: &str) -> Option<(&'s Shape, bool)> {
        let map = self.fields_of(shape)?;
        if let Some(child) = map.fields.get(&format!("{}{}", name, ARRAY_SUFFIX)) {
            return Some((child, true));
        }
        map.fields.get(name).map(|child| (child, false))
    }

    /// Render a shape as JSON; a type met again inside itself renders as its name
    pub fn to_json(&self, shape: &Shape) -> Value {
        let mut visiting = HashSet::new();
        self.render(shape, &mut visiting)
    }

    fn render(&self, shape: &Shape, visiting: &mut HashSet<String>) -> Value {
        match shape {
            Shape::Type(t) => Value::String(t.clone()),
            Shape::Fields(map) => {
                let mut obj = Map::new();
                for (name, field) in &map.fields {
                    obj.insert(name.clone(), self.render(field, visiting));
                }
                if let Some(alias) = &map.target_ns_alias {
                    obj.insert("targetNSAlias".to_string(), Value::String(alias.clone()));
                }
                if let Some(ns) = &map.target_namespace {
                    obj.insert("targetNamespace".to_string(), Value::String(ns.clone()));
                }
                Value::Object(obj)
            }
            Shape::Ref(r) => {
                if visiting.contains(&r.key) {
                    return Value::String(r.name.clone());
                }
                match self.entries.get(&r.key) {
                    Some(target) => {
                        visiting.insert(r.key.clone());
                        let rendered = self.render(target, visiting);
                        visiting.remove(&r.key);
                        rendered
                    }
                    None => Value::String(r.name.clone()),
                }
            }
        }
    }
}

/// Computes shapes against merged schema tables
pub struct Describer<'a> {
    schemas: &'a IndexMap<String, Schema>,
    xmlns: &'a IndexMap<String, String>,
    registry: &'a mut DescriptionRegistry,
}

impl<'a> Describer<'a> {
    /// Create a describer over `schemas`, resolving prefixes through the
    /// schema's declarations first and `xmlns` second
    pub fn new(
        schemas: &'a IndexMap<String, Schema>,
        xmlns: &'a IndexMap<String, String>,
        registry: &'a mut DescriptionRegistry,
    ) -> Self {
        Self {
            schemas,
            xmlns,
            registry,
        }
    }

    /// Describe every named type and global element of every schema
    pub fn describe_schemas(&mut self) {
        let schemas = self.schemas;
        for (ns, schema) in schemas {
            for name in schema.complex_types.keys().chain(schema.types.keys()) {
                self.describe_type(ns, name, None);
            }
            for name in schema.elements.keys() {
                self.describe_element(ns, name, None);
            }
        }
    }

    /// Reference to a complex or simple type, describing it on first use
    pub fn describe_type(&mut self, namespace: &str, name: &str, alias: Option<&str>) -> Option<Shape> {
        let schemas = self.schemas;
        let schema = schemas.get(namespace)?;
        let node = schema
            .complex_types
            .get(name)
            .or_else(|| schema.types.get(name))?;
        let key = type_key(namespace, name);
        if !self.registry.contains(&key) {
            self.registry.insert(key.clone(), Shape::empty());
            let mut shape = self.describe_node(node, &schema.xmlns);
            if let Shape::Fields(map) = &mut shape {
                map.target_ns_alias = Some(alias.map(String::from).unwrap_or_else(|| self.alias_for(namespace)));
                map.target_namespace = Some(namespace.to_string());
            }
            self.registry.insert(key.clone(), shape);
        }
        Some(Shape::Ref(TypeRef {
            key,
            name: self.display_name(namespace, name, alias),
        }))
    }

    /// Reference to the content of a global element, describing it on first use
    pub fn describe_element(&mut self, namespace: &str, name: &str, alias: Option<&str>) -> Option<Shape> {
        let schemas = self.schemas;
        let schema = schemas.get(namespace)?;
        let node = schema.elements.get(name)?;
        let key = element_key(namespace, name);
        if !self.registry.contains(&key) {
            self.registry.insert(key.clone(), Shape::empty());
            let inner = self.element_content(node, &schema.xmlns);
            self.registry.insert(key.clone(), inner);
        }
        Some(Shape::Ref(TypeRef {
            key,
            name: self.display_name(namespace, name, alias),
        }))
    }

    fn alias_for(&self, namespace: &str) -> String {
        crate::names::find_prefix(self.xmlns, namespace)
            .unwrap_or(TNS_PREFIX)
            .to_string()
    }

    fn display_name(&self, namespace: &str, name: &str, alias: Option<&str>) -> String {
        let alias = alias.map(String::from).unwrap_or_else(|| self.alias_for(namespace));
        if alias == TNS_PREFIX || alias.is_empty() {
            name.to_string()
        } else {
            format!("{}:{}", alias, name)
        }
    }

    fn namespace_of(&self, prefix: &str, xmlns: &IndexMap<String, String>) -> Option<String> {
        xmlns
            .get(prefix)
            .or_else(|| self.xmlns.get(prefix))
            .cloned()
    }

    /// Describe any schema node
    pub fn describe_node(&mut self, node: &Node, xmlns: &IndexMap<String, String>) -> Shape {
        match node.kind {
            NodeKind::SimpleType => {
                match node.children_of(NodeKind::Restriction).next() {
                    Some(restriction) => match self.describe_node(restriction, xmlns) {
                        Shape::Type(desc) => {
                            Shape::Type(format!("{}|{}", node.name().unwrap_or_default(), desc))
                        }
                        other => other,
                    },
                    None => Shape::empty(),
                }
            }
            NodeKind::Restriction => {
                if let Some(group) = node.first_child_of(&[NodeKind::Sequence, NodeKind::Choice]) {
                    return self.describe_node(group, xmlns);
                }
                let base = node.attr("base").map(|b| format!("{}|", b)).unwrap_or_default();
                let values: Vec<&str> = node
                    .children_of(NodeKind::Enumeration)
                    .map(|e| e.value.as_deref().unwrap_or_default())
                    .collect();
                Shape::Type(format!("{}{}", base, values.join(",")))
            }
            NodeKind::Extension => self.describe_extension(node, xmlns),
            NodeKind::Enumeration => Shape::Type(node.value.clone().unwrap_or_default()),
            NodeKind::ComplexType => {
                match node.first_child_of(&[
                    NodeKind::Choice,
                    NodeKind::Sequence,
                    NodeKind::All,
                    NodeKind::SimpleContent,
                    NodeKind::ComplexContent,
                ]) {
                    Some(child) => self.describe_node(child, xmlns),
                    None => Shape::empty(),
                }
            }
            NodeKind::ComplexContent | NodeKind::SimpleContent => {
                match node.children_of(NodeKind::Extension).next() {
                    Some(ext) => self.describe_node(ext, xmlns),
                    None => Shape::empty(),
                }
            }
            NodeKind::Element => self.describe_local_element(node, xmlns),
            NodeKind::Sequence | NodeKind::All | NodeKind::Choice => {
                let mut fields = IndexMap::new();
                for child in &node.children {
                    if child.kind == NodeKind::Any {
                        continue;
                    }
                    if let Shape::Fields(map) = self.describe_node(child, xmlns) {
                        fields.extend(map.fields);
                    }
                }
                Shape::fields(fields)
            }
            _ => Shape::Type(
                node.name()
                    .map(String::from)
                    .unwrap_or_else(|| node.local_name.clone()),
            ),
        }
    }

    fn describe_extension(&mut self, node: &Node, xmlns: &IndexMap<String, String>) -> Shape {
        let mut own = ShapeMap::new();
        for child in &node.children {
            if matches!(child.kind, NodeKind::Sequence | NodeKind::Choice) {
                if let Shape::Fields(map) = self.describe_node(child, xmlns) {
                    own = map;
                }
            }
        }
        let base = match node.attr("base") {
            Some(base) => base,
            None => return Shape::Fields(own),
        };
        let split = split_qname(base);
        if is_primitive(split.name) {
            return Shape::Type(base.to_string());
        }
        let base_ref = self.namespace_of(split.prefix, xmlns).and_then(|ns| {
            self.describe_type(&ns, split.name, Some(split.prefix))
                .or_else(|| self.describe_element(&ns, split.name, Some(split.prefix)))
        });
        let base_fields = base_ref
            .as_ref()
            .and_then(|r| self.registry.fields_of(r))
            .map(|m| m.fields.clone())
            .unwrap_or_default();
        if base_fields.is_empty() {
            return Shape::Fields(own);
        }
        let mut merged = base_fields;
        for (name, field) in own.fields {
            merged.entry(name).or_insert(field);
        }
        Shape::fields(merged)
    }

    /// Field name of an element, with the repetition suffix
    fn field_name(node: &Node, fallback: &str) -> String {
        let mut name = node.name().unwrap_or(fallback).to_string();
        if node.is_array() {
            name.push_str(ARRAY_SUFFIX);
        }
        name
    }

    fn describe_local_element(&mut self, node: &Node, xmlns: &IndexMap<String, String>) -> Shape {
        let mut fields = IndexMap::new();
        if let (None, Some(reference)) = (node.type_name(), node.ref_name()) {
            let split = split_qname(reference);
            let name = Self::field_name(node, split.name);
            let target = self
                .namespace_of(split.prefix, xmlns)
                .and_then(|ns| self.describe_element(&ns, split.name, Some(split.prefix)))
                .unwrap_or_else(|| Shape::Type(reference.to_string()));
            fields.insert(name, target);
            return Shape::fields(fields);
        }
        let name = Self::field_name(node, "");
        let content = self.element_content(node, xmlns);
        fields.insert(name, content);
        Shape::fields(fields)
    }

    /// Shape of an element's content: its named type, or its inline type
    fn element_content(&mut self, node: &Node, xmlns: &IndexMap<String, String>) -> Shape {
        if let Some(type_name) = node.type_name() {
            let split = split_qname(type_name);
            if is_primitive(split.name) {
                return Shape::Type(type_name.to_string());
            }
            return self
                .namespace_of(split.prefix, xmlns)
                .and_then(|ns| self.describe_type(&ns, split.name, Some(split.prefix)))
                .unwrap_or_else(|| Shape::Type(type_name.to_string()));
        }
        if let Some(reference) = node.ref_name() {
            let split = split_qname(reference);
            return self
                .namespace_of(split.prefix, xmlns)
                .and_then(|ns| self.describe_element(&ns, split.name, Some(split.prefix)))
                .unwrap_or_else(|| Shape::Type(reference.to_string()));
        }
        let mut content = Shape::empty();
        for child in &node.children {
            match child.kind {
                NodeKind::ComplexType => content = self.describe_node(child, xmlns),
                NodeKind::SimpleType => content = self.describe_node(child, xmlns),
                _ => {}
            }
        }
        content
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::Limits;
    use crate::wsdl::parsing::parse_definitions;
    use serde_json::json;

    fn describe(xsd: &str) -> (DescriptionRegistry, crate::wsdl::definitions::ParsedDefinitions) {
        let defs = parse_definitions(xsd, true, &Limits::default()).unwrap();
        let mut registry = DescriptionRegistry::new();
        Describer::new(&defs.schemas, &defs.xmlns, &mut registry).describe_schemas();
        (registry, defs)
    }

    #[test]
    fn test_recursive_type_terminates() {
        let (registry, _) = describe(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:t="urn:t" targetNamespace="urn:t">
                <xs:complexType name="Node">
                  <xs:sequence>
                    <xs:element name="value" type="xs:string"/>
                    <xs:element name="child" type="t:Node" minOccurs="0" maxOccurs="unbounded"/>
                  </xs:sequence>
                </xs:complexType>
            </xs:schema>"#,
        );
        let node = registry.get(&type_key("urn:t", "Node")).unwrap();
        let (child, repeated) = registry.child(node, "child").unwrap();
        assert!(repeated);
        // the cycle point is the same registry entry
        assert_eq!(registry.resolve(child), node);

        let rendered = registry.to_json(&Shape::Ref(TypeRef {
            key: type_key("urn:t", "Node"),
            name: "t:Node".into(),
        }));
        assert_eq!(rendered["value"], json!("xs:string"));
        assert_eq!(rendered["child[]"], json!("t:Node"));
    }

    #[test]
    fn test_extension_merges_base_fields_first() {
        let (registry, _) = describe(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:t="urn:t" targetNamespace="urn:t">
                <xs:complexType name="Base">
                  <xs:sequence><xs:element name="id" type="xs:int"/></xs:sequence>
                </xs:complexType>
                <xs:complexType name="Derived">
                  <xs:complexContent>
                    <xs:extension base="t:Base">
                      <xs:sequence><xs:element name="label" type="xs:string"/></xs:sequence>
                    </xs:extension>
                  </xs:complexContent>
                </xs:complexType>
            </xs:schema>"#,
        );
        let derived = registry.fields_of(registry.get(&type_key("urn:t", "Derived")).unwrap()).unwrap();
        let names: Vec<&str> = derived.fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["id", "label"]);
    }

    #[test]
    fn test_simple_type_and_element_ref() {
        let (registry, _) = describe(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:t="urn:t" targetNamespace="urn:t">
                <xs:simpleType name="Color">
                  <xs:restriction base="xs:string">
                    <xs:enumeration value="red"/>
                    <xs:enumeration value="blue"/>
                  </xs:restriction>
                </xs:simpleType>
                <xs:element name="color" type="t:Color"/>
                <xs:element name="palette">
                  <xs:complexType>
                    <xs:sequence><xs:element ref="t:color" maxOccurs="unbounded"/></xs:sequence>
                  </xs:complexType>
                </xs:element>
            </xs:schema>"#,
        );
        let color = registry.get(&type_key("urn:t", "Color")).unwrap();
        assert_eq!(color, &Shape::Type("Color|xs:string|red,blue".into()));

        let palette = registry.get(&element_key("urn:t", "palette")).unwrap();
        let (entry, repeated) = registry.child(palette, "color").unwrap();
        assert!(repeated);
        assert_eq!(registry.resolve(entry), color);
    }
}
