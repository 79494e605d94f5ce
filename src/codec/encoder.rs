//! Value to XML serialization
//!
//! The encoder walks a `serde_json::Value` and, where a schema object is
//! known, looks up each child declaration to decide its namespace prefix,
//! whether the prefix has to be declared, and whether the element is
//! qualified. Namespace bindings live in a [`NamespaceContext`] scoped per
//! element.

use crate::codec::{escaped_text, scalar_text};
use crate::names::{append_colon, find_prefix, local_name, no_colon, split_qname, TNS_PREFIX};
use crate::namespaces::NamespaceContext;
use crate::wsdl::{LookupType, MessageElement, Node, NodeKind, Wsdl};
use crate::XSD_NAMESPACE;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::ptr;

const XSI_TYPE_KEY: &str = "xsi_type";
const RAW_XML_KEY: &str = "_xml";
const RPC_XMLNS_KEY: &str = "_xmlns";

/// A schema declaration the encoder can descend into
#[derive(Debug, Clone, Copy)]
pub enum SchemaRef<'a> {
    /// Parsed schema node
    Node(&'a Node),
    /// Type reference collected from a message element
    Lookup(&'a LookupType),
}

impl<'a> SchemaRef<'a> {
    /// The `name` attribute
    pub fn name(&self) -> Option<&'a str> {
        match self {
            SchemaRef::Node(node) => node.name(),
            SchemaRef::Lookup(lookup) => Some(lookup.name.as_str()),
        }
    }

    /// The `ref` attribute
    pub fn ref_name(&self) -> Option<&'a str> {
        match self {
            SchemaRef::Node(node) => node.ref_name(),
            SchemaRef::Lookup(_) => None,
        }
    }

    /// The `type` attribute
    pub fn type_name(&self) -> Option<&'a str> {
        match self {
            SchemaRef::Node(node) => node.type_name(),
            SchemaRef::Lookup(lookup) => Some(lookup.type_name.as_str()),
        }
    }

    /// Namespace the declaration belongs to
    pub fn target_namespace(&self) -> Option<&'a str> {
        match self {
            SchemaRef::Node(node) => node.target_namespace.as_deref(),
            SchemaRef::Lookup(lookup) => lookup.namespace.as_deref(),
        }
    }

    fn is_element(&self) -> bool {
        matches!(self, SchemaRef::Node(node) if node.kind == NodeKind::Element)
    }

    fn is_global(&self) -> bool {
        matches!(self, SchemaRef::Node(node) if node.is_global)
    }

    fn form(&self) -> Option<&'a str> {
        match self {
            SchemaRef::Node(node) => node.attr("form"),
            SchemaRef::Lookup(_) => None,
        }
    }

    fn children(&self) -> &'a [Node] {
        match self {
            SchemaRef::Node(node) => &node.children,
            SchemaRef::Lookup(_) => &[],
        }
    }

    fn id(&self) -> usize {
        match self {
            SchemaRef::Node(node) => *node as *const Node as usize,
            SchemaRef::Lookup(lookup) => *lookup as *const LookupType as usize,
        }
    }
}

/// Prefix of the element being rendered; array items remember the prefix
/// of the enclosing element
#[derive(Debug, Clone, Default)]
struct NsPrefix {
    current: String,
    parent: Option<String>,
}

impl NsPrefix {
    fn plain(current: impl Into<String>) -> Self {
        Self {
            current: current.into(),
            parent: None,
        }
    }
}

/// `xsi_type` entry of an attributes object
#[derive(Debug, Deserialize)]
struct XsiType {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    xmlns: String,
    prefix: Option<String>,
    namespace: Option<String>,
}

impl XsiType {
    fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    fn given_prefix(&self) -> Option<&str> {
        self.prefix
            .as_deref()
            .filter(|p| !p.is_empty())
            .or_else(|| self.namespace.as_deref().filter(|p| !p.is_empty()))
    }
}

/// One serialization pass over a WSDL
pub struct Encoder<'a> {
    wsdl: &'a Wsdl,
    lookup: Option<&'a MessageElement>,
}

impl<'a> Encoder<'a> {
    /// Encoder for `wsdl`; `lookup` supplies the type references of the
    /// message element being serialized
    pub fn new(wsdl: &'a Wsdl, lookup: Option<&'a MessageElement>) -> Self {
        Self { wsdl, lookup }
    }

    fn ignored(&self, prefix: &str) -> bool {
        self.wsdl.is_ignored_namespace(prefix)
    }

    /// Serialize `value` as element `name` in namespace `uri`
    pub fn encode(
        &self,
        value: &Value,
        name: Option<&str>,
        prefix: &str,
        uri: Option<&str>,
        is_first: bool,
        schema_object: Option<SchemaRef<'a>>,
    ) -> String {
        let mut ctx = NamespaceContext::new();
        ctx.declare_namespace(prefix, uri.unwrap_or_default());
        self.render(
            value,
            name,
            &NsPrefix::plain(prefix),
            uri,
            is_first,
            None,
            schema_object,
            &mut ctx,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn render(
        &self,
        obj: &Value,
        name: Option<&str>,
        prefix: &NsPrefix,
        ns_uri: Option<&str>,
        is_first: bool,
        xmlns_attr: Option<&str>,
        schema_object: Option<SchemaRef<'a>>,
        ctx: &mut NamespaceContext,
    ) -> String {
        let options = &self.wsdl.options;
        let defs = &self.wsdl.definitions;
        let schema = ns_uri.and_then(|uri| defs.schemas.get(uri));

        let mut parent_prefix = prefix.parent.as_deref().map(no_colon).unwrap_or_default();
        if self.ignored(parent_prefix) {
            parent_prefix = "";
        }
        let ns_prefix = prefix.current.as_str();

        let soap_header = schema.is_none();
        let qualified = schema.map(|s| s.is_qualified()).unwrap_or(false);
        let prefix_namespace = (!ns_prefix.is_empty() || qualified) && ns_prefix != TNS_PREFIX;

        let override_root = options.override_root_element.as_ref();
        let override_attributes = override_root.filter(|o| !o.xmlns_attributes.is_empty());

        let mut xmlns_attrib = String::new();
        if let Some(uri) = ns_uri.filter(|u| !u.is_empty() && is_first) {
            if let Some(root) = override_attributes {
                for attribute in &root.xmlns_attributes {
                    xmlns_attrib.push_str(&format!(" {}=\"{}\"", attribute.name, attribute.value));
                }
            } else {
                if prefix_namespace && !self.ignored(ns_prefix) {
                    xmlns_attrib.push_str(&format!(" xmlns:{}=\"{}\"", ns_prefix, uri));
                }
                if qualified || soap_header {
                    xmlns_attrib.push_str(&format!(" xmlns=\"{}\"", uri));
                }
            }
        }

        ctx.push_context();

        if let Some(attr) = xmlns_attr.filter(|a| !a.is_empty()) {
            if override_attributes.is_none() {
                xmlns_attrib = attr.to_string();
            }
        }

        let mut ns = match override_root {
            Some(root) if is_first => root.namespace.clone(),
            _ if prefix_namespace
                && (qualified || is_first || soap_header)
                && !self.ignored(ns_prefix) =>
            {
                ns_prefix.to_string()
            }
            _ => String::new(),
        };

        let name = name.unwrap_or_default();
        let mut parts: Vec<String> = Vec::new();

        match obj {
            Value::Array(items) => {
                let outer = if parent_prefix.is_empty() {
                    ns.clone()
                } else {
                    parent_prefix.to_string()
                };
                for (i, item) in items.iter().enumerate() {
                    let array_attr = self.process_attributes(item, ctx);
                    let body = self.render(
                        item,
                        Some(name),
                        &NsPrefix::plain(ns_prefix),
                        ns_uri,
                        false,
                        None,
                        schema_object,
                        ctx,
                    );
                    let open = format!("<{}{}{}{}", append_colon(&outer), name, array_attr, xmlns_attrib);
                    if body.is_empty() && options.use_empty_tag {
                        parts.push(format!("{} />", open));
                    } else {
                        if options.namespace_array_elements || i == 0 {
                            parts.push(format!("{}>", open));
                        }
                        parts.push(body);
                        if options.namespace_array_elements || i + 1 == items.len() {
                            parts.push(format!("</{}{}>", append_colon(&outer), name));
                        }
                    }
                }
            }
            Value::Object(map) => {
                for (key, child) in map {
                    if *key == options.attributes_key {
                        continue;
                    }
                    if *key == options.xml_key {
                        ctx.pop_context();
                        return scalar_text(child);
                    }
                    if *key == options.value_key {
                        ctx.pop_context();
                        return escaped_text(child);
                    }

                    let attr = self.process_attributes(child, ctx);

                    let mut child_name = key.as_str();
                    let mut non_sub_ns = String::new();
                    let mut empty_non_sub_ns = false;
                    match key.split_once(':') {
                        Some((p, local)) if !p.is_empty() && !local.is_empty() && !local.contains(':') => {
                            non_sub_ns = format!("{}:", p);
                            child_name = local;
                        }
                        _ if key.starts_with(':') => {
                            empty_non_sub_ns = true;
                            child_name = &key[1..];
                        }
                        _ => {}
                    }

                    let value = if is_first {
                        self.render(
                            child,
                            Some(child_name),
                            &NsPrefix::plain(ns_prefix),
                            ns_uri,
                            false,
                            None,
                            schema_object,
                            ctx,
                        )
                    } else if let Some(schema) = schema {
                        let child_schema = schema_object
                            .and_then(|o| self.find_child(o, child_name))
                            .filter(|c| {
                                c.type_name().map(|t| !t.contains("xsd:")).unwrap_or(false)
                                    || c.ref_name().is_some()
                                    || c.name().is_some()
                            });

                        if let Some(cso) = child_schema {
                            let mut child_prefix = String::new();
                            let mut element_name = "";
                            let mut child_uri: Option<String> = None;
                            let mut child_xmlns_attrib = String::new();

                            if let Some(qname) = cso.ref_name().or_else(|| cso.name()) {
                                let split = split_qname(qname);
                                element_name = split.name;
                                if split.prefix == TNS_PREFIX {
                                    child_uri = cso.target_namespace().map(String::from);
                                    child_prefix = match &child_uri {
                                        Some(uri) => ctx.register_namespace(uri),
                                        None => ns_prefix.to_string(),
                                    };
                                } else {
                                    child_prefix = split.prefix.to_string();
                                }
                                if self.ignored(&child_prefix) {
                                    child_prefix = ns_prefix.to_string();
                                }
                                if split.prefix != TNS_PREFIX {
                                    child_uri = schema
                                        .xmlns
                                        .get(&child_prefix)
                                        .or_else(|| defs.xmlns.get(&child_prefix))
                                        .cloned();
                                }

                                let unqualified = if cso.name().is_some() && !cso.is_global() {
                                    match cso.form() {
                                        Some("unqualified") => true,
                                        Some("qualified") => false,
                                        _ => !schema.is_qualified(),
                                    }
                                } else {
                                    false
                                };
                                if unqualified {
                                    child_prefix.clear();
                                }

                                if let Some(uri) = child_uri.as_deref().filter(|u| !u.is_empty()) {
                                    if !child_prefix.is_empty() && ctx.declare_namespace(&child_prefix, uri) {
                                        child_xmlns_attrib =
                                            format!(" xmlns:{}=\"{}\"", child_prefix, uri);
                                        xmlns_attrib.push_str(&child_xmlns_attrib);
                                    }
                                }
                            }

                            let resolved = match cso.type_name() {
                                Some(type_name) => {
                                    let split = split_qname(type_name);
                                    let type_uri = schema
                                        .xmlns
                                        .get(split.prefix)
                                        .or_else(|| defs.xmlns.get(split.prefix))
                                        .cloned();
                                    if let Some(uri) = &type_uri {
                                        if uri != XSD_NAMESPACE && split.prefix != TNS_PREFIX {
                                            ctx.add_namespace(split.prefix, uri, false);
                                        }
                                    }
                                    child_uri = type_uri;
                                    self.wsdl
                                        .find_schema_type(split.name, child_uri.as_deref())
                                        .map(|n| SchemaRef::Node(n.as_ref()))
                                        .unwrap_or(cso)
                                }
                                None => self
                                    .wsdl
                                    .find_schema_object(child_uri.as_deref(), element_name)
                                    .map(|n| SchemaRef::Node(n.as_ref()))
                                    .unwrap_or(cso),
                            };

                            if options.ignore_base_namespaces {
                                child_prefix.clear();
                                child_uri = Some(String::new());
                            }

                            ns = child_prefix.clone();
                            let (next_prefix, next_xmlns) = if child.is_array() {
                                (
                                    NsPrefix {
                                        current: child_prefix,
                                        parent: Some(ns.clone()),
                                    },
                                    Some(child_xmlns_attrib),
                                )
                            } else {
                                (NsPrefix::plain(child_prefix), None)
                            };

                            self.render(
                                child,
                                Some(child_name),
                                &next_prefix,
                                child_uri.as_deref(),
                                false,
                                next_xmlns.as_deref(),
                                Some(resolved),
                                ctx,
                            )
                        } else if let Some(xsi) = xsi_type_of(map, &options.attributes_key) {
                            let xsi_prefix = xsi
                                .given_prefix()
                                .map(String::from)
                                .or_else(|| ctx.get_prefix(&xsi.xmlns, false).map(String::from))
                                .unwrap_or_default();
                            non_sub_ns = xsi_prefix.clone();
                            ctx.add_namespace(&xsi_prefix, &xsi.xmlns, false);
                            self.render(
                                child,
                                Some(child_name),
                                &NsPrefix::plain(xsi_prefix),
                                Some(&xsi.xmlns),
                                false,
                                None,
                                None,
                                ctx,
                            )
                        } else {
                            let array_name;
                            let rendered_name = if child.is_array() {
                                array_name = format!("{}{}", non_sub_ns, child_name);
                                array_name.as_str()
                            } else {
                                child_name
                            };
                            self.render(
                                child,
                                Some(rendered_name),
                                &NsPrefix::plain(ns_prefix),
                                ns_uri,
                                false,
                                None,
                                None,
                                ctx,
                            )
                        }
                    } else {
                        self.render(
                            child,
                            Some(child_name),
                            &NsPrefix::plain(ns_prefix),
                            ns_uri,
                            false,
                            None,
                            None,
                            ctx,
                        )
                    };

                    ns = no_colon(&ns).to_string();
                    if prefix_namespace && !qualified && is_first && override_root.is_none() {
                        ns = ns_prefix.to_string();
                    } else if self.ignored(&ns) {
                        ns.clear();
                    }

                    let use_empty_tag = value.is_empty() && options.use_empty_tag;
                    let tag_prefix = if empty_non_sub_ns {
                        String::new()
                    } else if non_sub_ns.is_empty() {
                        append_colon(&ns)
                    } else {
                        append_colon(&non_sub_ns)
                    };
                    if !child.is_array() {
                        parts.push(format!(
                            "<{}{}{}{}{}{}",
                            tag_prefix,
                            child_name,
                            attr,
                            xmlns_attrib,
                            if child.is_null() { " xsi:nil=\"true\"" } else { "" },
                            if use_empty_tag { " />" } else { ">" }
                        ));
                    }
                    if !use_empty_tag {
                        parts.push(value);
                        if !child.is_array() {
                            parts.push(format!("</{}{}>", tag_prefix, child_name));
                        }
                    }
                }
            }
            Value::Null => {}
            scalar => {
                if options.escape_xml {
                    parts.push(escaped_text(scalar));
                } else {
                    parts.push(scalar_text(scalar));
                }
            }
        }

        ctx.pop_context();
        parts.concat()
    }

    /// Attribute text for `child`, declaring the namespace of an `xsi_type`
    fn process_attributes(&self, child: &Value, ctx: &mut NamespaceContext) -> String {
        let attrs = match child
            .as_object()
            .and_then(|m| m.get(&self.wsdl.options.attributes_key))
        {
            Some(Value::Object(attrs)) => attrs,
            _ => return String::new(),
        };

        let mut out = String::new();
        for (key, value) in attrs {
            if key == XSI_TYPE_KEY {
                if let Some(xsi) = XsiType::from_value(value) {
                    let prefix = match xsi.given_prefix() {
                        Some(prefix) => {
                            ctx.declare_namespace(prefix, &xsi.xmlns);
                            prefix.to_string()
                        }
                        None => ctx.register_namespace(&xsi.xmlns),
                    };
                    out.push_str(&format!(
                        " xsi:type=\"{}:{}\" xmlns:{}=\"{}\"",
                        prefix, xsi.type_name, prefix, xsi.xmlns
                    ));
                }
                continue;
            }
            out.push_str(&format!(" {}=\"{}\"", key, escaped_text(value)));
        }
        out
    }

    /// Find the declaration of `child_name` below `object`
    pub fn find_child(&self, object: SchemaRef<'a>, child_name: &str) -> Option<SchemaRef<'a>> {
        let mut backtrace = Vec::new();
        self.find_child_in(object, child_name, &mut backtrace)
    }

    fn find_child_in(
        &self,
        object: SchemaRef<'a>,
        child_name: &str,
        backtrace: &mut Vec<usize>,
    ) -> Option<SchemaRef<'a>> {
        if child_name.is_empty() {
            return None;
        }
        let id = object.id();
        if backtrace.contains(&id) {
            return None;
        }
        backtrace.push(id);
        let found = self.search_child(object, child_name, backtrace);
        backtrace.pop();
        found
    }

    fn search_child(
        &self,
        object: SchemaRef<'a>,
        child_name: &str,
        backtrace: &mut Vec<usize>,
    ) -> Option<SchemaRef<'a>> {
        let defs = &self.wsdl.definitions;
        let mut found = None;

        if let (SchemaRef::Node(node), Some(lookup)) = (object, self.lookup) {
            if ptr::eq(node, lookup.node.as_ref()) {
                found = lookup
                    .lookup_types
                    .iter()
                    .find(|t| t.name == child_name)
                    .map(SchemaRef::Lookup);
            }
        }

        if object.name() == Some(child_name) && object.is_element() {
            return Some(object);
        }
        if let Some(reference) = object.ref_name() {
            if local_name(reference) == child_name {
                return Some(object);
            }
        }

        if let Some(type_name) = object.type_name() {
            if backtrace.len() == 1 {
                let split = split_qname(type_name);
                let uri = if split.prefix == TNS_PREFIX {
                    object.target_namespace()
                } else {
                    defs.xmlns.get(split.prefix).map(String::as_str)
                };
                if let Some(def) = self.wsdl.find_schema_type(split.name, uri) {
                    return self.find_child_in(SchemaRef::Node(def.as_ref()), child_name, backtrace);
                }
            }
        }

        for child in object.children() {
            found = self.find_child_in(SchemaRef::Node(child), child_name, backtrace);
            if found.is_some() {
                break;
            }
            if let Some(base) = child.attr("base") {
                let split = split_qname(base);
                let uri = child
                    .xmlns
                    .get(split.prefix)
                    .or_else(|| defs.xmlns.get(split.prefix))
                    .map(String::as_str);
                if let Some(base_def) = self.wsdl.find_schema_type(split.name, uri) {
                    found = self.find_child_in(SchemaRef::Node(base_def.as_ref()), child_name, backtrace);
                    if found.is_some() {
                        break;
                    }
                }
            }
        }

        if found.is_none() && object.name() == Some(child_name) {
            return Some(object);
        }
        found
    }
}

fn xsi_type_of(map: &Map<String, Value>, attributes_key: &str) -> Option<XsiType> {
    map.get(attributes_key)?
        .get(XSI_TYPE_KEY)
        .and_then(XsiType::from_value)
}

impl Wsdl {
    /// Serialize `value` as element `name`, qualified with `prefix`/`uri`
    pub fn object_to_xml(&self, value: &Value, name: &str, prefix: &str, uri: Option<&str>) -> String {
        Encoder::new(self, None).encode(value, Some(name), prefix, uri, false, None)
    }

    /// Serialize a document-style body: `params` wrapped in element `name`.
    ///
    /// `type_name` selects the schema object that drives qualification; a
    /// `_xml` string in `params` is emitted as is.
    pub fn object_to_document_xml(
        &self,
        name: &str,
        params: &Value,
        prefix: &str,
        uri: Option<&str>,
        type_name: Option<&str>,
        lookup: Option<&MessageElement>,
    ) -> String {
        if let Some(xml) = params.get(RAW_XML_KEY).and_then(Value::as_str) {
            return xml.to_string();
        }
        let mut args = Map::new();
        args.insert(name.to_string(), params.clone());
        let schema_object = type_name
            .and_then(|t| self.find_schema_object(uri, t))
            .map(|n| SchemaRef::Node(n.as_ref()));
        Encoder::new(self, lookup).encode(&Value::Object(args), None, prefix, uri, true, schema_object)
    }

    /// Serialize an rpc-style body: one child per entry of `params` inside
    /// `<prefix:name>`. Part children are written without prefix.
    pub fn object_to_rpc_xml(
        &self,
        name: &str,
        params: &Value,
        prefix: Option<&str>,
        uri: Option<&str>,
        is_parts: bool,
    ) -> String {
        let defs = &self.definitions;
        let prefix = prefix
            .filter(|p| !p.is_empty())
            .map(String::from)
            .or_else(|| uri.and_then(|u| find_prefix(&defs.xmlns, u)).map(String::from))
            .unwrap_or_default();
        let uri = uri
            .map(String::from)
            .or_else(|| defs.xmlns.get(&prefix).cloned());
        let prefix = if prefix.is_empty() || prefix == TNS_PREFIX {
            String::new()
        } else {
            format!("{}:", prefix)
        };

        let mut out = format!("<{}{}>", prefix, name);
        if let Some(params) = params.as_object() {
            for (key, value) in params {
                if key == RPC_XMLNS_KEY {
                    continue;
                }
                let tag = format!("{}{}", if is_parts { "" } else { prefix.as_str() }, key);
                let mut attributes = String::new();
                if let Some(Value::Object(attrs)) = value.get(&self.options.attributes_key) {
                    for (n, v) in attrs {
                        attributes.push_str(&format!(" {}=\"{}\"", n, scalar_text(v)));
                    }
                }
                out.push_str(&format!("<{}{}>", tag, attributes));
                match value {
                    Value::Object(_) | Value::Array(_) | Value::Null => {
                        out.push_str(&self.object_to_xml(value, key, &prefix, uri.as_deref()));
                    }
                    scalar => out.push_str(&escaped_text(scalar)),
                }
                out.push_str(&format!("</{}>", tag));
            }
        }
        out.push_str(&format!("</{}{}>", prefix, name));
        out
    }

    /// Declaration of `child_name` below `object`
    pub fn find_child_schema_object<'a>(&'a self, object: &'a Node, child_name: &str) -> Option<SchemaRef<'a>> {
        Encoder::new(self, None).find_child(SchemaRef::Node(object), child_name)
    }
}
