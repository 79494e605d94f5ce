//! Cross-reference resolution
//!
//! Turns merged [`ParsedDefinitions`] into [`Definitions`]: messages are bound
//! to schema elements or typed parts, port type operations to their messages,
//! bindings to port types (with the binding's SOAP settings applied to a copy
//! of each operation), and services to bindings. Document style bindings get
//! their input element routing table.

use crate::error::{Error, Result};
use crate::names::{local_name, split_qname};
use crate::wsdl::definitions::{
    Binding, Definitions, LookupType, Message, MessageBody, MessageElement, Operation,
    ParsedDefinitions, Part, Port, PortType, Service, TopElement,
};
use crate::wsdl::describe::{DescriptionRegistry, Describer, Shape};
use crate::wsdl::nodes::{wsdl_elements, Node, NodeData, NodeKind, SoapBody};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default binding style
pub const DEFAULT_STYLE: &str = "document";

/// Resolve merged definitions.
///
/// `ignored_prefixes` are type prefixes skipped when collecting a message
/// element's lookup types. In strict mode a reference to a missing element,
/// message or port type fails; otherwise it is logged and left empty.
pub fn resolve(parsed: ParsedDefinitions, ignored_prefixes: &[String], strict: bool) -> Result<Definitions> {
    let mut registry = DescriptionRegistry::new();
    let (messages, port_types, bindings, services) = {
        let mut resolver = Resolver {
            parsed: &parsed,
            describer: Describer::new(&parsed.schemas, &parsed.xmlns, &mut registry),
            ignored_prefixes,
            strict,
        };
        let messages = resolver.resolve_messages()?;
        resolver.describer.describe_schemas();
        let port_types = resolver.resolve_port_types(&messages)?;
        let bindings = resolver.resolve_bindings(&port_types)?;
        let services = resolver.resolve_services(&bindings);
        (messages, port_types, bindings, services)
    };

    debug!(
        "Resolved {} messages, {} bindings, {} services, {} described types",
        messages.len(),
        bindings.len(),
        services.len(),
        registry.len()
    );

    Ok(Definitions {
        name: parsed.name,
        target_namespace: parsed.target_namespace,
        xmlns: parsed.xmlns,
        schemas: parsed.schemas,
        messages,
        port_types,
        bindings,
        services,
        descriptions: registry,
    })
}

struct Resolver<'a> {
    parsed: &'a ParsedDefinitions,
    describer: Describer<'a>,
    ignored_prefixes: &'a [String],
    strict: bool,
}

impl<'a> Resolver<'a> {
    fn unresolved(&self, message: String) -> Result<()> {
        if self.strict {
            return Err(Error::UnresolvedReference(message));
        }
        warn!("{}", message);
        Ok(())
    }

    fn namespace_of(&self, prefix: &str, node: &Node) -> Option<String> {
        node.xmlns
            .get(prefix)
            .or_else(|| self.parsed.xmlns.get(prefix))
            .cloned()
    }

    fn resolve_messages(&mut self) -> Result<IndexMap<String, Arc<Message>>> {
        let mut messages = IndexMap::new();
        let mut aliases = Vec::new();
        let parsed = self.parsed;
        for (name, node) in &parsed.messages {
            let message = Arc::new(self.resolve_message(name, node)?);
            if let Some(element) = message.element() {
                aliases.push((element.name().to_string(), message.clone()));
            }
            messages.insert(name.clone(), message);
        }
        for (name, message) in aliases {
            messages.entry(name).or_insert(message);
        }
        Ok(messages)
    }

    fn resolve_message(&mut self, name: &str, node: &Node) -> Result<Message> {
        let part = node
            .children
            .iter()
            .find(|c| c.local_name == wsdl_elements::PART);
        let part = match part {
            Some(part) => part,
            None => {
                return Ok(Message {
                    name: name.to_string(),
                    body: MessageBody::Empty,
                    shape: wrap(name, Shape::empty()),
                })
            }
        };

        if let Some(element_ref) = part.attr("element") {
            return self.resolve_element_message(name, node, element_ref);
        }

        let mut parts = IndexMap::new();
        let mut shapes = IndexMap::new();
        for part in &node.children {
            if part.kind == NodeKind::Documentation {
                continue;
            }
            if part.local_name != wsdl_elements::PART {
                debug!("Skipping {} inside message {}", part.qualified_name, name);
                continue;
            }
            let part_name = part.name().unwrap_or_default().to_string();
            let type_name = part
                .type_name()
                .or_else(|| part.attr("element"))
                .unwrap_or_default();
            let split = split_qname(type_name);
            let namespace = self.namespace_of(split.prefix, part);
            let found = namespace.as_deref().and_then(|ns| {
                let schema = self.parsed.schemas.get(ns)?;
                schema
                    .types
                    .get(split.name)
                    .or_else(|| schema.complex_types.get(split.name))
                    .cloned()
            });
            let (resolved, shape) = match (found, namespace) {
                (Some(type_node), Some(ns)) => {
                    let shape = self
                        .describer
                        .describe_type(&ns, split.name, Some(split.prefix))
                        .unwrap_or_else(|| Shape::Type(type_name.to_string()));
                    (
                        Part::Type {
                            node: type_node,
                            prefix: split.prefix.to_string(),
                            namespace: Some(ns),
                        },
                        shape,
                    )
                }
                _ => (
                    Part::Name(type_name.to_string()),
                    Shape::Type(type_name.to_string()),
                ),
            };
            shapes.insert(part_name.clone(), shape);
            parts.insert(part_name, resolved);
        }

        Ok(Message {
            name: name.to_string(),
            body: MessageBody::Parts(parts),
            shape: wrap(name, Shape::fields(shapes)),
        })
    }

    fn resolve_element_message(&mut self, name: &str, node: &Node, element_ref: &str) -> Result<Message> {
        let split = split_qname(element_ref);
        let namespace = self.namespace_of(split.prefix, node);
        let element = namespace
            .as_deref()
            .and_then(|ns| self.parsed.schemas.get(ns))
            .and_then(|schema| schema.elements.get(split.name))
            .cloned();

        let (element, ns) = match (element, namespace) {
            (Some(element), Some(ns)) => (element, ns),
            _ => {
                self.unresolved(format!(
                    "{} is not present in wsdl and cannot be processed correctly.",
                    split.name
                ))?;
                return Ok(Message {
                    name: name.to_string(),
                    body: MessageBody::Empty,
                    shape: wrap(name, Shape::empty()),
                });
            }
        };

        let schema_xmlns = self
            .parsed
            .schemas
            .get(&ns)
            .map(|s| s.xmlns.clone())
            .unwrap_or_default();
        let mut lookup_types = Vec::new();
        for child in &element.children {
            self.collect_lookup_types(child, &schema_xmlns, &mut lookup_types);
        }

        let parts = self
            .describer
            .describe_element(&ns, split.name, Some(split.prefix))
            .unwrap_or_else(Shape::empty);
        let element_name = element.name().unwrap_or(split.name).to_string();

        Ok(Message {
            name: name.to_string(),
            shape: wrap(&element_name, parts.clone()),
            body: MessageBody::Element(MessageElement {
                node: element,
                target_ns_alias: split.prefix.to_string(),
                target_namespace: Some(ns),
                lookup_type: element_ref.to_string(),
                lookup_types,
                parts: Some(parts),
            }),
        })
    }

    /// Depth-first collection of descendants typed outside the ignored prefixes
    fn collect_lookup_types(&self, node: &Node, xmlns: &IndexMap<String, String>, out: &mut Vec<LookupType>) {
        if let Some(type_name) = node.type_name() {
            let prefix = split_qname(type_name).prefix;
            let excluded = prefix == "xs" || self.ignored_prefixes.iter().any(|p| p == prefix);
            if !excluded {
                out.push(LookupType {
                    name: node.name().unwrap_or_default().to_string(),
                    type_name: type_name.to_string(),
                    namespace: xmlns.get(prefix).cloned(),
                });
            }
        }
        for child in &node.children {
            self.collect_lookup_types(child, xmlns, out);
        }
    }

    fn resolve_port_types(
        &mut self,
        messages: &IndexMap<String, Arc<Message>>,
    ) -> Result<IndexMap<String, PortType>> {
        let mut port_types = IndexMap::new();
        let parsed = self.parsed;
        for (name, node) in &parsed.port_types {
            let mut methods = IndexMap::new();
            for op in node.children_of(NodeKind::Operation) {
                let op_name = op.name().unwrap_or_default().to_string();
                let mut operation = Operation {
                    name: op_name.clone(),
                    ..Operation::default()
                };
                for io in &op.children {
                    if !matches!(io.kind, NodeKind::Input | NodeKind::Output) {
                        continue;
                    }
                    let message_name = local_name(io.attr("message").unwrap_or_default());
                    let message = messages.get(message_name).cloned();
                    if message.is_none() {
                        self.unresolved(format!(
                            "Message {} of operation {} not found",
                            message_name, op_name
                        ))?;
                    }
                    if io.kind == NodeKind::Input {
                        operation.input = message;
                    } else {
                        operation.output = message;
                    }
                }
                methods.insert(op_name, Arc::new(operation));
            }
            port_types.insert(
                name.clone(),
                PortType {
                    name: name.clone(),
                    methods,
                },
            );
        }
        Ok(port_types)
    }

    fn resolve_bindings(
        &mut self,
        port_types: &IndexMap<String, PortType>,
    ) -> Result<IndexMap<String, Arc<Binding>>> {
        let mut bindings = IndexMap::new();
        let parsed = self.parsed;
        for (name, node) in &parsed.bindings {
            let (transport, style) = match &node.data {
                NodeData::Binding { transport, style } => (transport.clone(), style.clone()),
                _ => (None, None),
            };
            let style = style.unwrap_or_else(|| DEFAULT_STYLE.to_string());
            let port_type_name = local_name(node.type_name().unwrap_or_default());

            let mut methods: IndexMap<String, Operation> = IndexMap::new();
            match port_types.get(port_type_name) {
                Some(port_type) => {
                    for (op_name, op) in &port_type.methods {
                        let mut op = (**op).clone();
                        op.style = style.clone();
                        methods.insert(op_name.clone(), op);
                    }
                }
                None => self.unresolved(format!(
                    "PortType {} of binding {} not found",
                    port_type_name, name
                ))?,
            }

            for op in node.children_of(NodeKind::Operation) {
                let method = match op.name().and_then(|n| methods.get_mut(n)) {
                    Some(method) => method,
                    None => continue,
                };
                if let NodeData::Operation { soap_action, style: op_style } = &op.data {
                    method.soap_action = soap_action.clone();
                    if let Some(op_style) = op_style {
                        method.style = op_style.clone();
                    }
                }
                method.input_soap = soap_body(op, NodeKind::Input);
                method.output_soap = soap_body(op, NodeKind::Output);
            }

            let mut top_elements = IndexMap::new();
            if style == DEFAULT_STYLE {
                for (method_name, method) in &methods {
                    if let Some(input) = &method.input {
                        top_elements.insert(
                            input.wire_name().to_string(),
                            TopElement {
                                method_name: method_name.clone(),
                                output_name: method
                                    .output
                                    .as_ref()
                                    .map(|o| o.wire_name().to_string())
                                    .unwrap_or_default(),
                            },
                        );
                    }
                }
            }

            bindings.insert(
                name.clone(),
                Arc::new(Binding {
                    name: name.clone(),
                    style,
                    transport: transport.unwrap_or_default(),
                    methods: methods.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
                    top_elements,
                }),
            );
        }
        Ok(bindings)
    }

    fn resolve_services(&self, bindings: &IndexMap<String, Arc<Binding>>) -> IndexMap<String, Service> {
        let mut services = IndexMap::new();
        for (name, node) in &self.parsed.services {
            let mut ports = IndexMap::new();
            for port in node.children_of(NodeKind::Port) {
                let port_name = port.name().unwrap_or_default().to_string();
                let binding_name = local_name(port.attr("binding").unwrap_or_default());
                let binding = match bindings.get(binding_name) {
                    Some(binding) => binding.clone(),
                    None => {
                        debug!("Skipping port {} with unknown binding {}", port_name, binding_name);
                        continue;
                    }
                };
                let location = match &port.data {
                    NodeData::Port { location } => location.clone(),
                    _ => None,
                };
                ports.insert(
                    port_name.clone(),
                    Port {
                        name: port_name,
                        location,
                        binding,
                    },
                );
            }
            services.insert(
                name.clone(),
                Service {
                    name: name.clone(),
                    ports,
                },
            );
        }
        services
    }
}

fn wrap(name: &str, content: Shape) -> Shape {
    let mut fields = IndexMap::new();
    fields.insert(name.to_string(), content);
    Shape::fields(fields)
}

fn soap_body(op: &Node, kind: NodeKind) -> Option<SoapBody> {
    op.children_of(kind).next().map(|io| match &io.data {
        NodeData::Body(body) => body.clone(),
        _ => SoapBody::default(),
    })
}
