//! XML to value deserialization
//!
//! [`Decoder`] is an [`XmlHandler`] that keeps a stack of open elements, each
//! with the shape it is expected to have. Shapes come from the message that
//! matches the first Body child; before that a built-in envelope shape is used
//! so faults are recognised without any WSDL help.
//!
//! Text is coerced by the primitive type of the current shape. Repeated
//! fields become arrays, `href`/`id` references are merged once the document
//! is complete, and a Body `Fault` is raised as [`Error::Fault`].

use crate::error::{Error, Result, SoapFault};
use crate::names::{local_name, split_qname, TNS_PREFIX};
use crate::tokenizer::{tokenize_reader, tokenize_str, XmlHandler};
use crate::wsdl::describe::{element_key, type_key, ARRAY_SUFFIX};
use crate::wsdl::{Shape, Wsdl};
use crate::XSI_NAMESPACE;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::io::BufRead;
use tracing::debug;

static XML_DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<\?xml.+\?>").expect("valid XML declaration regex"));

/// Shape of the SOAP envelope itself: headers, body and fault fields
static ENVELOPE_SHAPE: Lazy<Shape> = Lazy::new(|| {
    let string = || Shape::Type("string".to_string());
    let fields = |entries: Vec<(&str, Shape)>| {
        Shape::fields(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    };
    fields(vec![(
        "Envelope",
        fields(vec![
            (
                "Header",
                fields(vec![(
                    "Security",
                    fields(vec![(
                        "UsernameToken",
                        fields(vec![("Username", string()), ("Password", string())]),
                    )]),
                )]),
            ),
            (
                "Body",
                fields(vec![(
                    "Fault",
                    fields(vec![
                        ("faultcode", string()),
                        ("faultstring", string()),
                        ("detail", string()),
                    ]),
                )]),
            ),
        ]),
    )])
});

struct Frame<'a> {
    name: String,
    object: Value,
    schema: Option<&'a Shape>,
    id: Option<String>,
    nil: bool,
}

/// Event-driven decoder for one document
pub struct Decoder<'a> {
    wsdl: &'a Wsdl,
    stack: Vec<Frame<'a>>,
    object_name: Option<String>,
    xmlns: HashMap<String, String>,
    refs: IndexMap<String, Option<Value>>,
}

impl<'a> Decoder<'a> {
    /// Decoder against the messages and types of `wsdl`
    pub fn new(wsdl: &'a Wsdl) -> Self {
        Self {
            wsdl,
            stack: vec![Frame {
                name: String::new(),
                object: Value::Object(Map::new()),
                schema: Some(&*ENVELOPE_SHAPE),
                id: None,
                nil: false,
            }],
            object_name: None,
            xmlns: HashMap::new(),
            refs: IndexMap::new(),
        }
    }

    /// Local name of the first Body child, once seen
    pub fn object_name(&self) -> Option<&str> {
        self.object_name.as_deref()
    }

    /// Shape and wire name of the message for Body child `name`.
    ///
    /// Names that match no message are tried as `{operation}Response`,
    /// `{operation}Request` or `{operation}Solicit` of the first port type.
    fn find_message(&self, name: &str) -> Result<Option<(&'a Shape, String)>> {
        let wsdl: &'a Wsdl = self.wsdl;
        let defs = &wsdl.definitions;
        if let Some(message) = defs.messages.get(name) {
            return Ok(Some((&message.shape, message.wire_name().to_string())));
        }

        let (operation, is_input) = if let Some(base) = name.strip_suffix("Response") {
            (base, false)
        } else if let Some(base) = name.strip_suffix("Request") {
            (base, true)
        } else if let Some(base) = name.strip_suffix("Solicit") {
            (base, true)
        } else {
            (name, false)
        };

        let message = defs
            .port_types
            .values()
            .next()
            .and_then(|port_type| port_type.methods.get(operation))
            .and_then(|method| {
                if is_input {
                    method.input.as_ref()
                } else {
                    method.output.as_ref()
                }
            });
        match message {
            Some(message) => Ok(Some((&message.shape, message.wire_name().to_string()))),
            None if wsdl.options.return_fault => Err(Error::Decode(format!(
                "No message found for body element {}",
                name
            ))),
            None => {
                debug!("No message found for body element {}", name);
                Ok(None)
            }
        }
    }

    fn type_description(&self, namespace: &str, name: &str) -> Option<&'a Shape> {
        let wsdl: &'a Wsdl = self.wsdl;
        let registry = &wsdl.definitions.descriptions;
        registry
            .get(&type_key(namespace, name))
            .or_else(|| registry.get(&element_key(namespace, name)))
    }

    fn set_value(&mut self, value: Value) -> Result<()> {
        let attributes_key = &self.wsdl.options.attributes_key;
        let value_key = &self.wsdl.options.value_key;
        let top = self
            .stack
            .last_mut()
            .ok_or_else(|| Error::Decode("text outside of any element".to_string()))?;
        if let Value::Object(map) = &mut top.object {
            if map.contains_key(attributes_key) {
                map.insert(value_key.clone(), value);
                return Ok(());
            }
        }
        top.object = value;
        Ok(())
    }

    /// Complete the document: merge references and unwrap the envelope
    pub fn finish(self) -> Result<Value> {
        let options = &self.wsdl.options;
        let mut root = self
            .stack
            .into_iter()
            .next()
            .map(|frame| frame.object)
            .unwrap_or(Value::Null);

        if !self.refs.is_empty() {
            merge_refs(&mut root, &self.refs, &options.attributes_key, &mut Vec::new());
        }

        let has_envelope = root.get("Envelope").map(|e| !e.is_null()).unwrap_or(false);
        if !has_envelope {
            return Ok(root);
        }
        let fault = root
            .get("Envelope")
            .and_then(|e| e.get("Body"))
            .and_then(|b| b.get("Fault"))
            .filter(|f| !f.is_null())
            .map(|f| fault_from(f, &options.value_key));
        if let Some(fault) = fault {
            return Err(fault.with_root(root).into());
        }
        Ok(root
            .get_mut("Envelope")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }
}

impl<'a> XmlHandler for Decoder<'a> {
    fn open_tag(&mut self, tag: &str, attributes: &IndexMap<String, String>) -> Result<()> {
        let wsdl: &'a Wsdl = self.wsdl;
        let registry = &wsdl.definitions.descriptions;
        let options = &wsdl.options;

        let original = local_name(tag).to_string();
        let mut name = original.clone();
        let (is_body_child, mut top_schema) = match self.stack.last() {
            Some(top) => (top.name == "Body", top.schema),
            None => return Err(Error::Decode("element outside of document".to_string())),
        };

        if self.object_name.is_none() && is_body_child && name != "Fault" {
            match self.find_message(&name)? {
                Some((shape, wire_name)) => {
                    top_schema = Some(shape);
                    name = wire_name;
                }
                None => top_schema = None,
            }
            self.object_name = Some(original.clone());
        }

        if let Some(href) = attributes.get("href") {
            let id: String = href.chars().skip(1).collect();
            self.refs.entry(id).or_insert(None);
        }
        if let Some(id) = attributes.get("id") {
            self.refs.entry(id.clone()).or_insert(None);
        }

        let mut element_attributes = Map::new();
        for (key, value) in attributes {
            if key == "xmlns" || key.starts_with("xmlns:") {
                self.xmlns.insert(local_name(key).to_string(), value.clone());
                continue;
            }
            element_attributes.insert(key.clone(), Value::String(value.clone()));
        }

        let nil = attributes.iter().any(|(key, value)| {
            let split = split_qname(key);
            split.name == "nil"
                && self.xmlns.get(split.prefix).map(String::as_str) == Some(XSI_NAMESPACE)
                && (value.to_lowercase() == "true" || value == "1")
        });

        let xsi_schema = element_attributes
            .get("xsi:type")
            .and_then(Value::as_str)
            .and_then(|xsi_type| {
                let split = split_qname(xsi_type);
                let namespace = if split.prefix == TNS_PREFIX {
                    self.xmlns.get("xmlns")
                } else {
                    self.xmlns.get(split.prefix)
                }?;
                self.type_description(namespace, split.name)
            });

        let mut object = Map::new();
        if !element_attributes.is_empty() {
            object.insert(options.attributes_key.clone(), Value::Object(element_attributes));
        }

        let schema = xsi_schema.or_else(|| {
            top_schema
                .and_then(|shape| registry.child(shape, &name))
                .map(|(child, _)| child)
        });

        self.stack.push(Frame {
            name: original,
            object: Value::Object(object),
            schema,
            id: attributes.get("id").cloned(),
            nil,
        });
        Ok(())
    }

    fn close_tag(&mut self, tag: &str) -> Result<()> {
        let wsdl: &'a Wsdl = self.wsdl;
        let registry = &wsdl.definitions.descriptions;
        let options = &wsdl.options;
        let name = local_name(tag);

        let current = match self.stack.pop() {
            Some(frame) if !self.stack.is_empty() => frame,
            _ => return Err(Error::Decode(format!("unbalanced close tag {}", tag))),
        };
        let mut object = current.object;

        if let Some(Shape::Type(type_name)) = current.schema.map(|s| registry.resolve(s)) {
            let is_string = type_name == "string" || type_name.split(':').nth(1) == Some("string");
            if is_string && is_empty_object(&object) {
                object = Value::String(String::new());
            }
        }

        if current.nil {
            if options.handle_nil_as_null {
                object = Value::Null;
            } else {
                return Ok(());
            }
        }

        if is_empty_object(&object) {
            object = Value::Null;
        }

        if let Some(id) = &current.id {
            self.refs.insert(id.clone(), Some(object.clone()));
        }

        let top = match self.stack.last_mut() {
            Some(top) => top,
            None => return Ok(()),
        };
        let array_field = top
            .schema
            .and_then(|s| registry.fields_of(s))
            .map(|m| m.fields.contains_key(&format!("{}{}", name, ARRAY_SUFFIX)))
            .unwrap_or(false);
        if let Value::Object(parent) = &mut top.object {
            attach(parent, name, object, array_field);
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<()> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        let wsdl: &'a Wsdl = self.wsdl;
        let registry = &wsdl.definitions.descriptions;
        let options = &wsdl.options;

        let top = match self.stack.last() {
            Some(top) => top,
            None => return Ok(()),
        };
        let type_name = top
            .schema
            .map(|s| registry.resolve(s))
            .and_then(Shape::as_type)
            .map(local_name)
            .unwrap_or_default();

        let deserializer = Some(type_name)
            .filter(|t| !t.is_empty())
            .and_then(|t| options.custom_deserializers.get(t));
        let value = match deserializer {
            Some(deserialize) => deserialize(trimmed),
            None => match type_name {
                "int" | "integer" => parse_int(trimmed),
                "bool" | "boolean" => Value::Bool(trimmed.to_lowercase() == "true" || trimmed == "1"),
                "dateTime" | "date" => parse_date(trimmed),
                _ => {
                    let text = if options.preserve_whitespace { text } else { trimmed };
                    match &top.object {
                        Value::String(existing) => Value::String(format!("{}{}", existing, text)),
                        _ => Value::String(text.to_string()),
                    }
                }
            },
        };
        self.set_value(value)
    }

    fn cdata(&mut self, text: &str) -> Result<()> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        if XML_DECLARATION.is_match(trimmed) {
            let value = self.wsdl.xml_to_object(trimmed)?;
            return self.set_value(value);
        }
        self.text(text)
    }
}

fn is_empty_object(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.is_empty())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Place a closed child into its parent; repeated names become arrays
fn attach(parent: &mut Map<String, Value>, name: &str, object: Value, array_field: bool) {
    match parent.get_mut(name) {
        Some(Value::Array(items)) => items.push(object),
        Some(existing) if !array_field || is_truthy(existing) => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, object]);
        }
        Some(existing) => *existing = Value::Array(vec![object]),
        None if array_field => {
            parent.insert(name.to_string(), Value::Array(vec![object]));
        }
        None => {
            parent.insert(name.to_string(), object);
        }
    }
}

/// Leading-integer parse; text without leading digits becomes null
fn parse_int(text: &str) -> Value {
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-') | Some(b'+')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return Value::Null;
    }
    let number = &text[..end];
    match number.parse::<i64>() {
        Ok(n) => Value::Number(n.into()),
        Err(_) => number
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    }
}

/// Date or date-time as RFC 3339 UTC with milliseconds; unparsable text becomes null.
/// Values without an offset are taken as UTC.
fn parse_date(text: &str) -> Value {
    let parsed = DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc())
        });
    match parsed {
        Some(dt) => Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => Value::Null,
    }
}

/// Copy the fields of referenced objects onto every object whose `href` points at them
fn merge_refs(
    value: &mut Value,
    refs: &IndexMap<String, Option<Value>>,
    attributes_key: &str,
    expanding: &mut Vec<String>,
) {
    match value {
        Value::Object(map) => {
            let href = map
                .get(attributes_key)
                .and_then(|a| a.get("href"))
                .and_then(Value::as_str)
                .map(|h| h.chars().skip(1).collect::<String>());
            let mut expanded = false;
            if let Some(id) = href {
                if !expanding.contains(&id) {
                    if let Some(Some(Value::Object(source))) = refs.get(&id) {
                        for (key, field) in source {
                            map.insert(key.clone(), field.clone());
                        }
                        expanding.push(id);
                        expanded = true;
                    }
                }
            }
            for child in map.values_mut() {
                merge_refs(child, refs, attributes_key, expanding);
            }
            if expanded {
                expanding.pop();
            }
        }
        Value::Array(items) => {
            for item in items {
                merge_refs(item, refs, attributes_key, expanding);
            }
        }
        _ => {}
    }
}

fn fault_text(value: &Value, value_key: &str) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .first()
            .map(|first| fault_text(first, value_key))
            .unwrap_or_default(),
        Value::Object(map) => match map.get(value_key) {
            Some(inner) => fault_text(inner, value_key),
            None => value.to_string(),
        },
    }
}

/// Fault fields from a SOAP 1.1 (`faultcode`) or SOAP 1.2 (`Code`/`Reason`) body
fn fault_from(fault: &Value, value_key: &str) -> SoapFault {
    let text = |v: Option<&Value>| {
        v.map(|v| fault_text(v, value_key))
            .filter(|s| !s.is_empty())
    };

    if fault.get("Code").is_some() || fault.get("Reason").is_some() {
        let code = fault.get("Code");
        let mut soap_fault = SoapFault::new(
            text(code.and_then(|c| c.get("Value"))).unwrap_or_default(),
            text(fault.get("Reason").and_then(|r| r.get("Text"))).unwrap_or_default(),
        );
        soap_fault.subcode = text(
            code.and_then(|c| c.get("Subcode"))
                .and_then(|s| s.get("Value")),
        );
        soap_fault.detail = text(fault.get("Detail"));
        return soap_fault;
    }

    let mut soap_fault = SoapFault::new(
        text(fault.get("faultcode")).unwrap_or_default(),
        text(fault.get("faultstring")).unwrap_or_default(),
    );
    soap_fault.detail = text(fault.get("detail"));
    soap_fault
}

fn invalid_xml(err: Error) -> Error {
    match err {
        Error::Xml(message) | Error::Decode(message) => SoapFault::new("500", "Invalid XML")
            .with_detail(message)
            .with_status(500)
            .into(),
        other => other,
    }
}

impl Wsdl {
    /// Decode a SOAP document. Returns the envelope content, or the bare
    /// root when the document is not an envelope.
    pub fn xml_to_object(&self, xml: &str) -> Result<Value> {
        let mut decoder = Decoder::new(self);
        tokenize_str(xml, &mut decoder, &self.limits).map_err(invalid_xml)?;
        decoder.finish()
    }

    /// Decode a SOAP document read incrementally from `source`
    pub fn xml_to_object_reader<R: BufRead>(&self, source: R) -> Result<Value> {
        let mut decoder = Decoder::new(self);
        tokenize_reader(source, &mut decoder, &self.limits).map_err(invalid_xml)?;
        decoder.finish()
    }
}
