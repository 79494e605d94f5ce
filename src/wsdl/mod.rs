//! WSDL loading and the resolved service model
//!
//! [`Wsdl`] ties the pipeline together: a document is parsed into definition
//! tables, its includes and imports are loaded and merged in declaration
//! order, and the merged tables are resolved into [`Definitions`]. The result
//! is immutable and shared by the codec, the client and the server.
//!
//! # Example
//!
//! ```no_run
//! use soapwire::{Loader, Wsdl, WsdlCache, WsdlOptions};
//!
//! # async fn example() -> soapwire::Result<()> {
//! let wsdl = Wsdl::load(
//!     "service.wsdl",
//!     WsdlOptions::default(),
//!     &Loader::new(),
//!     &WsdlCache::new(),
//! )
//! .await?;
//! println!("{}", wsdl.describe_services());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod definitions;
pub mod describe;
pub mod nodes;
pub mod options;
pub mod parsing;
pub mod resolver;

pub use cache::{CacheKey, WsdlCache};
pub use definitions::{
    Binding, Definitions, Include, LookupType, Message, MessageBody, MessageElement, Operation,
    ParsedDefinitions, Part, Port, PortType, Schema, Service, TopElement,
};
pub use describe::{DescriptionRegistry, Shape, ShapeMap, TypeRef};
pub use nodes::{Node, NodeKind, SoapBody};
pub use options::{IgnoredNamespaces, OverrideRootElement, WsdlOptions, XmlnsAttribute};

use crate::error::Result;
use crate::limits::Limits;
use crate::loaders::Loader;
use crate::locations::Location;
use crate::names::{local_name, no_colon, TNS_PREFIX};
use async_recursion::async_recursion;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Namespaces never repeated on the envelope
const ENVELOPE_SKIPPED_NAMESPACES: &[&str] = &[
    "http://xml.apache.org/xml-soap",
    "http://schemas.xmlsoap.org/wsdl/",
    "http://schemas.xmlsoap.org/wsdl/soap/",
    "http://schemas.xmlsoap.org/wsdl/soap12/",
    "http://schemas.xmlsoap.org/soap/encoding/",
    "http://www.w3.org/2001/XMLSchema",
];

const ENVELOPE_SKIPPED_PREFIXES: &[&str] = &[
    "http://schemas.xmlsoap.org/",
    "http://www.w3.org/",
    "http://xml.apache.org/",
];

/// A loaded and resolved WSDL document
#[derive(Debug)]
pub struct Wsdl {
    uri: Option<String>,
    xml: String,
    pub(crate) options: WsdlOptions,
    pub(crate) definitions: Definitions,
    pub(crate) ignored_namespaces: Vec<String>,
    pub(crate) limits: Limits,
    xmlns_in_envelope: String,
}

impl Wsdl {
    /// Load a WSDL from a file path or http(s) URL.
    ///
    /// Resolved documents are shared through `cache` unless
    /// [`WsdlOptions::disable_cache`] is set.
    pub async fn load(
        uri: &str,
        options: WsdlOptions,
        loader: &Loader,
        cache: &WsdlCache,
    ) -> Result<Arc<Wsdl>> {
        let location = Location::parse(uri)?;
        let key = CacheKey::new(location.as_str(), options.cache_key());
        if !options.disable_cache {
            if let Some(wsdl) = cache.wsdl(&key).await {
                return Ok(wsdl);
            }
        }

        info!("Loading WSDL from {}", location);
        let loader = loader.clone().with_headers(options.wsdl_headers.clone());
        let xml = loader.load(&location).await?;
        let wsdl = Arc::new(Self::build(xml, Some(location), options, &loader, cache).await?);
        if wsdl.options.disable_cache {
            return Ok(wsdl);
        }
        Ok(cache.store_wsdl(key, wsdl).await)
    }

    /// Build a WSDL from text. Relative includes resolve against `base_uri`,
    /// or against the working directory when it is absent.
    pub async fn from_xml(
        xml: &str,
        base_uri: Option<&str>,
        options: WsdlOptions,
        loader: &Loader,
        cache: &WsdlCache,
    ) -> Result<Wsdl> {
        let location = base_uri.map(Location::parse).transpose()?;
        let xml = crate::loaders::strip_bom(xml.to_string());
        Self::build(xml, location, options, loader, cache).await
    }

    async fn build(
        xml: String,
        location: Option<Location>,
        options: WsdlOptions,
        loader: &Loader,
        cache: &WsdlCache,
    ) -> Result<Wsdl> {
        let parsed = parsing::parse_definitions(&xml, options.strict, loader.limits())?;
        if let Some(location) = &location {
            let key = CacheKey::new(location.as_str(), options.cache_key());
            cache.store_document(key, Arc::new(parsed.clone())).await;
        }
        let parsed = process_includes(parsed, location.as_ref(), &options, loader, cache, 1).await?;

        let ignored_namespaces = options.ignored_namespace_list();
        let definitions = resolver::resolve(parsed, &ignored_namespaces, options.strict)?;
        let xmlns_in_envelope = xmlns_map(&definitions.xmlns);

        Ok(Wsdl {
            uri: location.map(|l| l.as_str()),
            xml,
            options,
            definitions,
            ignored_namespaces,
            limits: loader.limits().clone(),
            xmlns_in_envelope,
        })
    }

    /// Location the document was loaded from
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Options the document was loaded with
    pub fn options(&self) -> &WsdlOptions {
        &self.options
    }

    /// Resolved definitions
    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    /// Source document text
    pub fn to_xml(&self) -> &str {
        &self.xml
    }

    /// Root namespace declarations repeated on request envelopes, as
    /// ` xmlns:prefix="uri"` attributes
    pub fn xmlns_in_envelope(&self) -> &str {
        &self.xmlns_in_envelope
    }

    /// Describe every service as `{service: {port: {operation: {input, output}}}}`
    pub fn describe_services(&self) -> Value {
        let registry = &self.definitions.descriptions;
        let describe = |message: Option<&Arc<Message>>| -> Value {
            message
                .and_then(|m| registry.fields_of(&m.shape))
                .and_then(|m| m.fields.values().next())
                .map(|shape| registry.to_json(shape))
                .unwrap_or(Value::Null)
        };

        let mut services = Map::new();
        for (service_name, service) in &self.definitions.services {
            let mut ports = Map::new();
            for (port_name, port) in &service.ports {
                let mut methods = Map::new();
                for (method_name, method) in &port.binding.methods {
                    let mut io = Map::new();
                    io.insert("input".to_string(), describe(method.input.as_ref()));
                    io.insert("output".to_string(), describe(method.output.as_ref()));
                    methods.insert(method_name.clone(), Value::Object(io));
                }
                ports.insert(port_name.clone(), Value::Object(methods));
            }
            services.insert(service_name.clone(), Value::Object(ports));
        }
        Value::Object(services)
    }

    /// Complex type `name` in the schema of `namespace`
    pub fn find_schema_type(&self, name: &str, namespace: Option<&str>) -> Option<&Arc<Node>> {
        self.definitions
            .schemas
            .get(namespace?)?
            .complex_types
            .get(name)
    }

    /// Complex type, simple type or element `qname` (prefix ignored) in the
    /// schema of `namespace`
    pub fn find_schema_object(&self, namespace: Option<&str>, qname: &str) -> Option<&Arc<Node>> {
        if qname.is_empty() {
            return None;
        }
        let name = match qname.find(':') {
            Some(_) => local_name(qname),
            None => qname,
        };
        self.definitions.schemas.get(namespace?)?.find(name)
    }

    /// Whether `prefix` is in the ignored namespace list
    pub fn is_ignored_namespace(&self, prefix: &str) -> bool {
        self.ignored_namespaces.iter().any(|p| p == prefix)
    }

    /// `prefix` without its trailing colon, or empty when it is ignored
    pub fn filter_out_ignored_namespace<'p>(&self, prefix: &'p str) -> &'p str {
        let prefix = no_colon(prefix);
        if self.is_ignored_namespace(prefix) {
            ""
        } else {
            prefix
        }
    }

    /// Target namespace of the root document
    pub fn target_namespace(&self) -> Option<&str> {
        self.definitions.target_namespace.as_deref()
    }
}

/// Load and merge the includes of `defs`, one at a time in declaration order
#[async_recursion]
async fn process_includes(
    mut defs: ParsedDefinitions,
    base: Option<&Location>,
    options: &WsdlOptions,
    loader: &Loader,
    cache: &WsdlCache,
    depth: usize,
) -> Result<ParsedDefinitions> {
    for include in defs.includes() {
        loader.limits().check_include_depth(depth)?;
        let location = match base {
            Some(base) => base.resolve(&include.location)?,
            None => Location::parse(&include.location)?,
        };
        let included = load_document(&location, options, loader, cache, depth + 1).await?;
        defs.merge_included(&included, include.namespace.as_deref());
    }
    Ok(defs)
}

/// Parse one included document, reusing the cached copy when present.
///
/// The document is cached before its own includes are followed, so a cycle
/// gets the not yet merged tables instead of recursing.
#[async_recursion]
async fn load_document(
    location: &Location,
    options: &WsdlOptions,
    loader: &Loader,
    cache: &WsdlCache,
    depth: usize,
) -> Result<Arc<ParsedDefinitions>> {
    let key = CacheKey::new(location.as_str(), options.cache_key());
    if let Some(defs) = cache.document(&key).await {
        return Ok(defs);
    }

    debug!("Resolving include {}", location);
    let xml = loader.load(location).await?;
    let parsed = parsing::parse_definitions(&xml, options.strict, loader.limits())?;
    cache.store_document(key.clone(), Arc::new(parsed.clone())).await;

    let merged = Arc::new(process_includes(parsed, Some(location), options, loader, cache, depth).await?);
    cache.store_document(key, merged.clone()).await;
    Ok(merged)
}

fn xmlns_map(xmlns: &IndexMap<String, String>) -> String {
    let mut out = String::new();
    for (alias, ns) in xmlns {
        if alias.is_empty() || alias == TNS_PREFIX {
            continue;
        }
        if ENVELOPE_SKIPPED_NAMESPACES.contains(&ns.as_str())
            || ENVELOPE_SKIPPED_PREFIXES.iter().any(|p| ns.starts_with(p))
        {
            continue;
        }
        out.push_str(&format!(" xmlns:{}=\"{}\"", alias, ns));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HELLO_WSDL: &str = r#"<definitions name="Hello" targetNamespace="urn:hello"
    xmlns="http://schemas.xmlsoap.org/wsdl/"
    xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
    xmlns:tns="urn:hello"
    xmlns:ext="urn:extra"
    xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <types>
    <xs:schema targetNamespace="urn:hello" elementFormDefault="qualified">
      <xs:element name="SayHello">
        <xs:complexType><xs:sequence>
          <xs:element name="name" type="xs:string"/>
          <xs:element name="tags" type="xs:string" maxOccurs="unbounded"/>
        </xs:sequence></xs:complexType>
      </xs:element>
      <xs:element name="SayHelloResponse">
        <xs:complexType><xs:sequence><xs:element name="greeting" type="xs:string"/></xs:sequence></xs:complexType>
      </xs:element>
    </xs:schema>
  </types>
  <message name="SayHelloIn"><part name="p" element="tns:SayHello"/></message>
  <message name="SayHelloOut"><part name="p" element="tns:SayHelloResponse"/></message>
  <portType name="HelloPort">
    <operation name="SayHello"><input message="tns:SayHelloIn"/><output message="tns:SayHelloOut"/></operation>
  </portType>
  <binding name="HelloBinding" type="tns:HelloPort">
    <soap:binding transport="http://schemas.xmlsoap.org/soap/http"/>
    <operation name="SayHello"><soap:operation soapAction="hello"/></operation>
  </binding>
  <service name="HelloService">
    <port name="HelloPort" binding="tns:HelloBinding"><soap:address location="http://localhost/hello"/></port>
  </service>
</definitions>"#;

    async fn hello() -> Wsdl {
        Wsdl::from_xml(
            HELLO_WSDL,
            None,
            WsdlOptions::default(),
            &Loader::new(),
            &WsdlCache::new(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_describe_services() {
        let wsdl = hello().await;
        let description = wsdl.describe_services();
        let method = &description["HelloService"]["HelloPort"]["SayHello"];
        assert_eq!(method["input"]["name"], json!("xs:string"));
        assert_eq!(method["input"]["tags[]"], json!("xs:string"));
        assert_eq!(method["output"]["greeting"], json!("xs:string"));
    }

    #[tokio::test]
    async fn test_xmlns_in_envelope() {
        let wsdl = hello().await;
        assert_eq!(
            wsdl.xmlns_in_envelope(),
            r#" xmlns:tns="urn:hello" xmlns:ext="urn:extra""#
        );
    }

    #[tokio::test]
    async fn test_lookups_and_ignored_namespaces() {
        let wsdl = hello().await;
        assert!(wsdl.find_schema_object(Some("urn:hello"), "tns:SayHello").is_some());
        assert!(wsdl.find_schema_type("SayHello", Some("urn:hello")).is_none());
        assert!(wsdl.find_schema_object(None, "SayHello").is_none());
        assert!(wsdl.is_ignored_namespace("tns"));
        assert_eq!(wsdl.filter_out_ignored_namespace("tns:"), "");
        assert_eq!(wsdl.filter_out_ignored_namespace("ext:"), "ext");
        assert_eq!(wsdl.to_xml(), HELLO_WSDL);
    }
}
