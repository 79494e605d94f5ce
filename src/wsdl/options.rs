//! WSDL, codec and envelope options
//!
//! `WsdlOptions` can be built in code with the `with_*` methods or read from
//! JSON (camelCase keys, every field optional).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Deserializer applied to text whose schema type name matches the table key
pub type CustomDeserializer = Arc<dyn Fn(&str) -> Value + Send + Sync>;

/// Namespace prefixes that are never emitted on serialized elements
pub const DEFAULT_IGNORED_NAMESPACES: &[&str] = &["tns", "targetNamespace", "typedNamespace"];

/// Extra ignored namespace prefixes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IgnoredNamespaces {
    /// Prefixes to ignore
    pub namespaces: Vec<String>,
    /// Replace the default list instead of extending it
    #[serde(rename = "override")]
    pub override_defaults: bool,
}

/// `xmlns` attribute written on an overridden root element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlnsAttribute {
    /// Attribute name, e.g. `xmlns:ns`
    pub name: String,
    /// Attribute value
    pub value: String,
}

/// Root element namespace override for serialized bodies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OverrideRootElement {
    /// Prefix used on the root element
    pub namespace: String,
    /// Replaces the generated namespace declarations when non-empty
    pub xmlns_attributes: Vec<XmlnsAttribute>,
}

/// Options shared by the parser, the codec and the envelope assembler
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WsdlOptions {
    /// Fail on elements the grammar does not allow and on unresolved references
    pub strict: bool,
    /// Key holding element attributes in native values
    pub attributes_key: String,
    /// Key holding text content next to attributes
    pub value_key: String,
    /// Key holding raw XML that is emitted verbatim
    pub xml_key: String,
    /// Extra ignored namespace prefixes
    pub ignored_namespaces: Option<IgnoredNamespaces>,
    /// Drop namespaces on children resolved through base types
    pub ignore_base_namespaces: bool,
    /// Escape text content
    #[serde(rename = "escapeXML")]
    pub escape_xml: bool,
    /// Decode `xsi:nil` elements as null instead of omitting them
    pub handle_nil_as_null: bool,
    /// Repeat the element tags around every array item
    pub namespace_array_elements: bool,
    /// Keep surrounding whitespace in text content
    pub preserve_whitespace: bool,
    /// Root element namespace override
    pub override_root_element: Option<OverrideRootElement>,
    /// Emit self-closing tags for empty elements
    pub use_empty_tag: bool,
    /// Use the SOAP 1.2 envelope and content type
    pub force_soap12_headers: bool,
    /// Prefix of the envelope elements
    pub envelope_key: String,
    /// Surface message lookup failures while decoding as faults
    pub return_fault: bool,
    /// Bypass the resolved-WSDL cache
    pub disable_cache: bool,
    /// Headers sent when fetching remote documents
    #[serde(rename = "wsdl_headers")]
    pub wsdl_headers: IndexMap<String, String>,
    /// Text deserializers keyed by schema type name
    #[serde(skip)]
    pub custom_deserializers: IndexMap<String, CustomDeserializer>,
}

impl Default for WsdlOptions {
    fn default() -> Self {
        Self {
            strict: false,
            attributes_key: "attributes".to_string(),
            value_key: "$value".to_string(),
            xml_key: "$xml".to_string(),
            ignored_namespaces: None,
            ignore_base_namespaces: false,
            escape_xml: true,
            handle_nil_as_null: false,
            namespace_array_elements: true,
            preserve_whitespace: false,
            override_root_element: None,
            use_empty_tag: false,
            force_soap12_headers: false,
            envelope_key: "soap".to_string(),
            return_fault: false,
            disable_cache: false,
            wsdl_headers: IndexMap::new(),
            custom_deserializers: IndexMap::new(),
        }
    }
}

impl WsdlOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set strict parsing
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the attributes key
    pub fn with_attributes_key(mut self, key: impl Into<String>) -> Self {
        self.attributes_key = key.into();
        self
    }

    /// Set the value key
    pub fn with_value_key(mut self, key: impl Into<String>) -> Self {
        self.value_key = key.into();
        self
    }

    /// Set the raw XML key
    pub fn with_xml_key(mut self, key: impl Into<String>) -> Self {
        self.xml_key = key.into();
        self
    }

    /// Set extra ignored namespace prefixes
    pub fn with_ignored_namespaces(mut self, namespaces: Vec<String>, override_defaults: bool) -> Self {
        self.ignored_namespaces = Some(IgnoredNamespaces {
            namespaces,
            override_defaults,
        });
        self
    }

    /// Set base namespace suppression
    pub fn with_ignore_base_namespaces(mut self, ignore: bool) -> Self {
        self.ignore_base_namespaces = ignore;
        self
    }

    /// Set text escaping
    pub fn with_escape_xml(mut self, escape: bool) -> Self {
        self.escape_xml = escape;
        self
    }

    /// Set nil handling
    pub fn with_handle_nil_as_null(mut self, handle: bool) -> Self {
        self.handle_nil_as_null = handle;
        self
    }

    /// Set per-item array tags
    pub fn with_namespace_array_elements(mut self, enabled: bool) -> Self {
        self.namespace_array_elements = enabled;
        self
    }

    /// Set whitespace preservation
    pub fn with_preserve_whitespace(mut self, preserve: bool) -> Self {
        self.preserve_whitespace = preserve;
        self
    }

    /// Set the root element override
    pub fn with_override_root_element(mut self, root: OverrideRootElement) -> Self {
        self.override_root_element = Some(root);
        self
    }

    /// Set self-closing empty tags
    pub fn with_use_empty_tag(mut self, enabled: bool) -> Self {
        self.use_empty_tag = enabled;
        self
    }

    /// Select SOAP 1.2
    pub fn with_force_soap12_headers(mut self, enabled: bool) -> Self {
        self.force_soap12_headers = enabled;
        self
    }

    /// Set the envelope prefix
    pub fn with_envelope_key(mut self, key: impl Into<String>) -> Self {
        self.envelope_key = key.into();
        self
    }

    /// Set fault reporting of decode lookups
    pub fn with_return_fault(mut self, enabled: bool) -> Self {
        self.return_fault = enabled;
        self
    }

    /// Set cache bypass
    pub fn with_disable_cache(mut self, disabled: bool) -> Self {
        self.disable_cache = disabled;
        self
    }

    /// Add a header for remote document fetches
    pub fn with_wsdl_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.wsdl_headers.insert(name.into(), value.into());
        self
    }

    /// Register a text deserializer for a schema type name
    pub fn with_custom_deserializer<F>(mut self, type_name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        self.custom_deserializers.insert(type_name.into(), Arc::new(f));
        self
    }

    /// Effective ignored prefix list
    pub fn ignored_namespace_list(&self) -> Vec<String> {
        let defaults = DEFAULT_IGNORED_NAMESPACES.iter().map(|s| s.to_string());
        match &self.ignored_namespaces {
            Some(extra) if extra.override_defaults => extra.namespaces.clone(),
            Some(extra) => defaults.chain(extra.namespaces.iter().cloned()).collect(),
            None => defaults.collect(),
        }
    }

    /// The subset of options that changes how a document parses, used in cache keys
    pub fn cache_key(&self) -> String {
        match &self.ignored_namespaces {
            Some(extra) => format!(
                "{}|{}",
                extra.override_defaults,
                extra.namespaces.join(",")
            ),
            None => String::new(),
        }
    }
}

impl fmt::Debug for WsdlOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsdlOptions")
            .field("strict", &self.strict)
            .field("attributes_key", &self.attributes_key)
            .field("value_key", &self.value_key)
            .field("xml_key", &self.xml_key)
            .field("ignored_namespaces", &self.ignored_namespaces)
            .field("ignore_base_namespaces", &self.ignore_base_namespaces)
            .field("escape_xml", &self.escape_xml)
            .field("handle_nil_as_null", &self.handle_nil_as_null)
            .field("namespace_array_elements", &self.namespace_array_elements)
            .field("preserve_whitespace", &self.preserve_whitespace)
            .field("override_root_element", &self.override_root_element)
            .field("use_empty_tag", &self.use_empty_tag)
            .field("force_soap12_headers", &self.force_soap12_headers)
            .field("envelope_key", &self.envelope_key)
            .field("return_fault", &self.return_fault)
            .field("disable_cache", &self.disable_cache)
            .field("wsdl_headers", &self.wsdl_headers)
            .field(
                "custom_deserializers",
                &self.custom_deserializers.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}
