//! SOAP client
//!
//! A [`Client`] turns an operation call into an envelope, hands it to the
//! [`Transport`], and decodes the reply against the operation's output
//! message.
//!
//! # Example
//!
//! ```no_run
//! use soapwire::{Client, ClientOptions, RequestOptions, WsdlCache, WsdlOptions};
//! use soapwire::transport::Transport;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example(transport: Arc<dyn Transport>) -> soapwire::Result<()> {
//! let client = Client::create(
//!     "http://example.com/calc?wsdl",
//!     WsdlOptions::default(),
//!     ClientOptions::default(),
//!     &WsdlCache::new(),
//!     transport,
//! )
//! .await?;
//! let response = client
//!     .call("Add", &json!({"a": 1, "b": 2}), RequestOptions::new(), None)
//!     .await?;
//! println!("{}", response.result);
//! # Ok(())
//! # }
//! ```

use crate::codec::Encoder;
use crate::envelope::{soap_action, RequestEnvelope, SoapVersion};
use crate::error::{Error, Result};
use crate::loaders::Loader;
use crate::names::{find_prefix, normalize_identifier};
use crate::security::Security;
use crate::transport::{extract_envelope, RequestOptions, Transport};
use crate::wsdl::{Message, Operation, Wsdl, WsdlCache, WsdlOptions};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

const STREAM_BODY: &str = "<stream>";

/// Client settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientOptions {
    /// Endpoint used instead of the port addresses
    pub endpoint: Option<String>,
    /// Decode element-based responses while they are read
    pub stream: bool,
    /// Match method names with non-identifier characters replaced by `_`
    pub normalize_names: bool,
}

impl ClientOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the endpoint of every port
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Enable streaming response decoding
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Enable normalized method names
    pub fn with_normalize_names(mut self, normalize: bool) -> Self {
        self.normalize_names = normalize;
        self
    }
}

/// Result of a successful call
#[derive(Debug, Clone)]
pub struct CallResponse {
    /// Decoded result; null for one-way operations
    pub result: Value,
    /// Raw response body (`<stream>` when decoded while streaming)
    pub body: String,
    /// Decoded SOAP header of the response
    pub header: Option<Value>,
    /// Envelope that was sent
    pub request: String,
    /// HTTP status of the response
    pub status: u16,
}

/// The most recent exchange, kept for inspection
#[derive(Debug, Clone, Default)]
pub struct LastExchange {
    /// Exchange id
    pub exchange_id: Option<String>,
    /// Body fragment of the last request
    pub message: Option<String>,
    /// Full envelope of the last request
    pub request: Option<String>,
    /// Endpoint of the last request
    pub endpoint: Option<String>,
    /// HTTP headers of the last request
    pub request_headers: IndexMap<String, String>,
    /// Raw body of the last response
    pub response: Option<String>,
    /// HTTP headers of the last response
    pub response_headers: IndexMap<String, String>,
}

/// SOAP client bound to one resolved WSDL
pub struct Client {
    wsdl: Arc<Wsdl>,
    transport: Arc<dyn Transport>,
    options: ClientOptions,
    endpoint: Option<String>,
    soap_action: Option<String>,
    soap_headers: Vec<String>,
    http_headers: IndexMap<String, String>,
    body_attributes: Vec<String>,
    security: Option<Arc<dyn Security>>,
    last: Mutex<LastExchange>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("wsdl", &self.wsdl.uri())
            .field("options", &self.options)
            .field("endpoint", &self.endpoint)
            .field("soap_headers", &self.soap_headers)
            .field("http_headers", &self.http_headers)
            .field("security", &self.security)
            .finish()
    }
}

impl Client {
    /// Client for an already loaded WSDL
    pub fn new(wsdl: Arc<Wsdl>, transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        let endpoint = options.endpoint.clone();
        Self {
            wsdl,
            transport,
            options,
            endpoint,
            soap_action: None,
            soap_headers: Vec::new(),
            http_headers: IndexMap::new(),
            body_attributes: Vec::new(),
            security: None,
            last: Mutex::new(LastExchange::default()),
        }
    }

    /// Load the WSDL at `url` through `transport` and build a client for it
    pub async fn create(
        url: &str,
        wsdl_options: WsdlOptions,
        options: ClientOptions,
        cache: &WsdlCache,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let loader = Loader::new().with_transport(transport.clone());
        let wsdl = Wsdl::load(url, wsdl_options, &loader, cache).await?;
        Ok(Self::new(wsdl, transport, options))
    }

    /// The resolved WSDL
    pub fn wsdl(&self) -> &Arc<Wsdl> {
        &self.wsdl
    }

    /// Services, ports and operations with their input/output shapes
    pub fn describe(&self) -> Value {
        self.wsdl.describe_services()
    }

    /// Add a SOAP header. A string is used as raw XML; anything else is
    /// rendered as element `name`. Returns the header's index.
    pub fn add_soap_header(
        &mut self,
        header: &Value,
        name: &str,
        namespace: &str,
        xmlns: Option<&str>,
    ) -> usize {
        let xml = self.render_soap_header(header, name, namespace, xmlns);
        self.soap_headers.push(xml);
        self.soap_headers.len() - 1
    }

    /// Replace the header at `index`; out of range indexes append
    pub fn change_soap_header(
        &mut self,
        index: usize,
        header: &Value,
        name: &str,
        namespace: &str,
        xmlns: Option<&str>,
    ) {
        let xml = self.render_soap_header(header, name, namespace, xmlns);
        match self.soap_headers.get_mut(index) {
            Some(slot) => *slot = xml,
            None => self.soap_headers.push(xml),
        }
    }

    /// Rendered SOAP headers
    pub fn soap_headers(&self) -> &[String] {
        &self.soap_headers
    }

    /// Remove all SOAP headers
    pub fn clear_soap_headers(&mut self) {
        self.soap_headers.clear();
    }

    fn render_soap_header(&self, header: &Value, name: &str, namespace: &str, xmlns: Option<&str>) -> String {
        match header {
            Value::String(xml) => xml.clone(),
            other => Encoder::new(&self.wsdl, None).encode(other, Some(name), namespace, xmlns, true, None),
        }
    }

    /// Add an HTTP header sent with every call
    pub fn add_http_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.http_headers.insert(name.into(), value.into());
    }

    /// HTTP headers sent with every call
    pub fn http_headers(&self) -> &IndexMap<String, String> {
        &self.http_headers
    }

    /// Remove all HTTP headers
    pub fn clear_http_headers(&mut self) {
        self.http_headers.clear();
    }

    /// Add attributes to the `Body` tag. An object contributes one
    /// `name="value"` pair per field; a string is used as written.
    pub fn add_body_attribute(&mut self, attribute: &Value) {
        let mut text = match attribute {
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| format!(" {}=\"{}\"", k, crate::codec::scalar_text(v)))
                .collect::<String>(),
            other => crate::codec::scalar_text(other),
        };
        if !text.starts_with(' ') {
            text.insert(0, ' ');
        }
        self.body_attributes.push(text);
    }

    /// Attributes written on the `Body` tag
    pub fn body_attributes(&self) -> &[String] {
        &self.body_attributes
    }

    /// Remove all body attributes
    pub fn clear_body_attributes(&mut self) {
        self.body_attributes.clear();
    }

    /// Send every call to `endpoint` instead of the port addresses
    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) {
        self.endpoint = Some(endpoint.into());
    }

    /// Use `action` as SOAPAction for every call
    pub fn set_soap_action(&mut self, action: impl Into<String>) {
        self.soap_action = Some(action.into());
    }

    /// Attach a security plugin
    pub fn set_security(&mut self, security: Arc<dyn Security>) {
        self.security = Some(security);
    }

    /// Snapshot of the most recent exchange
    pub fn last_exchange(&self) -> LastExchange {
        self.last.lock().map(|last| last.clone()).unwrap_or_default()
    }

    /// Envelope sent by the most recent call
    pub fn last_request(&self) -> Option<String> {
        self.last_exchange().request
    }

    /// Raw body of the most recent response
    pub fn last_response(&self) -> Option<String> {
        self.last_exchange().response
    }

    /// Call `method` on the port that defines it. When several ports define
    /// the same name, the last one wins.
    pub async fn call(
        &self,
        method: &str,
        args: &Value,
        options: RequestOptions,
        extra_headers: Option<&IndexMap<String, String>>,
    ) -> Result<CallResponse> {
        let mut found = None;
        for service in self.wsdl.definitions().services.values() {
            for port in service.ports.values() {
                for (name, operation) in &port.binding.methods {
                    if self.method_matches(name, method) {
                        found = Some((operation.clone(), port.location.clone()));
                    }
                }
            }
        }
        let (operation, location) =
            found.ok_or_else(|| Error::UnresolvedReference(format!("Method {} not found", method)))?;
        let location = self.location(location, method)?;
        self.invoke(&operation, args, &location, options, extra_headers).await
    }

    /// Call `method` on a specific service port
    pub async fn call_port(
        &self,
        service: &str,
        port: &str,
        method: &str,
        args: &Value,
        options: RequestOptions,
        extra_headers: Option<&IndexMap<String, String>>,
    ) -> Result<CallResponse> {
        let port_def = self
            .wsdl
            .definitions()
            .services
            .get(service)
            .and_then(|s| s.ports.get(port))
            .ok_or_else(|| Error::UnresolvedReference(format!("Port {}.{} not found", service, port)))?;
        let operation = port_def
            .binding
            .methods
            .iter()
            .find(|(name, _)| self.method_matches(name, method))
            .map(|(_, op)| op.clone())
            .ok_or_else(|| Error::UnresolvedReference(format!("Method {} not found", method)))?;
        let location = self.location(port_def.location.clone(), method)?;
        self.invoke(&operation, args, &location, options, extra_headers).await
    }

    fn method_matches(&self, name: &str, wanted: &str) -> bool {
        if self.options.normalize_names {
            normalize_identifier(name) == wanted
        } else {
            name == wanted
        }
    }

    fn location(&self, port_location: Option<String>, method: &str) -> Result<String> {
        self.endpoint
            .clone()
            .or(port_location)
            .ok_or_else(|| Error::Other(format!("No endpoint for method {}", method)))
    }

    /// Body fragment for `operation`; the flag tells whether the envelope
    /// must declare SOAP encoding
    fn input_xml(&self, operation: &Operation, args: &Value) -> (String, bool) {
        let wsdl = &self.wsdl;
        let defs = wsdl.definitions();
        let input = operation.input.as_deref();

        if operation.style == "rpc" {
            let ns = defs.target_namespace.as_deref();
            let alias = ns.and_then(|ns| find_prefix(&defs.xmlns, ns));
            let is_parts = input.and_then(Message::element).is_none();
            let message = wsdl.object_to_rpc_xml(&operation.name, args, alias, ns, is_parts);
            let encoded = operation
                .input_soap
                .as_ref()
                .and_then(|body| body.use_.as_deref())
                == Some("encoded");
            return (message, encoded);
        }

        let message = match input.and_then(Message::element) {
            Some(element) => {
                let type_name = element.node.type_name().unwrap_or(&element.lookup_type);
                wsdl.object_to_document_xml(
                    element.name(),
                    args,
                    &element.target_ns_alias,
                    element.target_namespace.as_deref(),
                    Some(type_name),
                    Some(element),
                )
            }
            None => {
                let name = input.map_or(operation.name.as_str(), Message::wire_name);
                wsdl.object_to_document_xml(name, args, "", None, None, None)
            }
        };
        (message, false)
    }

    async fn invoke(
        &self,
        operation: &Operation,
        args: &Value,
        location: &str,
        mut options: RequestOptions,
        extra_headers: Option<&IndexMap<String, String>>,
    ) -> Result<CallResponse> {
        let wsdl_options = self.wsdl.options();
        let envelope_key = wsdl_options.envelope_key.as_str();
        let version = SoapVersion::from_soap12_flag(wsdl_options.force_soap12_headers);
        let ns = self.wsdl.target_namespace().unwrap_or_default();

        let mut headers = IndexMap::new();
        headers.insert("Content-Type".to_string(), version.content_type().to_string());
        if version.sends_soap_action() {
            let action = soap_action(
                self.soap_action.as_deref(),
                operation.soap_action.as_deref(),
                ns,
                &operation.name,
            );
            headers.insert("SOAPAction".to_string(), format!("\"{}\"", action));
        }
        for (name, value) in &self.http_headers {
            headers.insert(name.clone(), value.clone());
        }
        if let Some(extra) = extra_headers {
            for (name, value) in extra {
                headers.insert(name.clone(), value.clone());
            }
        }
        if let Some(security) = &self.security {
            security.add_headers(&mut headers);
            security.add_options(&mut options);
        }

        let (message, encoded) = self.input_xml(operation, args);
        let post_processor = self.security.as_ref().and_then(|s| s.post_processor());

        let mut envelope = RequestEnvelope::new(envelope_key, version)
            .with_encoding_style(encoded)
            .with_xmlns(self.wsdl.xmlns_in_envelope())
            .with_body_attributes(&self.body_attributes)
            .with_body_id(post_processor.is_some());
        if !self.soap_headers.is_empty() || self.security.is_some() {
            let mut header = self.soap_headers.join("\n");
            if let (Some(security), None) = (&self.security, post_processor) {
                header.push_str(&security.to_xml());
            }
            envelope = envelope.with_header(header);
        }
        let mut xml = envelope.render(&message);
        if let Some(processor) = post_processor {
            xml = processor.post_process(xml, envelope_key);
        }
        if let Some(post_process) = &options.post_process {
            xml = post_process(xml);
        }

        let exchange_id = options
            .exchange_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        options.exchange_id = Some(exchange_id.clone());
        debug!(exchange_id = %exchange_id, method = %operation.name, "Sending request to {}", location);
        self.record(|last| {
            *last = LastExchange {
                exchange_id: Some(exchange_id.clone()),
                message: Some(message),
                request: Some(xml.clone()),
                endpoint: Some(location.to_string()),
                request_headers: headers.clone(),
                ..LastExchange::default()
            }
        });

        let output = operation.output.as_deref();
        let streamable = output.and_then(Message::element).is_some();

        if self.options.stream {
            let response = self
                .transport
                .request_stream(location, Some(&xml), &headers, &options)
                .await?;
            let status = response.status;
            if status == 200 && streamable {
                self.record(|last| {
                    last.response = Some(STREAM_BODY.to_string());
                    last.response_headers = response.headers.clone();
                });
                debug!(exchange_id = %exchange_id, "Decoding streamed response");
                let decoded = self
                    .wsdl
                    .xml_to_object_reader(response.body)
                    .map_err(|e| response_error(e, status, STREAM_BODY));
                return self.finish(operation, decoded?, STREAM_BODY.to_string(), status, xml);
            }
            let mut raw = String::new();
            let mut reader = response.body;
            reader.read_to_string(&mut raw)?;
            let body = extract_envelope(&raw);
            self.record(|last| {
                last.response = Some(body.clone());
                last.response_headers = response.headers.clone();
            });
            return self.parse_response(operation, body, status, xml, streamable);
        }

        let response = self
            .transport
            .request(location, Some(&xml), &headers, &options)
            .await?;
        let body = extract_envelope(&response.body);
        debug!(exchange_id = %exchange_id, status = response.status, "Received response");
        self.record(|last| {
            last.response = Some(body.clone());
            last.response_headers = response.headers.clone();
        });
        self.parse_response(operation, body, response.status, xml, streamable)
    }

    fn record<F: FnOnce(&mut LastExchange)>(&self, update: F) {
        match self.last.lock() {
            Ok(mut last) => update(&mut last),
            Err(_) => warn!("Last exchange record is poisoned"),
        }
    }

    fn parse_response(
        &self,
        operation: &Operation,
        body: String,
        status: u16,
        request: String,
        element_output: bool,
    ) -> Result<CallResponse> {
        match self.wsdl.xml_to_object(&body) {
            Ok(obj) => self.finish(operation, obj, body, status, request),
            Err(err) => {
                if !element_output {
                    if let Ok(json) = serde_json::from_str::<Value>(&body) {
                        debug!("Response element is not present. Unable to convert response xml to json.");
                        return Ok(CallResponse {
                            result: json,
                            body,
                            header: None,
                            request,
                            status,
                        });
                    }
                }
                Err(response_error(err, status, &body))
            }
        }
    }

    fn finish(
        &self,
        operation: &Operation,
        obj: Value,
        body: String,
        status: u16,
        request: String,
    ) -> Result<CallResponse> {
        let header = obj.get("Header").cloned();
        let output = match operation.output.as_deref() {
            Some(output) => output,
            None => {
                return Ok(CallResponse {
                    result: Value::Null,
                    body,
                    header,
                    request,
                    status,
                })
            }
        };
        let soap_body = match obj.get("Body") {
            None => {
                return Ok(CallResponse {
                    result: obj,
                    body,
                    header,
                    request,
                    status,
                })
            }
            Some(Value::Object(soap_body)) => soap_body,
            Some(_) => {
                return Err(Error::CodecMismatch {
                    message: "Cannot parse response".to_string(),
                    status: Some(status),
                    body,
                })
            }
        };

        let wire_name = output.wire_name();
        let result = soap_body
            .get(wire_name)
            .filter(|v| is_truthy(v))
            .or_else(|| soap_body.get(strip_output_suffix(wire_name)).filter(|v| is_truthy(v)))
            .or_else(|| {
                ["Response", "Out", "Output"]
                    .iter()
                    .find_map(|term| soap_body.get(&format!("{}{}", operation.name, term)))
            })
            .cloned()
            .unwrap_or(Value::Null);

        Ok(CallResponse {
            result,
            body,
            header,
            request,
            status,
        })
    }
}

/// Attach the raw response to a decode failure
fn response_error(err: Error, status: u16, body: &str) -> Error {
    match err {
        Error::Fault(mut fault) => {
            fault.response_body = Some(body.to_string());
            if fault.status_code.is_none() {
                fault.status_code = Some(status);
            }
            Error::Fault(fault)
        }
        other => Error::Response {
            status: Some(status),
            body: body.to_string(),
            source: Box::new(other),
        },
    }
}

/// Output element names may carry an `Out`, `Output` or `Response` suffix
/// that the response body omits
fn strip_output_suffix(name: &str) -> &str {
    ["Response", "Output", "Out"]
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .unwrap_or(name)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::BasicAuthSecurity;
    use crate::transport::HttpResponse;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const CALC_WSDL: &str = r#"<definitions name="Calc" targetNamespace="http://example.com/calc"
    xmlns="http://schemas.xmlsoap.org/wsdl/"
    xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
    xmlns:tns="http://example.com/calc"
    xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <types>
    <xs:schema targetNamespace="http://example.com/calc" elementFormDefault="qualified">
      <xs:element name="Add">
        <xs:complexType><xs:sequence>
          <xs:element name="a" type="xs:int"/>
          <xs:element name="b" type="xs:int"/>
        </xs:sequence></xs:complexType>
      </xs:element>
      <xs:element name="AddResponse">
        <xs:complexType><xs:sequence><xs:element name="sum" type="xs:int"/></xs:sequence></xs:complexType>
      </xs:element>
    </xs:schema>
  </types>
  <message name="AddIn"><part name="p" element="tns:Add"/></message>
  <message name="AddOut"><part name="p" element="tns:AddResponse"/></message>
  <message name="PingIn"><part name="text" type="xs:string"/></message>
  <portType name="CalcPort">
    <operation name="Add"><input message="tns:AddIn"/><output message="tns:AddOut"/></operation>
    <operation name="Ping"><input message="tns:PingIn"/></operation>
  </portType>
  <binding name="CalcBinding" type="tns:CalcPort">
    <soap:binding style="document" transport="http://schemas.xmlsoap.org/soap/http"/>
    <operation name="Add"><soap:operation soapAction="urn:add"/></operation>
    <operation name="Ping"><soap:operation/></operation>
  </binding>
  <service name="CalcService">
    <port name="CalcPort" binding="tns:CalcBinding"><soap:address location="http://localhost/calc"/></port>
  </service>
</definitions>"#;

    #[derive(Debug)]
    struct Canned {
        status: u16,
        body: String,
        seen: Mutex<Vec<(String, IndexMap<String, String>)>>,
    }

    impl Canned {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body: body.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for Canned {
        async fn request(
            &self,
            url: &str,
            _body: Option<&str>,
            headers: &IndexMap<String, String>,
            _options: &RequestOptions,
        ) -> Result<HttpResponse> {
            self.seen.lock().unwrap().push((url.to_string(), headers.clone()));
            Ok(HttpResponse::new(self.status, self.body.clone()))
        }
    }

    async fn client(transport: Arc<Canned>) -> Client {
        let wsdl = Wsdl::from_xml(
            CALC_WSDL,
            None,
            WsdlOptions::default(),
            &Loader::new(),
            &WsdlCache::new(),
        )
        .await
        .unwrap();
        Client::new(Arc::new(wsdl), transport, ClientOptions::default())
    }

    const ADD_RESPONSE: &str = "noise<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body><AddResponse xmlns=\"http://example.com/calc\"><sum>3</sum></AddResponse></soap:Body></soap:Envelope>";

    #[tokio::test]
    async fn test_call_document_operation() {
        let transport = Canned::new(200, ADD_RESPONSE);
        let client = client(transport.clone()).await;
        let response = client
            .call("Add", &json!({"a": 1, "b": 2}), RequestOptions::new(), None)
            .await
            .unwrap();
        assert_eq!(response.result, json!({"sum": 3}));
        assert!(response.body.starts_with("<soap:Envelope"));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].0, "http://localhost/calc");
        assert_eq!(seen[0].1["SOAPAction"], "\"urn:add\"");
        assert_eq!(seen[0].1["Content-Type"], "text/xml; charset=utf-8");

        let request = client.last_request().unwrap();
        assert!(request.contains("<soap:Body><Add xmlns=\"http://example.com/calc\"><a>1</a><b>2</b></Add></soap:Body>"));
        assert!(roxmltree::Document::parse(&request).is_ok());
    }

    #[tokio::test]
    async fn test_headers_security_and_endpoint() {
        let transport = Canned::new(200, ADD_RESPONSE);
        let mut client = client(transport.clone()).await;
        client.set_endpoint("http://other/calc");
        client.set_soap_action("custom");
        client.add_http_header("X-Trace", "1");
        client.set_security(Arc::new(BasicAuthSecurity::new("u", "p")));
        let index = client.add_soap_header(&json!("<auth>t</auth>"), "", "", None);
        assert_eq!(index, 0);
        client.add_body_attribute(&json!({"Id": "b1"}));

        client
            .call("Add", &json!({"a": 1, "b": 2}), RequestOptions::new(), None)
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].0, "http://other/calc");
        assert_eq!(seen[0].1["SOAPAction"], "\"custom\"");
        assert_eq!(seen[0].1["X-Trace"], "1");
        assert!(seen[0].1["Authorization"].starts_with("Basic "));

        let request = client.last_request().unwrap();
        assert!(request.contains("<soap:Header><auth>t</auth></soap:Header>"));
        assert!(request.contains("<soap:Body Id=\"b1\">"));
    }

    #[tokio::test]
    async fn test_fault_carries_raw_body() {
        let body = "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body><soap:Fault><faultcode>soap:Server</faultcode><faultstring>boom</faultstring></soap:Fault></soap:Body></soap:Envelope>";
        let client = client(Canned::new(500, body)).await;
        let err = client
            .call("Add", &json!({"a": 1, "b": 2}), RequestOptions::new(), None)
            .await
            .unwrap_err();
        let fault = err.as_fault().unwrap();
        assert_eq!(err.to_string(), "soap:Server: boom");
        assert_eq!(fault.status_code, Some(500));
        assert_eq!(fault.response_body.as_deref(), Some(body));
    }

    #[tokio::test]
    async fn test_one_way_and_json_fallback() {
        let client = client(Canned::new(200, "{\"ok\":true}")).await;
        let response = client
            .call("Ping", &json!({"text": "hi"}), RequestOptions::new(), None)
            .await
            .unwrap();
        assert_eq!(response.result, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_non_object_body_is_codec_mismatch() {
        let body = "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\"><soap:Body>oops</soap:Body></soap:Envelope>";
        let client = client(Canned::new(200, body)).await;
        let err = client
            .call("Add", &json!({"a": 1, "b": 2}), RequestOptions::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CodecMismatch { status: Some(200), .. }));
    }

    #[tokio::test]
    async fn test_stream_decoding() {
        let body = ADD_RESPONSE.trim_start_matches("noise");
        let wsdl = Wsdl::from_xml(CALC_WSDL, None, WsdlOptions::default(), &Loader::new(), &WsdlCache::new())
            .await
            .unwrap();
        let client = Client::new(Arc::new(wsdl), Canned::new(200, body), ClientOptions::new().with_stream(true));
        let response = client
            .call("Add", &json!({"a": 1, "b": 2}), RequestOptions::new(), None)
            .await
            .unwrap();
        assert_eq!(response.result, json!({"sum": 3}));
        assert_eq!(response.body, "<stream>");
        assert_eq!(client.last_response().as_deref(), Some("<stream>"));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let client = client(Canned::new(200, ADD_RESPONSE)).await;
        let err = client
            .call("Nope", &json!({}), RequestOptions::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference(_)));
    }

    #[test]
    fn test_strip_output_suffix() {
        assert_eq!(strip_output_suffix("AddResponse"), "Add");
        assert_eq!(strip_output_suffix("AddOutput"), "Add");
        assert_eq!(strip_output_suffix("AddOut"), "Add");
        assert_eq!(strip_output_suffix("Add"), "Add");
    }
}
