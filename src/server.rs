//! SOAP server dispatch
//!
//! [`Server`] decodes an inbound envelope, picks the port whose address
//! matches the request path, routes the Body to a service method and writes
//! the method's result (or fault) back as a response envelope. The HTTP
//! listener itself belongs to the caller.

use crate::codec::Encoder;
use crate::envelope::{response_envelope, SoapVersion};
use crate::error::Error;
use crate::wsdl::{Binding, Wsdl};
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

/// Arguments handed to a service method
#[derive(Debug, Clone)]
pub struct ServiceCall {
    /// Service name
    pub service: String,
    /// Port name
    pub port: String,
    /// Method name
    pub method: String,
    /// Decoded Body content for the method
    pub args: Value,
    /// Decoded SOAP header of the request
    pub headers: Option<Value>,
    /// `rpc` or `document`
    pub style: String,
}

/// Failure reported by a service method
#[derive(Debug, Clone)]
pub enum ServiceError {
    /// SOAP fault written as is. Objects with a `faultcode` field are
    /// written in SOAP 1.1 form, anything else in SOAP 1.2 form.
    Fault {
        /// Fault fields
        fault: Value,
        /// HTTP status of the response
        status: Option<u16>,
    },
    /// Any other failure; reported as an internal server error
    Internal(String),
}

impl ServiceError {
    /// Fault with the given fields
    pub fn fault(fault: Value) -> Self {
        ServiceError::Fault { fault, status: None }
    }

    /// Fault answered with `status`
    pub fn fault_with_status(fault: Value, status: u16) -> Self {
        ServiceError::Fault {
            fault,
            status: Some(status),
        }
    }

    /// Internal error
    pub fn internal(message: impl fmt::Display) -> Self {
        ServiceError::Internal(message.to_string())
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Fault { fault, .. } => write!(f, "fault: {}", fault),
            ServiceError::Internal(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<Error> for ServiceError {
    fn from(err: Error) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

/// A bound service method
pub type ServiceMethod = Arc<dyn Fn(ServiceCall) -> Result<Value, ServiceError> + Send + Sync>;

/// Methods keyed by service, port and method name
pub type Services = IndexMap<String, IndexMap<String, IndexMap<String, ServiceMethod>>>;

/// Decides whether a request may proceed; receives the request's
/// `Header.Security` block
pub type Authenticate = Arc<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

/// Computes a SOAP header per call from method name, arguments and request headers
pub type HeaderFn = Arc<dyn Fn(&str, &Value, Option<&Value>) -> Value + Send + Sync>;

/// SOAP header written into every response
#[derive(Clone)]
pub enum ServerSoapHeader {
    /// Pre-rendered XML
    Xml(String),
    /// Computed per call; a string result is raw XML, anything else is
    /// rendered as element `name`
    Computed {
        /// Header factory
        header: HeaderFn,
        /// Element name
        name: String,
        /// Namespace prefix
        namespace: String,
        /// Namespace URI
        xmlns: Option<String>,
    },
}

impl fmt::Debug for ServerSoapHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerSoapHeader::Xml(xml) => f.debug_tuple("Xml").field(xml).finish(),
            ServerSoapHeader::Computed { name, .. } => {
                f.debug_struct("Computed").field("name", name).finish_non_exhaustive()
            }
        }
    }
}

/// Response of one-way operations
#[derive(Debug, Clone, Default)]
pub struct OneWayOptions {
    /// Status code; 200 when unset
    pub response_code: Option<u16>,
    /// Answer with an empty envelope instead of an empty body
    pub empty_body: bool,
}

/// Server settings
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// One-way operation responses
    pub one_way: OneWayOptions,
    /// Answer undecodable requests with a fault envelope instead of plain text
    pub return_fault: bool,
}

impl ServerOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Status code of one-way responses
    pub fn with_one_way_response_code(mut self, code: u16) -> Self {
        self.one_way.response_code = Some(code);
        self
    }

    /// Answer one-way operations with an empty envelope
    pub fn with_one_way_empty_body(mut self, empty_body: bool) -> Self {
        self.one_way.empty_body = empty_body;
        self
    }

    /// Answer undecodable requests with a fault envelope
    pub fn with_return_fault(mut self, return_fault: bool) -> Self {
        self.return_fault = return_fault;
        self
    }
}

/// Response to write back to the HTTP client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerResponse {
    /// Response body
    pub body: String,
    /// HTTP status
    pub status: u16,
}

impl ServerResponse {
    fn ok(body: String) -> Self {
        Self { body, status: 200 }
    }
}

struct Route<'s> {
    service: &'s str,
    port: &'s str,
    binding: &'s Binding,
}

struct Dispatch {
    method: String,
    output_name: String,
    args: Value,
    style: &'static str,
}

/// SOAP request dispatcher
pub struct Server {
    wsdl: Arc<Wsdl>,
    services: Services,
    options: ServerOptions,
    authenticate: Option<Authenticate>,
    soap_headers: Vec<ServerSoapHeader>,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("wsdl", &self.wsdl.uri())
            .field("services", &self.services.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .field("soap_headers", &self.soap_headers)
            .finish()
    }
}

impl Server {
    /// Dispatcher for `services` described by `wsdl`
    pub fn new(wsdl: Arc<Wsdl>, services: Services, options: ServerOptions) -> Self {
        Self {
            wsdl,
            services,
            options,
            authenticate: None,
            soap_headers: Vec::new(),
        }
    }

    /// Install an authentication hook
    pub fn with_authenticate<F>(mut self, authenticate: F) -> Self
    where
        F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    {
        self.authenticate = Some(Arc::new(authenticate));
        self
    }

    /// WSDL text served for `?wsdl` requests
    pub fn wsdl_document(&self) -> &str {
        self.wsdl.to_xml()
    }

    /// Add a response header; returns its index
    pub fn add_soap_header(&mut self, header: ServerSoapHeader) -> usize {
        self.soap_headers.push(header);
        self.soap_headers.len() - 1
    }

    /// Replace the header at `index`; out of range indexes append
    pub fn change_soap_header(&mut self, index: usize, header: ServerSoapHeader) {
        match self.soap_headers.get_mut(index) {
            Some(slot) => *slot = header,
            None => self.soap_headers.push(header),
        }
    }

    /// Response headers
    pub fn soap_headers(&self) -> &[ServerSoapHeader] {
        &self.soap_headers
    }

    /// Remove all response headers
    pub fn clear_soap_headers(&mut self) {
        self.soap_headers.clear();
    }

    /// Handle one POSTed envelope addressed to `path`
    pub fn process_request(&self, xml: &str, path: &str) -> ServerResponse {
        let pathname = path.split('?').next().unwrap_or_default().trim_end_matches('/');
        let obj = match self.wsdl.xml_to_object(xml) {
            Ok(obj) => obj,
            Err(err) => return self.undecodable(err),
        };
        let headers = obj.get("Header").filter(|h| !h.is_null());
        let security = headers.and_then(|h| h.get("Security"));
        let include_timestamp = security
            .and_then(|s| s.get("Timestamp"))
            .map_or(false, |t| !t.is_null());

        let allowed = self.authenticate.as_ref().map_or(true, |auth| auth(security));
        if !allowed {
            warn!("Authentication failed for request on {}", path);
            let fault = json!({
                "Code": {"Value": "SOAP-ENV:Client", "Subcode": {"value": "AuthenticationFailure"}},
                "Reason": {"Text": "Invalid username or password"},
            });
            return self.send_error(fault, Some(401), include_timestamp);
        }

        match self.dispatch(&obj, pathname, include_timestamp) {
            Ok(response) => response,
            Err(ServiceError::Fault { fault, status }) => self.send_error(fault, status, include_timestamp),
            Err(ServiceError::Internal(message)) => {
                error!("Internal error while processing request: {}", message);
                let fault = json!({
                    "Code": {"Value": "SOAP-ENV:Server", "Subcode": {"value": "InternalServerError"}},
                    "Reason": {"Text": message},
                });
                self.send_error(fault, Some(500), include_timestamp)
            }
        }
    }

    fn undecodable(&self, err: Error) -> ServerResponse {
        warn!("Cannot decode request: {}", err);
        if !self.options.return_fault {
            return ServerResponse {
                body: err.to_string(),
                status: 500,
            };
        }
        let (fault, status) = match err.as_fault() {
            Some(fault) => {
                let mut fields = Map::new();
                fields.insert("faultcode".to_string(), json!(fault.code));
                fields.insert("faultstring".to_string(), json!(fault.reason));
                if let Some(detail) = &fault.detail {
                    fields.insert("detail".to_string(), json!(detail));
                }
                (Value::Object(fields), fault.status_code)
            }
            None => (json!({"faultcode": "soap:Server", "faultstring": err.to_string()}), None),
        };
        self.send_error(fault, status.or(Some(500)), false)
    }

    /// Port whose address path equals `pathname`, else the first port
    fn route(&self, pathname: &str) -> Option<Route<'_>> {
        let mut first = None;
        for (service_name, service) in &self.wsdl.definitions().services {
            for (port_name, port) in &service.ports {
                let route = Route {
                    service: service_name,
                    port: port_name,
                    binding: &port.binding,
                };
                let port_path = port.location.as_deref().map(location_path).unwrap_or_default();
                debug!("Trying {} from path {}", port_name, port_path);
                if port_path == pathname {
                    return Some(route);
                }
                if first.is_none() {
                    first = Some(route);
                }
            }
        }
        first
    }

    fn dispatch(&self, obj: &Value, pathname: &str, include_timestamp: bool) -> Result<ServerResponse, ServiceError> {
        info!("Attempting to bind to {}", pathname);
        let body = obj
            .get("Body")
            .and_then(Value::as_object)
            .ok_or_else(|| ServiceError::internal("Failed to parse the SOAP Message body"))?;
        let route = self
            .route(pathname)
            .ok_or_else(|| ServiceError::internal("Failed to bind to WSDL"))?;

        let dispatch = if route.binding.style == "rpc" {
            let method = body
                .keys()
                .next()
                .cloned()
                .ok_or_else(|| ServiceError::internal("Empty SOAP Body"))?;
            Dispatch {
                output_name: format!("{}Response", method),
                args: body.get(&method).cloned().unwrap_or(Value::Null),
                method,
                style: "rpc",
            }
        } else {
            let attributes_key = &self.wsdl.options().attributes_key;
            let element = body
                .keys()
                .find(|k| *k != attributes_key)
                .ok_or_else(|| ServiceError::internal("Empty SOAP Body"))?;
            let pair = route
                .binding
                .top_elements
                .get(element)
                .ok_or_else(|| ServiceError::internal(format!("No method bound to element {}", element)))?;
            Dispatch {
                method: pair.method_name.clone(),
                output_name: pair.output_name.clone(),
                args: body.get(element).cloned().unwrap_or(Value::Null),
                style: "document",
            }
        };
        debug!(service = route.service, port = route.port, method = %dispatch.method, "Dispatching request");
        self.execute(&route, dispatch, obj.get("Header").cloned(), include_timestamp)
    }

    fn execute(
        &self,
        route: &Route<'_>,
        dispatch: Dispatch,
        request_headers: Option<Value>,
        include_timestamp: bool,
    ) -> Result<ServerResponse, ServiceError> {
        let headers = self.render_headers(&dispatch.method, &dispatch.args, request_headers.as_ref());

        let method = match self
            .services
            .get(route.service)
            .and_then(|s| s.get(route.port))
            .and_then(|p| p.get(&dispatch.method))
        {
            Some(method) => method,
            None => return Ok(ServerResponse::ok(self.envelope("", &headers, include_timestamp))),
        };

        let call = ServiceCall {
            service: route.service.to_string(),
            port: route.port.to_string(),
            method: dispatch.method.clone(),
            args: dispatch.args,
            headers: request_headers,
            style: dispatch.style.to_string(),
        };

        let operation = route.binding.methods.get(&dispatch.method);
        let output = operation.and_then(|op| op.output.as_deref());
        let output = match output {
            Some(output) => output,
            None => {
                if let Err(err) = method(call) {
                    warn!("One-way method {} failed: {}", dispatch.method, err);
                }
                let one_way = &self.options.one_way;
                let body = if one_way.empty_body {
                    self.envelope("", &headers, include_timestamp)
                } else {
                    String::new()
                };
                return Ok(ServerResponse {
                    body,
                    status: one_way.response_code.unwrap_or(200),
                });
            }
        };

        let result = method(call)?;
        let defs = self.wsdl.definitions();
        let body = if dispatch.style == "rpc" {
            self.wsdl.object_to_rpc_xml(
                &dispatch.output_name,
                &result,
                Some(""),
                defs.target_namespace.as_deref(),
                false,
            )
        } else {
            let (alias, namespace) = output
                .element()
                .map(|el| (el.target_ns_alias.as_str(), el.target_namespace.as_deref()))
                .unwrap_or(("", None));
            self.wsdl
                .object_to_document_xml(&dispatch.output_name, &result, alias, namespace, None, None)
        };
        Ok(ServerResponse::ok(self.envelope(&body, &headers, include_timestamp)))
    }

    fn render_headers(&self, method: &str, args: &Value, request_headers: Option<&Value>) -> String {
        self.soap_headers
            .iter()
            .map(|header| match header {
                ServerSoapHeader::Xml(xml) => xml.clone(),
                ServerSoapHeader::Computed {
                    header,
                    name,
                    namespace,
                    xmlns,
                } => match header(method, args, request_headers) {
                    Value::String(xml) => xml,
                    value => Encoder::new(&self.wsdl, None).encode(
                        &value,
                        Some(name),
                        namespace,
                        xmlns.as_deref(),
                        true,
                        None,
                    ),
                },
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn envelope(&self, body: &str, headers: &str, include_timestamp: bool) -> String {
        let version = SoapVersion::from_soap12_flag(self.wsdl.options().force_soap12_headers);
        let timestamp = include_timestamp.then(Utc::now);
        response_envelope(version, self.wsdl.xmlns_in_envelope(), headers, body, timestamp)
    }

    /// Fault response. A `statusCode` field in the fault overrides `status`;
    /// faults without any status answer 500.
    fn send_error(&self, mut fault: Value, status: Option<u16>, include_timestamp: bool) -> ServerResponse {
        let embedded = fault
            .as_object_mut()
            .and_then(|f| f.remove("statusCode"))
            .and_then(|s| s.as_u64())
            .and_then(|s| u16::try_from(s).ok());
        let status = embedded.or(status).unwrap_or(500);

        let body = if fault.get("faultcode").is_some() {
            self.wsdl
                .object_to_document_xml("soap:Fault", &fault, "", None, None, None)
        } else {
            self.wsdl
                .object_to_document_xml("Fault", &fault, "soap", None, None, None)
        };
        ServerResponse {
            body: self.envelope(&body, "", include_timestamp),
            status,
        }
    }
}

/// Path of a port address without its trailing slash
fn location_path(location: &str) -> String {
    let path = match Url::parse(location) {
        Ok(url) => url.path().to_string(),
        Err(_) => location.to_string(),
    };
    path.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::Loader;
    use crate::wsdl::{WsdlCache, WsdlOptions};

    #[test]
    fn test_location_path() {
        assert_eq!(location_path("http://localhost:8080/calc/"), "/calc");
        assert_eq!(location_path("http://localhost"), "");
        assert_eq!(location_path("/relative/"), "/relative");
    }

    #[test]
    fn test_service_error_from_error() {
        let err: ServiceError = Error::Other("boom".to_string()).into();
        assert_eq!(err.to_string(), "boom");
    }

    const ECHO_WSDL: &str = r#"<definitions name="Echo" targetNamespace="urn:echo"
    xmlns="http://schemas.xmlsoap.org/wsdl/"
    xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"
    xmlns:tns="urn:echo"
    xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <message name="EchoIn"><part name="text" type="xs:string"/></message>
  <message name="EchoOut"><part name="text" type="xs:string"/></message>
  <portType name="EchoPort">
    <operation name="Echo"><input message="tns:EchoIn"/><output message="tns:EchoOut"/></operation>
  </portType>
  <binding name="EchoBinding" type="tns:EchoPort">
    <soap:binding style="rpc" transport="http://schemas.xmlsoap.org/soap/http"/>
    <operation name="Echo"><soap:operation soapAction="echo"/></operation>
  </binding>
  <service name="EchoService">
    <port name="EchoPort" binding="tns:EchoBinding"><soap:address location="http://localhost/echo"/></port>
  </service>
</definitions>"#;

    async fn echo_server(options: ServerOptions) -> Server {
        let wsdl = Wsdl::from_xml(ECHO_WSDL, None, WsdlOptions::default(), &Loader::new(), &WsdlCache::new())
            .await
            .unwrap();
        let echo: ServiceMethod = Arc::new(|call: ServiceCall| {
            let text = call.args.get("text").cloned().unwrap_or(Value::Null);
            Ok(json!({ "text": text }))
        });
        let mut port = IndexMap::new();
        port.insert("Echo".to_string(), echo);
        let mut service = IndexMap::new();
        service.insert("EchoPort".to_string(), port);
        let mut services = IndexMap::new();
        services.insert("EchoService".to_string(), service);
        Server::new(Arc::new(wsdl), services, options)
    }

    const ECHO_REQUEST: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><Echo><text>hi</text></Echo></soap:Body></soap:Envelope>"#;

    #[tokio::test]
    async fn test_rpc_round_trip() {
        let server = echo_server(ServerOptions::new()).await;
        let response = server.process_request(ECHO_REQUEST, "/echo");
        assert_eq!(response.status, 200);
        assert!(response.body.contains("<soap:Body><tns:EchoResponse><tns:text>hi</tns:text></tns:EchoResponse></soap:Body>"));
        assert!(roxmltree::Document::parse(&response.body).is_ok());
    }

    #[tokio::test]
    async fn test_undecodable_request() {
        let server = echo_server(ServerOptions::new()).await;
        let response = server.process_request("<broken>", "/echo");
        assert_eq!(response.status, 500);
        assert!(!response.body.starts_with("<?xml"));

        let server = echo_server(ServerOptions::new().with_return_fault(true)).await;
        let response = server.process_request("<broken>", "/echo");
        assert_eq!(response.status, 500);
        assert!(response.body.contains("Invalid XML"));
    }

    #[tokio::test]
    async fn test_wsdl_document() {
        let server = echo_server(ServerOptions::new()).await;
        assert_eq!(server.wsdl_document(), ECHO_WSDL);
    }
}
