//! # soapwire
//!
//! SOAP 1.1/1.2 toolkit built around a WSDL/XSD schema compiler and a
//! schema-driven XML ⇄ value codec.
//!
//! ## Features
//!
//! - WSDL 1.1 and XSD parsing into a typed node tree (strict or lenient)
//! - Include/import resolution with a shared, explicitly passed cache
//! - Resolved service model: messages, operations, bindings, services
//! - Shape descriptions of every operation's input and output
//! - `serde_json::Value` to XML encoding with namespace and `xsi:type` handling
//! - XML to `Value` decoding with type coercion, multi-references and faults
//! - SOAP client over a pluggable transport, and a request dispatcher for servers
//!
//! ## Example
//!
//! ```no_run
//! use soapwire::{Loader, Wsdl, WsdlCache, WsdlOptions};
//! use serde_json::json;
//!
//! # async fn example() -> soapwire::Result<()> {
//! let wsdl = Wsdl::load("calc.wsdl", WsdlOptions::default(), &Loader::new(), &WsdlCache::new()).await?;
//!
//! // Describe the services
//! println!("{}", wsdl.describe_services());
//!
//! // Decode a response envelope
//! let value = wsdl.xml_to_object("<Envelope><Body><AddResponse><sum>3</sum></AddResponse></Body></Envelope>")?;
//! assert_eq!(value["Body"]["AddResponse"]["sum"], json!("3"));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names and namespaces
pub mod names;
pub mod namespaces;

// Resource loading
pub mod locations;
pub mod loaders;
pub mod tokenizer;
pub mod transport;

// Schema compiler
pub mod wsdl;

// Wire format
pub mod codec;
pub mod envelope;

// Endpoints
pub mod client;
pub mod security;
pub mod server;

// Re-exports for convenience
pub use client::{CallResponse, Client, ClientOptions, LastExchange};
pub use envelope::SoapVersion;
pub use error::{Error, ParseError, Result, SoapFault};
pub use limits::Limits;
pub use loaders::Loader;
pub use security::{BasicAuthSecurity, BearerSecurity, PostProcess, Security};
pub use server::{
    Server, ServerOptions, ServerResponse, ServiceCall, ServiceError, ServiceMethod, Services,
};
pub use transport::{HttpResponse, RequestOptions, Transport};
pub use wsdl::{Wsdl, WsdlCache, WsdlOptions};

/// Version of the soapwire library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// XML Schema namespace
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XML Schema instance namespace
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// WSDL 1.1 namespace
pub const WSDL_NAMESPACE: &str = "http://schemas.xmlsoap.org/wsdl/";

pub use envelope::{SOAP11_ENVELOPE_NAMESPACE, SOAP12_ENVELOPE_NAMESPACE};
pub use namespaces::{XMLNS_NAMESPACE, XML_NAMESPACE};
