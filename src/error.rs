//! Error types for soapwire
//!
//! This module defines all error types used throughout the library:
//! document loading and parsing failures, unresolved schema references,
//! transport failures and SOAP faults received over the wire.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result type alias using the soapwire Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for soapwire operations
#[derive(Error, Debug)]
pub enum Error {
    /// Structural WSDL/XSD parse error (unexpected element in strict mode,
    /// unexpected root, duplicate schema namespace)
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// A message, operation or binding references something that does not exist
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    /// Error reported by the transport capability, passed through unchanged
    #[error("transport error: {0}")]
    Transport(String),

    /// SOAP fault received in a response body (or synthesized for invalid XML)
    #[error("{0}")]
    Fault(Box<SoapFault>),

    /// A body was received but could not be interpreted as a SOAP message
    #[error("{message}")]
    CodecMismatch {
        /// Description of the mismatch
        message: String,
        /// HTTP status of the response
        status: Option<u16>,
        /// Raw response body
        body: String,
    },

    /// Decoding a received body failed; raw response kept for inspection
    #[error("{source}")]
    Response {
        /// HTTP status of the response
        status: Option<u16>,
        /// Raw response body
        body: String,
        /// Underlying decode error
        #[source]
        source: Box<Error>,
    },

    /// Encoding error (value to XML conversion)
    #[error("encoding error: {0}")]
    Encode(String),

    /// Decoding error (XML to value conversion)
    #[error("decoding error: {0}")]
    Decode(String),

    /// Resource loading error
    #[error("resource error: {0}")]
    Resource(String),

    /// Namespace error
    #[error("namespace error: {0}")]
    Namespace(String),

    /// Limit exceeded error
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// XML tokenizer error
    #[error("XML error: {0}")]
    Xml(String),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// The SOAP fault carried by this error, if any
    pub fn as_fault(&self) -> Option<&SoapFault> {
        match self {
            Error::Fault(fault) => Some(fault),
            Error::Response { source, .. } => source.as_fault(),
            _ => None,
        }
    }
}

impl From<SoapFault> for Error {
    fn from(fault: SoapFault) -> Self {
        Error::Fault(Box::new(fault))
    }
}

/// WSDL/XSD structural parse error with context
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Error message
    pub message: String,
    /// Offending element name
    pub element: Option<String>,
    /// Element that contained the offending one
    pub container: Option<String>,
}

impl ParseError {
    /// Create a new parse error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            element: None,
            container: None,
        }
    }

    /// Error for an element that is not allowed inside its parent
    pub fn unexpected(element: impl Into<String>, container: impl Into<String>) -> Self {
        let element = element.into();
        let container = container.into();
        Self::new(format!(
            "Found unexpected element ({}) inside {}",
            element, container
        ))
        .with_element(element)
        .with_container(container)
    }

    /// Set the offending element
    pub fn with_element(mut self, element: impl Into<String>) -> Self {
        self.element = Some(element.into());
        self
    }

    /// Set the containing element
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Structured SOAP fault
///
/// SOAP 1.1 faults fill `code`/`reason`/`detail` from `faultcode`/`faultstring`/`detail`;
/// SOAP 1.2 faults from `Code.Value`/`Reason.Text`/`Detail`, with `Code.Subcode.Value`
/// in `subcode`. `root` always holds the complete parsed document.
#[derive(Debug, Clone, Default)]
pub struct SoapFault {
    /// Fault code
    pub code: String,
    /// Human readable reason
    pub reason: String,
    /// Optional detail, rendered as text
    pub detail: Option<String>,
    /// SOAP 1.2 subcode
    pub subcode: Option<String>,
    /// HTTP status associated with the fault
    pub status_code: Option<u16>,
    /// Full parsed document
    pub root: Value,
    /// Raw response body, when the fault came back from a call
    pub response_body: Option<String>,
}

impl SoapFault {
    /// Create a new fault
    pub fn new(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            reason: reason.into(),
            ..Default::default()
        }
    }

    /// Set the detail
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the HTTP status code
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Attach the parsed document
    pub fn with_root(mut self, root: Value) -> Self {
        self.root = root;
        self
    }
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.reason)?;
        if let Some(ref detail) = self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}
