//! SOAP envelope assembly
//!
//! Codec output is wrapped here in the `Envelope`/`Header`/`Body` shell. The
//! protocol version decides the envelope namespace, the `Content-Type` of the
//! request and whether a `SOAPAction` header is sent at all.

use crate::XSI_NAMESPACE;
use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// SOAP 1.1 envelope namespace
pub const SOAP11_ENVELOPE_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// SOAP 1.2 envelope namespace
pub const SOAP12_ENVELOPE_NAMESPACE: &str = "http://www.w3.org/2003/05/soap-envelope";

/// SOAP section 5 encoding namespace
pub const SOAP_ENCODING_NAMESPACE: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// Content type of SOAP 1.1 messages
pub const SOAP11_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Content type of SOAP 1.2 messages
pub const SOAP12_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// WS-Security extension namespace
pub const WSSE_NAMESPACE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

/// WS-Security utility namespace
pub const WSU_NAMESPACE: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Lifetime of a generated security timestamp, in seconds
const TIMESTAMP_LIFETIME_SECS: i64 = 600;

/// SOAP protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoapVersion {
    /// SOAP 1.1
    #[default]
    Soap11,
    /// SOAP 1.2
    Soap12,
}

impl SoapVersion {
    /// Version selected by the `force_soap12_headers` flag
    pub fn from_soap12_flag(soap12: bool) -> Self {
        if soap12 {
            SoapVersion::Soap12
        } else {
            SoapVersion::Soap11
        }
    }

    /// Envelope namespace URI
    pub fn namespace(self) -> &'static str {
        match self {
            SoapVersion::Soap11 => SOAP11_ENVELOPE_NAMESPACE,
            SoapVersion::Soap12 => SOAP12_ENVELOPE_NAMESPACE,
        }
    }

    /// `Content-Type` header value
    pub fn content_type(self) -> &'static str {
        match self {
            SoapVersion::Soap11 => SOAP11_CONTENT_TYPE,
            SoapVersion::Soap12 => SOAP12_CONTENT_TYPE,
        }
    }

    /// SOAP 1.2 carries the action in the content type instead of a header
    pub fn sends_soap_action(self) -> bool {
        self == SoapVersion::Soap11
    }
}

/// SOAPAction for a call: the explicit override, then the binding's action,
/// then `{target namespace}/{method}`.
pub fn soap_action(
    explicit: Option<&str>,
    binding: Option<&str>,
    target_namespace: &str,
    method: &str,
) -> String {
    if let Some(action) = explicit.or(binding) {
        return action.to_string();
    }
    if target_namespace.ends_with('/') {
        format!("{}{}", target_namespace, method)
    } else {
        format!("{}/{}", target_namespace, method)
    }
}

/// Request envelope builder
#[derive(Debug, Clone)]
pub struct RequestEnvelope<'a> {
    envelope_key: &'a str,
    version: SoapVersion,
    encoded: bool,
    xmlns: &'a str,
    header: Option<String>,
    body_attributes: String,
    body_id: bool,
}

impl<'a> RequestEnvelope<'a> {
    /// Envelope using `envelope_key` as the SOAP prefix
    pub fn new(envelope_key: &'a str, version: SoapVersion) -> Self {
        Self {
            envelope_key,
            version,
            encoded: false,
            xmlns: "",
            header: None,
            body_attributes: String::new(),
            body_id: false,
        }
    }

    /// Declare SOAP encoding on the envelope (rpc/encoded inputs)
    pub fn with_encoding_style(mut self, encoded: bool) -> Self {
        self.encoded = encoded;
        self
    }

    /// Extra `xmlns:` declarations, written as is after the fixed ones
    pub fn with_xmlns(mut self, xmlns: &'a str) -> Self {
        self.xmlns = xmlns;
        self
    }

    /// Emit a `Header` element holding `content`
    pub fn with_header(mut self, content: impl Into<String>) -> Self {
        self.header = Some(content.into());
        self
    }

    /// Attributes written on the `Body` tag. Each entry carries its own
    /// leading space.
    pub fn with_body_attributes(mut self, attributes: &[String]) -> Self {
        self.body_attributes = attributes.concat();
        self
    }

    /// Mark the body with `Id="_0"` so a post-processor can sign it
    pub fn with_body_id(mut self, enabled: bool) -> Self {
        self.body_id = enabled;
        self
    }

    /// Wrap `body` into the complete envelope text
    pub fn render(&self, body: &str) -> String {
        let key = self.envelope_key;
        let encoding = if self.encoded {
            format!("{}:encodingStyle=\"{}\" ", key, SOAP_ENCODING_NAMESPACE)
        } else {
            String::new()
        };
        let mut xml = format!(
            "{}<{key}:Envelope xmlns:{key}=\"{}\" xmlns:xsi=\"{}\" {}{}>",
            XML_DECLARATION,
            self.version.namespace(),
            XSI_NAMESPACE,
            encoding,
            self.xmlns,
            key = key,
        );
        if let Some(header) = &self.header {
            xml.push_str(&format!("<{key}:Header>{}</{key}:Header>", header, key = key));
        }
        xml.push_str(&format!(
            "<{key}:Body{}{}>{}</{key}:Body></{key}:Envelope>",
            self.body_attributes,
            if self.body_id { " Id=\"_0\"" } else { "" },
            body,
            key = key,
        ));
        xml
    }
}

/// Response envelope as written by the server. The prefix is always `soap`;
/// an empty body renders as `<soap:Body/>`.
pub fn response_envelope(
    version: SoapVersion,
    xmlns: &str,
    headers: &str,
    body: &str,
    timestamp: Option<DateTime<Utc>>,
) -> String {
    let mut xml = format!(
        "{}<soap:Envelope xmlns:soap=\"{}\" {}>",
        XML_DECLARATION,
        version.namespace(),
        xmlns
    );
    let mut headers = headers.to_string();
    if let Some(now) = timestamp {
        headers.push_str(&security_timestamp(now));
    }
    if !headers.is_empty() {
        xml.push_str(&format!("<soap:Header>{}</soap:Header>", headers));
    }
    if body.is_empty() {
        xml.push_str("<soap:Body/>");
    } else {
        xml.push_str(&format!("<soap:Body>{}</soap:Body>", body));
    }
    xml.push_str("</soap:Envelope>");
    xml
}

/// WS-Security header holding a `Timestamp` created at `now` and expiring
/// ten minutes later
pub fn security_timestamp(now: DateTime<Utc>) -> String {
    let expires = now + Duration::seconds(TIMESTAMP_LIFETIME_SECS);
    format!(
        "<o:Security soap:mustUnderstand=\"1\" xmlns:o=\"{}\" xmlns:u=\"{}\">    <u:Timestamp u:Id=\"_0\">      <u:Created>{}</u:Created>      <u:Expires>{}</u:Expires>    </u:Timestamp>  </o:Security>\n",
        WSSE_NAMESPACE,
        WSU_NAMESPACE,
        iso_seconds(now),
        iso_seconds(expires),
    )
}

/// ISO-8601 UTC time without fractional seconds
fn iso_seconds(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_soap_action_rules() {
        assert_eq!(soap_action(Some("override"), Some("bound"), "urn:x", "Add"), "override");
        assert_eq!(soap_action(None, Some(""), "urn:x", "Add"), "");
        assert_eq!(soap_action(None, None, "http://x.org/calc", "Add"), "http://x.org/calc/Add");
        assert_eq!(soap_action(None, None, "http://x.org/calc/", "Add"), "http://x.org/calc/Add");
    }

    #[test]
    fn test_version_settings() {
        let v = SoapVersion::from_soap12_flag(true);
        assert_eq!(v.namespace(), SOAP12_ENVELOPE_NAMESPACE);
        assert_eq!(v.content_type(), "application/soap+xml; charset=utf-8");
        assert!(!v.sends_soap_action());
        assert!(SoapVersion::default().sends_soap_action());
    }

    #[test]
    fn test_request_envelope() {
        let xml = RequestEnvelope::new("soap", SoapVersion::Soap11)
            .with_xmlns(" xmlns:tns=\"urn:x\"")
            .render("<tns:Ping/>");
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"  xmlns:tns=\"urn:x\"><soap:Body><tns:Ping/></soap:Body></soap:Envelope>"
        );
    }

    #[test]
    fn test_request_envelope_header_and_body_attributes() {
        let xml = RequestEnvelope::new("env", SoapVersion::Soap12)
            .with_encoding_style(true)
            .with_header("<h/>")
            .with_body_attributes(&[" a=\"1\"".to_string()])
            .with_body_id(true)
            .render("");
        assert!(xml.contains("env:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\" >"));
        assert!(xml.contains("<env:Header><h/></env:Header>"));
        assert!(xml.contains("<env:Body a=\"1\" Id=\"_0\"></env:Body>"));
        assert!(roxmltree::Document::parse(&xml).is_ok());
    }

    #[test]
    fn test_body_attributes_are_single_spaced() {
        let xml = RequestEnvelope::new("soap", SoapVersion::Soap11)
            .with_body_attributes(&[" a=\"1\"".to_string(), " b=\"2\"".to_string()])
            .render("");
        assert!(xml.contains("<soap:Body a=\"1\" b=\"2\">"));
        assert!(!xml.contains("  b="));
    }

    #[test]
    fn test_response_envelope_empty_body() {
        let xml = response_envelope(SoapVersion::Soap11, "", "", "", None);
        assert!(xml.ends_with("<soap:Body/></soap:Envelope>"));
        assert!(!xml.contains("Header"));
    }

    #[test]
    fn test_security_timestamp() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let header = security_timestamp(now);
        assert!(header.contains("<u:Created>2024-01-02T03:04:05Z</u:Created>"));
        assert!(header.contains("<u:Expires>2024-01-02T03:14:05Z</u:Expires>"));

        let xml = response_envelope(SoapVersion::Soap11, "", "", "<r/>", Some(now));
        assert!(xml.contains("<soap:Header><o:Security"));
        assert!(roxmltree::Document::parse(&xml).is_ok());
    }
}
