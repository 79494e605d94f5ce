//! Transport capability
//!
//! The HTTP layer is supplied by the caller. The crate hands a transport
//! ready-made envelopes and header maps and reads back status, headers and
//! body text; sockets, redirects, TLS and compression all live behind the
//! [`Transport`] trait.

use crate::error::Result;
use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::io::{BufRead, Cursor};
use std::sync::Arc;

static LEADING_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<!--[\s\S]*?-->").expect("valid comment regex"));

static ENVELOPE_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:<\?[^?]*\?>\s*)?<([^:<>\s]*):Envelope").expect("valid envelope regex")
});

/// Hook applied to the fully assembled request envelope
pub type PostProcessFn = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Per-request options threaded from the caller through security to the transport
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Correlation id for the request/response exchange
    pub exchange_id: Option<String>,
    /// Transport specific settings; security plugins merge their defaults here
    pub extra: Map<String, Value>,
    /// Caller hook applied to the envelope after security post-processing
    pub post_process: Option<PostProcessFn>,
}

impl RequestOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the exchange id
    pub fn with_exchange_id(mut self, id: impl Into<String>) -> Self {
        self.exchange_id = Some(id.into());
        self
    }

    /// Set a transport specific option
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Set the envelope post-processing hook
    pub fn with_post_process<F>(mut self, f: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        self.post_process = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("exchange_id", &self.exchange_id)
            .field("extra", &self.extra)
            .field("post_process", &self.post_process.is_some())
            .finish()
    }
}

/// Buffered HTTP response
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: IndexMap<String, String>,
    /// Body text
    pub body: String,
}

impl HttpResponse {
    /// A response with the given status and body
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: IndexMap::new(),
            body: body.into(),
        }
    }
}

/// Response whose body is read incrementally
pub struct StreamResponse {
    /// Status code
    pub status: u16,
    /// Response headers
    pub headers: IndexMap<String, String>,
    /// Body reader
    pub body: Box<dyn BufRead + Send>,
}

impl fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish()
    }
}

/// Pluggable HTTP transport.
///
/// `body` is `None` for document fetches (GET) and the envelope text for
/// SOAP calls (POST).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform a request and return the buffered response
    async fn request(
        &self,
        url: &str,
        body: Option<&str>,
        headers: &IndexMap<String, String>,
        options: &RequestOptions,
    ) -> Result<HttpResponse>;

    /// Perform a request and return a readable body.
    ///
    /// The default buffers through [`Transport::request`].
    async fn request_stream(
        &self,
        url: &str,
        body: Option<&str>,
        headers: &IndexMap<String, String>,
        options: &RequestOptions,
    ) -> Result<StreamResponse> {
        let response = self.request(url, body, headers, options).await?;
        Ok(StreamResponse {
            status: response.status,
            headers: response.headers,
            body: Box::new(Cursor::new(response.body.into_bytes())),
        })
    }
}

/// Cut the `<prefix:Envelope>...</prefix:Envelope>` region (with an optional
/// leading `<?xml?>` declaration) out of a response body that carries noise
/// around it. The first comment in the body is dropped before searching.
/// Bodies without an envelope are returned unchanged.
pub fn extract_envelope(body: &str) -> String {
    let cleaned = LEADING_COMMENT.replace(body, "");
    let captures = match ENVELOPE_OPEN.captures(&cleaned) {
        Some(c) => c,
        None => return body.to_string(),
    };
    let (start, prefix) = match (captures.get(0), captures.get(1)) {
        (Some(whole), Some(prefix)) => (whole.start(), prefix.as_str()),
        _ => return body.to_string(),
    };
    let close = format!("</{}:envelope>", prefix.to_ascii_lowercase());
    let lower = cleaned.to_ascii_lowercase();
    match lower.rfind(&close) {
        Some(end) if end > start => cleaned[start..end + close.len()].to_string(),
        _ => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_envelope_strips_noise() {
        let body = "garbage--<?xml version=\"1.0\"?>\n<soap:Envelope xmlns:soap=\"x\"><soap:Body/></soap:Envelope>trailing";
        assert_eq!(
            extract_envelope(body),
            "<?xml version=\"1.0\"?>\n<soap:Envelope xmlns:soap=\"x\"><soap:Body/></soap:Envelope>"
        );
    }

    #[test]
    fn test_extract_envelope_case_insensitive_close() {
        let body = "<!-- note --><S:Envelope><S:Body/></s:envelope>";
        assert_eq!(extract_envelope(body), "<S:Envelope><S:Body/></s:envelope>");
    }

    #[test]
    fn test_extract_envelope_passthrough() {
        assert_eq!(extract_envelope("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_request_options_debug() {
        let opts = RequestOptions::new()
            .with_exchange_id("abc")
            .with_post_process(|s| s);
        let rendered = format!("{:?}", opts);
        assert!(rendered.contains("abc"));
        assert!(rendered.contains("post_process: true"));
    }
}
