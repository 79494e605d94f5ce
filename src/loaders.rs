//! Document loading
//!
//! This module fetches WSDL and schema documents. Files are read through
//! `tokio::fs`; http(s) locations go through the caller's [`Transport`] as a
//! GET with the configured WSDL headers.

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::Location;
use crate::transport::{RequestOptions, Transport};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Resource loader for WSDL and schema documents
#[derive(Clone)]
pub struct Loader {
    /// Resource limits
    limits: Limits,
    /// Whether to allow remote resources
    allow_remote: bool,
    /// Transport used for http(s) locations
    transport: Option<Arc<dyn Transport>>,
    /// Extra headers sent with every remote fetch
    headers: IndexMap<String, String>,
}

impl Loader {
    /// Create a new loader with default settings
    pub fn new() -> Self {
        Self {
            limits: Limits::default(),
            allow_remote: true,
            transport: None,
            headers: IndexMap::new(),
        }
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set whether to allow remote resources
    pub fn with_allow_remote(mut self, allow: bool) -> Self {
        self.allow_remote = allow;
        self
    }

    /// Set the transport used for remote documents
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set headers sent with remote fetches
    pub fn with_headers(mut self, headers: IndexMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Limits enforced by this loader
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Load a document as text, without a byte-order mark
    pub async fn load(&self, location: &Location) -> Result<String> {
        let content = match location {
            Location::Path(path) => {
                debug!("Reading file: {}", path.display());
                tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::Resource(format!("Failed to read file '{}': {}", path.display(), e))
                })?
            }
            Location::Url(url) => {
                if !self.allow_remote {
                    return Err(Error::Resource(
                        "Remote resources are not allowed".to_string(),
                    ));
                }
                let transport = self.transport.as_ref().ok_or_else(|| {
                    Error::Resource(format!("No transport configured to fetch {}", url))
                })?;
                debug!("Reading url: {}", url);
                let response = transport
                    .request(url.as_str(), None, &self.headers, &RequestOptions::new())
                    .await?;
                if response.status != 200 {
                    return Err(Error::Resource(format!(
                        "Invalid WSDL URL: {}\n\n\r Code: {}\n\n\r Response Body: {}",
                        url, response.status, response.body
                    )));
                }
                response.body
            }
        };

        self.limits.check_xml_size(content.len())?;

        Ok(strip_bom(content))
    }
}

/// Drop a leading UTF-8 byte-order mark
pub fn strip_bom(text: String) -> String {
    match text.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => text,
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("limits", &self.limits)
            .field("allow_remote", &self.allow_remote)
            .field("transport", &self.transport.is_some())
            .field("headers", &self.headers)
            .finish()
    }
}
