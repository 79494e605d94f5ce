//! Security capability
//!
//! A [`Security`] plugin may add HTTP headers, merge transport options,
//! contribute XML to the envelope `Header`, and rewrite the finished envelope
//! (for example to sign the body). Every hook is optional.

use crate::transport::RequestOptions;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::fmt;

/// Rewrites the assembled envelope; runs after the envelope is complete
pub trait PostProcess: Send + Sync {
    /// Return the rewritten envelope. `envelope_key` is the SOAP prefix in use.
    fn post_process(&self, xml: String, envelope_key: &str) -> String;
}

/// Security plugin attached to a client
pub trait Security: Send + Sync + fmt::Debug {
    /// Add HTTP headers to the outgoing request
    fn add_headers(&self, _headers: &mut IndexMap<String, String>) {}

    /// Merge transport options into the outgoing request
    fn add_options(&self, _options: &mut RequestOptions) {}

    /// XML placed inside the envelope `Header`
    fn to_xml(&self) -> String {
        String::new()
    }

    /// Envelope post-processor. When present, [`Security::to_xml`] is not
    /// written into the header and the body is marked with `Id="_0"`.
    fn post_processor(&self) -> Option<&dyn PostProcess> {
        None
    }
}

/// HTTP basic authentication
#[derive(Clone)]
pub struct BasicAuthSecurity {
    username: String,
    password: String,
    defaults: Map<String, Value>,
}

impl BasicAuthSecurity {
    /// Authenticate as `username`
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            defaults: Map::new(),
        }
    }

    /// Transport options merged into every request
    pub fn with_defaults(mut self, defaults: Map<String, Value>) -> Self {
        self.defaults = defaults;
        self
    }
}

impl fmt::Debug for BasicAuthSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuthSecurity")
            .field("username", &self.username)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl Security for BasicAuthSecurity {
    fn add_headers(&self, headers: &mut IndexMap<String, String>) {
        let credentials = STANDARD.encode(format!("{}:{}", self.username, self.password));
        headers.insert("Authorization".to_string(), format!("Basic {}", credentials));
    }

    fn add_options(&self, options: &mut RequestOptions) {
        merge_into(&mut options.extra, &self.defaults);
    }
}

/// Bearer token authentication
#[derive(Clone)]
pub struct BearerSecurity {
    token: String,
    defaults: Map<String, Value>,
}

impl BearerSecurity {
    /// Authenticate with `token`
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            defaults: Map::new(),
        }
    }

    /// Transport options merged into every request
    pub fn with_defaults(mut self, defaults: Map<String, Value>) -> Self {
        self.defaults = defaults;
        self
    }
}

impl fmt::Debug for BearerSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerSecurity")
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Security for BearerSecurity {
    fn add_headers(&self, headers: &mut IndexMap<String, String>) {
        headers.insert("Authorization".to_string(), format!("Bearer {}", self.token));
    }

    fn add_options(&self, options: &mut RequestOptions) {
        merge_into(&mut options.extra, &self.defaults);
    }
}

/// Deep merge: nested objects merge key by key, anything else overwrites
fn merge_into(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge_into(existing, incoming),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
