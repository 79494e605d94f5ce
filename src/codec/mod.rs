//! Schema-driven XML ⇄ value codec
//!
//! The encoder renders `serde_json::Value` trees as XML, using the resolved
//! schema to decide namespace prefixes and qualification. The decoder turns
//! tokenizer events back into values, using [`Shape`](crate::wsdl::Shape)
//! descriptions to coerce text and to recognise repeated elements.

pub mod decoder;
pub mod encoder;

pub use decoder::Decoder;
pub use encoder::{Encoder, SchemaRef};

use serde_json::Value;

const CDATA_START: &str = "<![CDATA[";
const CDATA_END: &str = "]]>";

/// Escape XML special characters. Text already wrapped in a CDATA section is
/// returned untouched.
pub fn xml_escape(text: &str) -> String {
    if text.starts_with(CDATA_START) && text.ends_with(CDATA_END) {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Text form of a scalar value; null and containers render empty
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// Escaped text of a scalar value; only strings need escaping
pub fn escaped_text(value: &Value) -> String {
    match value {
        Value::String(s) => xml_escape(s),
        other => scalar_text(other),
    }
}
