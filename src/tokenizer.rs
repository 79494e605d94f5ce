//! Streaming XML tokenizer adapter
//!
//! Drives `quick-xml` and delivers open-tag, close-tag, text and CDATA events
//! to an [`XmlHandler`] in document order. Empty elements arrive as an open
//! tag followed by a close tag. Comments, processing instructions and doctype
//! declarations are skipped.

use crate::error::{Error, Result};
use crate::limits::Limits;
use indexmap::IndexMap;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::BufRead;

/// Receiver of tokenizer events
pub trait XmlHandler {
    /// An element was opened; attributes are in document order
    fn open_tag(&mut self, name: &str, attributes: &IndexMap<String, String>) -> Result<()>;

    /// An element was closed
    fn close_tag(&mut self, name: &str) -> Result<()>;

    /// Character data, entities already expanded
    fn text(&mut self, text: &str) -> Result<()>;

    /// A CDATA section; defaults to plain text handling
    fn cdata(&mut self, text: &str) -> Result<()> {
        self.text(text)
    }
}

fn xml_error(e: quick_xml::Error) -> Error {
    Error::Xml(e.to_string())
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(|s| s.to_string())
        .map_err(|e| Error::Xml(e.to_string()))
}

/// Tokenize an in-memory document
pub fn tokenize_str<H: XmlHandler>(xml: &str, handler: &mut H, limits: &Limits) -> Result<()> {
    limits.check_xml_size(xml.len())?;
    tokenize_reader(xml.as_bytes(), handler, limits)
}

/// Tokenize a document read incrementally from `source`
pub fn tokenize_reader<R: BufRead, H: XmlHandler>(
    source: R,
    handler: &mut H,
    limits: &Limits,
) -> Result<()> {
    let mut reader = Reader::from_reader(source);
    reader.trim_text(false);
    reader.expand_empty_elements(true);
    reader.check_end_names(true);

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(e) => {
                if depth == 0 && seen_root {
                    return Err(Error::Xml("Multiple root elements".to_string()));
                }
                depth += 1;
                seen_root = true;
                limits.check_xml_depth(depth)?;

                let name = utf8(e.name().as_ref())?;
                let mut attributes = IndexMap::new();
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| Error::Xml(e.to_string()))?;
                    let key = utf8(attr.key.as_ref())?;
                    let value = attr.unescape_value().map_err(xml_error)?;
                    attributes.insert(key, value.into_owned());
                }
                handler.open_tag(&name, &attributes)?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                let name = utf8(e.name().as_ref())?;
                handler.close_tag(&name)?;
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(xml_error)?;
                if depth == 0 {
                    if !text.trim().is_empty() {
                        return Err(Error::Xml(
                            "Text data outside of root node".to_string(),
                        ));
                    }
                    continue;
                }
                handler.text(&text)?;
            }
            Event::CData(e) => {
                let text = utf8(&e.into_inner())?;
                handler.cdata(&text)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth > 0 {
        return Err(Error::Xml("Unclosed root tag".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl XmlHandler for Recorder {
        fn open_tag(&mut self, name: &str, attributes: &IndexMap<String, String>) -> Result<()> {
            let attrs: Vec<String> = attributes
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            self.events.push(format!("open {} [{}]", name, attrs.join(",")));
            Ok(())
        }

        fn close_tag(&mut self, name: &str) -> Result<()> {
            self.events.push(format!("close {}", name));
            Ok(())
        }

        fn text(&mut self, text: &str) -> Result<()> {
            self.events.push(format!("text {}", text));
            Ok(())
        }

        fn cdata(&mut self, text: &str) -> Result<()> {
            self.events.push(format!("cdata {}", text));
            Ok(())
        }
    }

    #[test]
    fn test_event_order() {
        let mut rec = Recorder::default();
        let xml = r#"<?xml version="1.0"?><!-- c --><a x="1&amp;2"><b/>t&lt;<![CDATA[<raw>]]></a>"#;
        tokenize_str(xml, &mut rec, &Limits::default()).unwrap();
        assert_eq!(
            rec.events,
            vec![
                "open a [x=1&2]",
                "open b []",
                "close b",
                "text t<",
                "cdata <raw>",
                "close a",
            ]
        );
    }

    #[test]
    fn test_mismatched_close_is_error() {
        let mut rec = Recorder::default();
        let result = tokenize_str("<a><b></a>", &mut rec, &Limits::default());
        assert!(matches!(result, Err(Error::Xml(_))));
    }

    #[test]
    fn test_unclosed_is_error() {
        let mut rec = Recorder::default();
        assert!(tokenize_str("<a><b></b>", &mut rec, &Limits::default()).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let mut rec = Recorder::default();
        let limits = Limits::default().with_max_xml_depth(2);
        assert!(tokenize_str("<a><b><c/></b></a>", &mut rec, &limits).is_err());
    }
}
