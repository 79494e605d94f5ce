//! XML name utilities
//!
//! Splitting of prefixed names, the reserved target-namespace prefix used in
//! namespace maps, XSD primitive type names and identifier normalisation.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

/// Prefix under which a document's target (or default) namespace is recorded
/// in prefix maps. Unprefixed names resolve through it.
pub const TNS_PREFIX: &str = "__tns__";

static NON_IDENTIFIER_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[^a-z$_0-9]").expect("valid identifier regex"));

const PRIMITIVES: &[&str] = &[
    "string",
    "boolean",
    "decimal",
    "float",
    "double",
    "anyType",
    "byte",
    "int",
    "long",
    "short",
    "negativeInteger",
    "nonNegativeInteger",
    "positiveInteger",
    "nonPositiveInteger",
    "unsignedByte",
    "unsignedInt",
    "unsignedLong",
    "unsignedShort",
    "duration",
    "dateTime",
    "time",
    "date",
    "gYearMonth",
    "gYear",
    "gMonthDay",
    "gDay",
    "gMonth",
    "hexBinary",
    "base64Binary",
    "anyURI",
    "QName",
    "NOTATION",
];

/// A name split at its first colon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitName<'a> {
    /// Prefix, or [`TNS_PREFIX`] when the name has none
    pub prefix: &'a str,
    /// Local part
    pub name: &'a str,
}

/// Split `prefix:local` at the first colon.
///
/// A name without a colon gets [`TNS_PREFIX`]; a leading colon yields an
/// empty prefix.
pub fn split_qname(qname: &str) -> SplitName<'_> {
    match qname.find(':') {
        Some(i) => SplitName {
            prefix: &qname[..i],
            name: &qname[i + 1..],
        },
        None => SplitName {
            prefix: TNS_PREFIX,
            name: qname,
        },
    }
}

/// Local part of a possibly prefixed name
pub fn local_name(qname: &str) -> &str {
    split_qname(qname).name
}

/// Whether `name` is one of the built-in XSD primitive type names
pub fn is_primitive(name: &str) -> bool {
    PRIMITIVES.contains(&name)
}

/// Append a colon to a non-empty prefix that lacks one
pub fn append_colon(ns: &str) -> String {
    if !ns.is_empty() && !ns.ends_with(':') {
        format!("{}:", ns)
    } else {
        ns.to_string()
    }
}

/// Strip a trailing colon from a prefix
pub fn no_colon(ns: &str) -> &str {
    ns.strip_suffix(':').unwrap_or(ns)
}

/// Find the first prefix bound to `uri`, skipping [`TNS_PREFIX`]
pub fn find_prefix<'a>(xmlns: &'a IndexMap<String, String>, uri: &str) -> Option<&'a str> {
    xmlns
        .iter()
        .find(|(prefix, ns)| prefix.as_str() != TNS_PREFIX && ns.as_str() == uri)
        .map(|(prefix, _)| prefix.as_str())
}

/// Replace characters that cannot appear in an identifier with `_`
pub fn normalize_identifier(name: &str) -> String {
    NON_IDENTIFIER_CHARS.replace_all(name, "_").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qname() {
        let split = split_qname("xs:string");
        assert_eq!(split.prefix, "xs");
        assert_eq!(split.name, "string");

        let split = split_qname("Request");
        assert_eq!(split.prefix, TNS_PREFIX);
        assert_eq!(split.name, "Request");

        let split = split_qname(":bare");
        assert_eq!(split.prefix, "");
        assert_eq!(split.name, "bare");
    }

    #[test]
    fn test_colons() {
        assert_eq!(append_colon("tns"), "tns:");
        assert_eq!(append_colon("tns:"), "tns:");
        assert_eq!(append_colon(""), "");
        assert_eq!(no_colon("tns:"), "tns");
        assert_eq!(no_colon("tns"), "tns");
    }

    #[test]
    fn test_find_prefix_skips_tns() {
        let mut xmlns = IndexMap::new();
        xmlns.insert(TNS_PREFIX.to_string(), "urn:a".to_string());
        xmlns.insert("a".to_string(), "urn:a".to_string());
        assert_eq!(find_prefix(&xmlns, "urn:a"), Some("a"));
        assert_eq!(find_prefix(&xmlns, "urn:b"), None);
    }

    #[test]
    fn test_primitives() {
        assert!(is_primitive("dateTime"));
        assert!(is_primitive("string"));
        assert!(!is_primitive("Person"));
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("get-item.v2"), "get_item_v2");
        assert_eq!(normalize_identifier("$ok_1"), "$ok_1");
    }
}
