//! Integration tests for the XML ⇄ value codec against the calculator fixture

use once_cell::sync::Lazy;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};
use soapwire::envelope::{RequestEnvelope, SoapVersion};
use soapwire::{Loader, Wsdl, WsdlCache, WsdlOptions};
use std::sync::Arc;

static CALCULATOR: Lazy<Arc<Wsdl>> = Lazy::new(|| {
    let path = format!("{}/tests/wsdl/calculator.wsdl", env!("CARGO_MANIFEST_DIR"));
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime
        .block_on(Wsdl::load(
            &path,
            WsdlOptions::default(),
            &Loader::new(),
            &WsdlCache::new(),
        ))
        .unwrap()
});

static REGISTRY: Lazy<Arc<Wsdl>> = Lazy::new(|| {
    let path = format!("{}/tests/wsdl/registry.wsdl", env!("CARGO_MANIFEST_DIR"));
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime
        .block_on(Wsdl::load(
            &path,
            WsdlOptions::default(),
            &Loader::new(),
            &WsdlCache::new(),
        ))
        .unwrap()
});

/// `Req` body of the registry fixture, prefixed with `a`
fn registry_body(args: &Value) -> String {
    REGISTRY.object_to_document_xml("Req", args, "a", Some("urn:a"), Some("Req"), None)
}

/// Body fragment for the element-based input message `message`
fn document_body(wsdl: &Wsdl, message: &str, args: &Value) -> String {
    let element = wsdl.definitions().messages[message].element().unwrap();
    let type_name = element.node.type_name().unwrap_or(&element.lookup_type);
    wsdl.object_to_document_xml(
        element.name(),
        args,
        &element.target_ns_alias,
        element.target_namespace.as_deref(),
        Some(type_name),
        Some(element),
    )
}

fn request(wsdl: &Wsdl, body: &str) -> String {
    RequestEnvelope::new("soap", SoapVersion::Soap11)
        .with_xmlns(wsdl.xmlns_in_envelope())
        .render(body)
}

fn decode_record(args: &Value) -> Value {
    let wsdl = &*CALCULATOR;
    let xml = request(wsdl, &document_body(wsdl, "StoreRecordInput", args));
    let decoded = wsdl.xml_to_object(&xml).unwrap();
    decoded["Body"]["Record"].clone()
}

#[test]
fn test_add_body_is_qualified() {
    let wsdl = &*CALCULATOR;
    let body = document_body(wsdl, "AddInput", &json!({"a": 1, "b": 2}));
    assert_eq!(
        body,
        r#"<Add xmlns="http://example.com/calculator"><a>1</a><b>2</b></Add>"#
    );
}

#[test]
fn test_encoding_is_stable() {
    let wsdl = &*CALCULATOR;
    let args = json!({"title": "t", "count": 1, "active": true, "tags": ["x", "y"], "owner": "o"});
    let first = document_body(wsdl, "StoreRecordInput", &args);
    let second = document_body(wsdl, "StoreRecordInput", &args);
    assert_eq!(first, second);
}

#[test]
fn test_request_envelope_is_well_formed() {
    let wsdl = &*CALCULATOR;
    let xml = request(
        wsdl,
        &document_body(wsdl, "StoreRecordInput", &json!({"title": "a & b", "count": 2})),
    );
    let doc = roxmltree::Document::parse(&xml).unwrap();
    let title = doc
        .descendants()
        .find(|n| n.has_tag_name("title"))
        .and_then(|n| n.text());
    assert_eq!(title, Some("a & b"));
}

#[test]
fn test_array_cardinality_follows_schema() {
    let record = decode_record(&json!({
        "title": "single",
        "count": 1,
        "active": false,
        "tags": ["only"],
        "owner": ["me"],
    }));
    assert_eq!(record["tags"], json!(["only"]));
    assert_eq!(record["owner"], json!("me"));

    let record = decode_record(&json!({"title": "many", "tags": ["b", "a", "c"]}));
    assert_eq!(record["tags"], json!(["b", "a", "c"]));
}

#[test]
fn test_recursive_type_decodes() {
    let wsdl = &*CALCULATOR;
    let args = json!({"root": {"label": "top", "children": [
        {"label": "left", "children": [{"label": "a"}, {"label": "b"}]},
        {"label": "right"},
    ]}});
    let xml = request(wsdl, &document_body(wsdl, "PlantTreeInput", &args));
    let decoded = wsdl.xml_to_object(&xml).unwrap();
    let root = &decoded["Body"]["Tree"]["root"];
    assert_eq!(root["label"], json!("top"));
    assert_eq!(root["children"][0]["label"], json!("left"));
    assert_eq!(root["children"][0]["children"][1]["label"], json!("b"));
    assert_eq!(root["children"][1]["label"], json!("right"));
}

#[test]
fn test_response_coercion() {
    let wsdl = &*CALCULATOR;
    let xml = request(
        wsdl,
        r#"<AddResponse xmlns="http://example.com/calculator"><sum> 42 </sum></AddResponse>"#,
    );
    let decoded = wsdl.xml_to_object(&xml).unwrap();
    assert_eq!(decoded["Body"]["AddResponse"], json!({"sum": 42}));
}

#[test]
fn test_fault_decodes_to_error() {
    let wsdl = &*CALCULATOR;
    let xml = request(
        wsdl,
        "<soap:Fault><faultcode>Test</faultcode><faultstring>test error</faultstring><detail>test detail</detail></soap:Fault>",
    );
    let err = wsdl.xml_to_object(&xml).unwrap_err();
    assert_eq!(err.to_string(), "Test: test error: test detail");

    let fault = err.as_fault().unwrap();
    assert_eq!(fault.code, "Test");
    assert_eq!(fault.status_code, None);
}

#[test]
fn test_soap12_fault_decodes_to_error() {
    let wsdl = &*CALCULATOR;
    let xml = RequestEnvelope::new("env", SoapVersion::Soap12).render(
        "<env:Fault><env:Code><env:Value>env:Receiver</env:Value></env:Code><env:Reason><env:Text>down</env:Text></env:Reason></env:Fault>",
    );
    let err = wsdl.xml_to_object(&xml).unwrap_err();
    let fault = err.as_fault().unwrap();
    assert_eq!(fault.code, "env:Receiver");
    assert_eq!(fault.reason, "down");
}

#[test]
fn test_multi_ref_in_body() {
    let wsdl = &*CALCULATOR;
    let xml = request(
        wsdl,
        r##"<Lookup><first href="#r1"/><second href="#r1"/></Lookup><multiRef id="r1"><label>shared</label></multiRef>"##,
    );
    let decoded = wsdl.xml_to_object(&xml).unwrap();
    let lookup = &decoded["Body"]["Lookup"];
    assert_eq!(lookup["first"]["label"], json!("shared"));
    assert_eq!(lookup["second"]["label"], json!("shared"));
}

#[test]
fn test_invalid_xml_is_fault() {
    let err = CALCULATOR.xml_to_object("<Envelope><Body><oops></Body></Envelope>").unwrap_err();
    let fault = err.as_fault().unwrap();
    assert_eq!(fault.reason, "Invalid XML");
    assert_eq!(fault.status_code, Some(500));
}

#[test]
fn test_child_in_second_namespace_declares_its_prefix() {
    let body = registry_body(&json!({"addr": {"city": "X"}}));
    assert_eq!(
        body,
        r#"<a:Req xmlns:a="urn:a" xmlns="urn:a"><a:addr><b:city xmlns:b="urn:b">X</b:city></a:addr></a:Req>"#
    );
}

#[test]
fn test_minted_prefixes_are_deterministic() {
    let args = json!({"pet": {
        "attributes": {"xsi_type": {"type": "Dog", "xmlns": "urn:b"}},
        "name": "Rex",
        "age": 3,
    }});
    let first = registry_body(&args);
    let second = registry_body(&args);
    assert_eq!(first, second);
    assert!(
        first.starts_with(r#"<a:Req xmlns:a="urn:a" xmlns="urn:a"><a:pet xsi:type="ns1:Dog" xmlns:ns1="urn:b">"#),
        "unexpected body {}",
        first
    );

    let xml = request(&REGISTRY, &first);
    assert!(roxmltree::Document::parse(&xml).is_ok());
    let decoded = REGISTRY.xml_to_object(&xml).unwrap();
    let pet = &decoded["Body"]["Req"]["pet"];
    assert_eq!(pet["name"], json!("Rex"));
    assert_eq!(pet["age"], json!(3));
}

#[test]
fn test_xsi_type_selects_derived_type() {
    let body = r#"<a:Req><a:pet xmlns:b="urn:b" xsi:type="b:Dog"><a:name>Rex</a:name><a:age>7</a:age></a:pet></a:Req>"#;
    let decoded = REGISTRY.xml_to_object(&request(&REGISTRY, body)).unwrap();
    let pet = &decoded["Body"]["Req"]["pet"];
    assert_eq!(pet["age"], json!(7));
    assert_eq!(pet["name"], json!("Rex"));
    assert_eq!(pet["attributes"]["xsi:type"], json!("b:Dog"));

    // the declared type has no `age`, so the text stays uncoerced
    let body = r#"<a:Req><a:pet><a:name>Rex</a:name><a:age>7</a:age></a:pet></a:Req>"#;
    let decoded = REGISTRY.xml_to_object(&request(&REGISTRY, body)).unwrap();
    assert_eq!(decoded["Body"]["Req"]["pet"]["age"], json!("7"));
}

fn word() -> impl Strategy<Value = String> {
    "[A-Za-z0-9]{1,12}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_record_round_trip(
        title in word(),
        count in any::<i32>(),
        active in any::<bool>(),
        tags in prop::collection::vec(word(), 1..5),
        owner in word(),
    ) {
        let args = json!({
            "title": title,
            "count": count,
            "active": active,
            "tags": tags,
            "owner": owner,
        });
        prop_assert_eq!(decode_record(&args), args);
    }
}
