//! Integration tests for WSDL loading, include resolution and service descriptions

use pretty_assertions::assert_eq;
use serde_json::json;
use soapwire::{Error, Loader, Wsdl, WsdlCache, WsdlOptions};
use std::sync::Arc;

fn fixture(name: &str) -> String {
    format!("{}/tests/wsdl/{}", env!("CARGO_MANIFEST_DIR"), name)
}

async fn load(name: &str, options: WsdlOptions) -> Arc<Wsdl> {
    Wsdl::load(&fixture(name), options, &Loader::new(), &WsdlCache::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_load_calculator_service_model() {
    let wsdl = load("calculator.wsdl", WsdlOptions::default()).await;
    let defs = wsdl.definitions();

    assert_eq!(wsdl.target_namespace(), Some("http://example.com/calculator"));
    let port = &defs.services["CalculatorService"].ports["CalculatorPort"];
    assert_eq!(port.location.as_deref(), Some("http://localhost:8000/calculator"));
    assert_eq!(port.binding.style, "document");

    let methods: Vec<&str> = port.binding.methods.keys().map(String::as_str).collect();
    assert_eq!(methods, vec!["Add", "StoreRecord", "PlantTree"]);

    let add = &port.binding.methods["Add"];
    assert_eq!(add.soap_action.as_deref(), Some("http://example.com/calculator/Add"));
    assert_eq!(add.input.as_ref().map(|m| m.wire_name()), Some("Add"));
    assert_eq!(add.output.as_ref().map(|m| m.wire_name()), Some("AddResponse"));
    assert!(port.binding.methods["PlantTree"].output.is_none());

    let top = &port.binding.top_elements["Record"];
    assert_eq!(top.method_name, "StoreRecord");
    assert_eq!(top.output_name, "RecordResponse");
}

#[tokio::test]
async fn test_describe_calculator() {
    let wsdl = load("calculator.wsdl", WsdlOptions::default()).await;
    let description = wsdl.describe_services();
    let port = &description["CalculatorService"]["CalculatorPort"];

    assert_eq!(port["Add"]["input"], json!({"a": "xs:int", "b": "xs:int"}));
    assert_eq!(port["Add"]["output"], json!({"sum": "xs:int"}));
    assert_eq!(port["StoreRecord"]["input"]["tags[]"], json!("xs:string"));
    assert_eq!(port["StoreRecord"]["input"]["owner"], json!("xs:string"));
    assert_eq!(port["PlantTree"]["output"], json!(null));

    let root = &port["PlantTree"]["input"]["root"];
    assert_eq!(root["label"], json!("xs:string"));
    let cycle = root["children[]"].as_str().unwrap();
    assert!(cycle.ends_with("TreeNode"), "unexpected cycle marker {}", cycle);
}

#[tokio::test]
async fn test_rpc_fixture() {
    let wsdl = load("greeter_rpc.wsdl", WsdlOptions::default()).await;
    let binding = &wsdl.definitions().services["GreeterService"].ports["GreeterPort"].binding;
    assert_eq!(binding.style, "rpc");

    let greet = &binding.methods["Greet"];
    assert_eq!(greet.style, "rpc");
    let input_use = greet.input_soap.as_ref().and_then(|b| b.use_.as_deref());
    assert_eq!(input_use, Some("encoded"));
    assert_eq!(greet.input.as_ref().and_then(|m| m.parts()).map(|parts| parts.len()), Some(2));

    let description = wsdl.describe_services();
    assert_eq!(
        description["GreeterService"]["GreeterPort"]["Greet"]["output"],
        json!({"greeting": "xs:string"})
    );
}

#[tokio::test]
async fn test_strict_mode_accepts_fixture() {
    let wsdl = load("calculator.wsdl", WsdlOptions::default().with_strict(true)).await;
    assert!(wsdl
        .find_schema_type("TreeNode", Some("http://example.com/calculator"))
        .is_some());
}

#[tokio::test]
async fn test_strict_mode_rejects_unknown_element() {
    let xml = std::fs::read_to_string(fixture("calculator.wsdl"))
        .unwrap()
        .replace("<types>", "<types><bogus/>");

    let err = Wsdl::from_xml(
        &xml,
        None,
        WsdlOptions::default().with_strict(true),
        &Loader::new(),
        &WsdlCache::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Parse(_)), "unexpected error {:?}", err);
    assert!(err.to_string().contains("bogus"));

    let lenient = Wsdl::from_xml(&xml, None, WsdlOptions::default(), &Loader::new(), &WsdlCache::new()).await;
    assert!(lenient.is_ok());
}

#[tokio::test]
async fn test_missing_file_is_resource_error() {
    let err = Wsdl::load(
        &fixture("missing.wsdl"),
        WsdlOptions::default(),
        &Loader::new(),
        &WsdlCache::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Resource(_)));
}

#[tokio::test]
async fn test_resolved_wsdl_is_cached() {
    let cache = WsdlCache::new();
    let path = fixture("calculator.wsdl");
    let first = Wsdl::load(&path, WsdlOptions::default(), &Loader::new(), &cache)
        .await
        .unwrap();
    let second = Wsdl::load(&path, WsdlOptions::default(), &Loader::new(), &cache)
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let uncached = Wsdl::load(
        &path,
        WsdlOptions::default().with_disable_cache(true),
        &Loader::new(),
        &cache,
    )
    .await
    .unwrap();
    assert!(!Arc::ptr_eq(&first, &uncached));

    cache.clear().await;
    assert_eq!(cache.document_count().await, 0);
}

const CYCLE_WSDL: &str = r#"<definitions name="Cycle" targetNamespace="urn:cycle"
    xmlns="http://schemas.xmlsoap.org/wsdl/"
    xmlns:tns="urn:cycle"
    xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <types>
    <xs:schema targetNamespace="urn:cycle">
      <xs:import namespace="urn:a" schemaLocation="a.xsd"/>
    </xs:schema>
  </types>
</definitions>"#;

const A_XSD: &str = r#"<xs:schema targetNamespace="urn:a"
    xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:b="urn:b">
  <xs:import namespace="urn:b" schemaLocation="b.xsd"/>
  <xs:complexType name="A">
    <xs:sequence><xs:element name="b" type="b:B"/></xs:sequence>
  </xs:complexType>
</xs:schema>"#;

const B_XSD: &str = r#"<xs:schema targetNamespace="urn:b"
    xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:a="urn:a">
  <xs:import namespace="urn:a" schemaLocation="a.xsd"/>
  <xs:complexType name="B">
    <xs:sequence><xs:element name="a" type="a:A" minOccurs="0"/></xs:sequence>
  </xs:complexType>
</xs:schema>"#;

#[tokio::test]
async fn test_include_cycle_terminates() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.wsdl"), CYCLE_WSDL).unwrap();
    std::fs::write(dir.path().join("a.xsd"), A_XSD).unwrap();
    std::fs::write(dir.path().join("b.xsd"), B_XSD).unwrap();

    let cache = WsdlCache::new();
    let path = dir.path().join("main.wsdl");
    let wsdl = Wsdl::load(
        path.to_str().unwrap(),
        WsdlOptions::default(),
        &Loader::new(),
        &cache,
    )
    .await
    .unwrap();

    assert!(wsdl.find_schema_type("A", Some("urn:a")).is_some());
    assert!(wsdl.find_schema_type("B", Some("urn:b")).is_some());
    assert_eq!(cache.document_count().await, 3);
}

#[tokio::test]
async fn test_relative_include_is_missing() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.wsdl"), CYCLE_WSDL).unwrap();

    let path = dir.path().join("main.wsdl");
    let err = Wsdl::load(
        path.to_str().unwrap(),
        WsdlOptions::default(),
        &Loader::new(),
        &WsdlCache::new(),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("a.xsd"));
}
