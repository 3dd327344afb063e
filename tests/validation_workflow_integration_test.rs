mod common;

use std::sync::Arc;

use catalog_validate::artifact::{
    ArtifactSelection, CatalogSelection, DeclaredDependency, DirectoryArtifactSupplier,
};
use catalog_validate::catalog::CatalogModel;
use catalog_validate::error::ValidationError;
use catalog_validate::error_reporter::Severity;
use catalog_validate::orchestrator::{RunOutcome, execute, run_validation};
use catalog_validate::resolver::{CatalogResourceResolver, ResourceResolver};
use catalog_validate::validator::ValidationStatus;
use common::*;

#[test]
fn test_schema_less_document_without_catalogs_passes() {
    let workspace = Workspace::new();
    let document = workspace.write("docs/plain.xml", PLAIN_DOCUMENT);

    let report = execute(&[], &[document], true).unwrap();

    assert_eq!(report.outcome, RunOutcome::Passed);
    assert!(report.records.is_empty());
    assert_eq!(report.files[0].status, ValidationStatus::WellFormed);
}

#[test]
fn test_single_violation_is_one_located_error() {
    let workspace = Workspace::new();
    let catalog = workspace.order_catalog();
    let document = workspace.write("docs/order.xml", INVALID_ORDER);

    let report = execute(&[catalog], &[document.clone()], true).unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.fatal_count, 0);

    let record = &report.records[0];
    assert_eq!(record.severity, Severity::Error);
    assert_eq!(record.locator.line, Some(3));
    assert!(record.locator.column.is_some());
    assert!(record.message.contains("forty-two"));
    assert!(report.message.contains(": ERROR: "));
}

#[test]
fn test_unresolved_namespace_does_not_stop_the_run() {
    let workspace = Workspace::new();
    let catalog = workspace.order_catalog();
    let unmapped = workspace.write("docs/a.xml", UNMAPPED_ORDER);
    let valid = workspace.write("docs/b.xml", VALID_ORDER);

    let report = execute(&[catalog], &[unmapped.clone(), valid.clone()], true).unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.fatal_count, 1);
    assert_eq!(report.records[0].severity, Severity::Fatal);
    assert!(report.records[0].message.contains("urn:example:unmapped"));

    assert_eq!(report.aborted_files.len(), 1);
    assert_eq!(report.aborted_files[0].path, unmapped);
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].path, valid);
    assert_eq!(report.files[0].status, ValidationStatus::Valid);
}

#[test]
fn test_malformed_catalog_aborts_before_validation() {
    let workspace = Workspace::new();
    workspace.write(
        "schemas/catalog.xml",
        r#"<catalog xmlns="urn:oasis:names:tc:entity:xmlns:xml:catalog"><uri name="a" uri="a.xsd"></catalog>"#,
    );
    let document = workspace.write("docs/order.xml", VALID_ORDER);

    let selection = CatalogSelection {
        selection: ArtifactSelection::Discover,
        catalog_dir: Some(workspace.path().join("schemas")),
        ..CatalogSelection::default()
    };
    let supplier = DirectoryArtifactSupplier::new(workspace.path());

    let error = run_validation(&selection, &supplier, &[document], true).unwrap_err();
    assert!(error.is_configuration());
    assert!(matches!(error, ValidationError::Catalog(_)));
}

#[test]
fn test_revalidating_a_file_yields_identical_records() {
    let workspace = Workspace::new();
    let catalog = workspace.order_catalog();
    let document = workspace.write("docs/order.xml", INVALID_ORDER);

    let report = execute(&[catalog], &[document.clone(), document], true).unwrap();

    assert_eq!(report.records.len(), 2);
    assert_eq!(report.records[0], report.records[1]);
}

#[test]
fn test_record_counts_add_up() {
    let workspace = Workspace::new();
    let catalog = workspace.order_catalog();
    let files = vec![
        workspace.write("docs/1.xml", INVALID_ORDER),
        workspace.write("docs/2.xml", UNMAPPED_ORDER),
        workspace.write("docs/3.xml", VALID_ORDER),
        workspace.write("docs/4.xml", PLAIN_DOCUMENT),
    ];

    let report = execute(&[catalog], &files, true).unwrap();

    assert_eq!(
        report.records.len(),
        report.warning_count + report.error_count + report.fatal_count
    );
    assert_eq!(
        report.error_count + report.fatal_count > 0,
        report.outcome == RunOutcome::Failed
    );
    assert_eq!(report.total_files(), 4);
}

#[test]
fn test_schema_location_hint_is_resolved_through_the_catalog() {
    let workspace = Workspace::new();
    workspace.write("schemas/order.xsd", ORDER_SCHEMA);
    let catalog = workspace.catalog(
        "schemas/catalog.xml",
        r#"<system systemId="http://schemas.example.com/order/v1.xsd" uri="order.xsd"/>"#,
    );
    let document = workspace.write(
        "docs/order.xml",
        r#"<?xml version="1.0"?>
<order xmlns="urn:example:v1"
       xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
       xsi:schemaLocation="urn:example:v1 http://schemas.example.com/order/v1.xsd">
  <id>1</id>
  <item>a</item>
</order>"#,
    );

    let report = execute(&[catalog], &[document], true).unwrap();

    assert!(report.passed(), "{}", report.message);
    assert!(report.files[0].schemas[0].ends_with("order.xsd"));
}

#[test]
fn test_remote_include_is_mapped_to_a_local_copy() {
    let workspace = Workspace::new();
    workspace.write(
        "schemas/common.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:example:v1" elementFormDefault="qualified">
  <xs:simpleType name="Code">
    <xs:restriction base="xs:string">
      <xs:pattern value="[A-Z]{3}"/>
    </xs:restriction>
  </xs:simpleType>
</xs:schema>"#,
    );
    workspace.write(
        "schemas/coded.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:tns="urn:example:v1"
           targetNamespace="urn:example:v1" elementFormDefault="qualified">
  <xs:include schemaLocation="http://schemas.example.com/common.xsd"/>
  <xs:element name="code" type="tns:Code"/>
</xs:schema>"#,
    );
    let catalog = workspace.catalog(
        "schemas/catalog.xml",
        r#"<uri name="urn:example:v1" uri="coded.xsd"/>
           <rewriteSystem systemIdStartString="http://schemas.example.com/" rewritePrefix="./"/>"#,
    );
    let valid = workspace.write("docs/valid.xml", r#"<code xmlns="urn:example:v1">ABC</code>"#);
    let invalid = workspace.write("docs/invalid.xml", r#"<code xmlns="urn:example:v1">abc</code>"#);

    let report = execute(&[catalog], &[valid, invalid], true).unwrap();

    assert!(report.error_count >= 1, "{}", report.message);
    assert_eq!(report.fatal_count, 0);
    assert_eq!(report.files[0].status, ValidationStatus::Valid);
    assert!(report.files[1].status.is_invalid());
}

#[test]
fn test_unmapped_remote_include_is_never_fetched() {
    let workspace = Workspace::new();
    workspace.write(
        "schemas/coded.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:example:v1" elementFormDefault="qualified">
  <xs:include schemaLocation="http://unreachable.invalid/common.xsd"/>
  <xs:element name="code" type="xs:string"/>
</xs:schema>"#,
    );
    let catalog = workspace.catalog(
        "schemas/catalog.xml",
        r#"<uri name="urn:example:v1" uri="coded.xsd"/>"#,
    );
    let document = workspace.write("docs/code.xml", r#"<code xmlns="urn:example:v1">x</code>"#);

    let report = execute(&[catalog], &[document.clone()], true).unwrap();

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.fatal_count, 1);
    assert_eq!(report.aborted_files[0].path, document);
}

#[test]
fn test_chained_catalogs_are_consulted() {
    let workspace = Workspace::new();
    workspace.write("schemas/v1/order.xsd", ORDER_SCHEMA);
    workspace.catalog(
        "schemas/v1/catalog.xml",
        r#"<uri name="urn:example:v1" uri="order.xsd"/>"#,
    );
    let root = workspace.catalog(
        "schemas/root.xml",
        r#"<nextCatalog catalog="v1/catalog.xml"/>"#,
    );
    let document = workspace.write("docs/order.xml", VALID_ORDER);

    let report = execute(&[root], &[document], true).unwrap();
    assert!(report.passed(), "{}", report.message);
}

#[test]
fn test_prefer_public_decides_entity_lookups() {
    let workspace = Workspace::new();
    workspace.write("dtd/public.dtd", "<!ELEMENT doc EMPTY>");
    workspace.write("dtd/system.dtd", "<!ELEMENT doc EMPTY>");
    let catalog = workspace.catalog(
        "dtd/catalog.xml",
        r#"<public publicId="-//Example//DTD Doc//EN" uri="public.dtd"/>
           <system systemId="http://example.com/doc.dtd" uri="system.dtd"/>"#,
    );

    let lookup = |prefer_public: bool| {
        let model = CatalogModel::load(std::slice::from_ref(&catalog), prefer_public).unwrap();
        let resolver = CatalogResourceResolver::new(Arc::new(model));
        resolver
            .resolve_entity(
                Some("-//Example//DTD Doc//EN"),
                Some("http://example.com/doc.dtd"),
            )
            .unwrap()
            .unwrap()
            .path()
            .to_path_buf()
    };

    assert!(lookup(true).ends_with("public.dtd"));
    assert!(lookup(false).ends_with("system.dtd"));
}

#[test]
fn test_convention_selection_through_the_supplier() {
    let workspace = Workspace::new();
    workspace.write("artifacts/catalog-1.0/order.xsd", ORDER_SCHEMA);
    workspace.catalog(
        "artifacts/catalog-1.0/catalog.xml",
        r#"<uri name="urn:example:v1" uri="order.xsd"/>"#,
    );
    let document = workspace.write("docs/order.xml", VALID_ORDER);

    let selection = CatalogSelection {
        selection: ArtifactSelection::Convention,
        dependencies: vec![
            "com.example.schemas:catalog:1.0"
                .parse::<DeclaredDependency>()
                .unwrap(),
        ],
        ..CatalogSelection::default()
    };
    let supplier = DirectoryArtifactSupplier::new(workspace.path().join("artifacts"));

    let report = run_validation(&selection, &supplier, &[document], true).unwrap();
    assert!(report.passed(), "{}", report.message);
    assert_eq!(report.catalogs.len(), 1);
}

#[test]
fn test_missing_artifact_is_a_configuration_error() {
    let workspace = Workspace::new();
    let selection = CatalogSelection {
        schema_version: Some("7.0".to_string()),
        ..CatalogSelection::default()
    };
    let supplier = DirectoryArtifactSupplier::new(workspace.path());

    let error = run_validation(&selection, &supplier, &[], true).unwrap_err();
    assert!(matches!(error, ValidationError::ArtifactNotFound { .. }));
    assert!(error.is_configuration());
}

/// Imports `urn:b` for the `code` element type; `{import}` is the `xs:import` element
fn importing_schema(import: &str) -> String {
    format!(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:b="urn:b"
           targetNamespace="urn:a" elementFormDefault="qualified">
  {}
  <xs:element name="doc">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="code" type="b:code"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#,
        import
    )
}

const IMPORTED_SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:b">
  <xs:simpleType name="code">
    <xs:restriction base="xs:string">
      <xs:pattern value="[A-Z]{3}"/>
    </xs:restriction>
  </xs:simpleType>
</xs:schema>"#;

#[test]
fn test_nested_imports_fall_back_to_the_namespace_entry() {
    for import in [
        r#"<xs:import namespace="urn:b" schemaLocation="http://remote.invalid/b.xsd"/>"#,
        r#"<xs:import namespace="urn:b"/>"#,
    ] {
        let workspace = Workspace::new();
        workspace.write("schemas/a.xsd", &importing_schema(import));
        workspace.write("schemas/b.xsd", IMPORTED_SCHEMA);
        let catalog = workspace.catalog(
            "schemas/catalog.xml",
            r#"<uri name="urn:a" uri="a.xsd"/>
               <uri name="urn:b" uri="b.xsd"/>"#,
        );
        let valid = workspace.write(
            "docs/valid.xml",
            r#"<doc xmlns="urn:a"><code>ABC</code></doc>"#,
        );
        let invalid = workspace.write(
            "docs/invalid.xml",
            r#"<doc xmlns="urn:a"><code>abc</code></doc>"#,
        );

        let report = execute(&[catalog.clone()], &[valid], true).unwrap();
        assert!(report.passed(), "{}: {}", import, report.message);
        assert_eq!(report.files[0].status, ValidationStatus::Valid);

        let report = execute(&[catalog], &[invalid], true).unwrap();
        assert_eq!(report.fatal_count, 0, "{}: {}", import, report.message);
        assert!(report.error_count >= 1);
    }
}

#[test]
fn test_non_ascii_namespace_is_resolved() {
    let workspace = Workspace::new();
    workspace.write(
        "schemas/accent.xsd",
        &ORDER_SCHEMA.replace("urn:example:v1", "urn:example:é"),
    );
    let catalog = workspace.catalog(
        "schemas/catalog.xml",
        r#"<uri name="urn:example:é" uri="accent.xsd"/>"#,
    );
    let mapped = workspace.write(
        "docs/mapped.xml",
        &VALID_ORDER.replace("urn:example:v1", "urn:example:é"),
    );
    let unmapped = workspace.write(
        "docs/unmapped.xml",
        &VALID_ORDER.replace("urn:example:v1", "urn:publicid:%aé"),
    );

    let report = execute(&[catalog], &[mapped.clone(), unmapped.clone()], true).unwrap();

    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].path, mapped);
    assert_eq!(report.files[0].status, ValidationStatus::Valid);
    assert_eq!(report.aborted_files[0].path, unmapped);
    assert_eq!(report.fatal_count, 1);
}
