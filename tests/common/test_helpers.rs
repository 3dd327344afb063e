#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const ORDER_SCHEMA: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           targetNamespace="urn:example:v1"
           elementFormDefault="qualified">
  <xs:element name="order">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="id" type="xs:int"/>
        <xs:element name="item" type="xs:string" maxOccurs="unbounded"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

pub const VALID_ORDER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<order xmlns="urn:example:v1">
  <id>42</id>
  <item>widget</item>
</order>"#;

/// One violation: `id` is not an integer (line 3)
pub const INVALID_ORDER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<order xmlns="urn:example:v1">
  <id>forty-two</id>
  <item>widget</item>
</order>"#;

pub const UNMAPPED_ORDER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<order xmlns="urn:example:unmapped">
  <id>42</id>
</order>"#;

pub const PLAIN_DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<notes>
  <note>no schema here</note>
</notes>"#;

/// Wrap catalog entries in an OASIS catalog document
pub fn catalog_document(entries: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<catalog xmlns="urn:oasis:names:tc:entity:xmlns:xml:catalog">
{}
</catalog>"#,
        entries
    )
}

/// Temporary tree holding catalogs, schemas and target documents
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    pub fn catalog(&self, relative: &str, entries: &str) -> PathBuf {
        self.write(relative, &catalog_document(entries))
    }

    /// `schemas/catalog.xml` mapping `urn:example:v1` to `schemas/order.xsd`
    pub fn order_catalog(&self) -> PathBuf {
        self.write("schemas/order.xsd", ORDER_SCHEMA);
        self.catalog(
            "schemas/catalog.xml",
            r#"<uri name="urn:example:v1" uri="order.xsd"/>"#,
        )
    }
}
