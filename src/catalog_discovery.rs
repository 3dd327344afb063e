//! Finds OASIS catalog documents under a directory tree
//!
//! A file is a catalog when its first start element is
//! `{urn:oasis:names:tc:entity:xmlns:xml:catalog}catalog`; file names are irrelevant.

use std::path::{Path, PathBuf};

use quick_xml::NsReader;
use quick_xml::events::Event;
use quick_xml::name::ResolveResult;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::catalog::{OASIS_CATALOG_ELEMENT, OASIS_CATALOG_NS};
use crate::error::{CatalogError, CatalogResult};

/// Recursively list the catalog documents below `root`, in sorted traversal order
pub fn discover_catalogs(root: &Path) -> CatalogResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(CatalogError::DirectoryNotFound {
            path: root.to_path_buf(),
        });
    }

    let mut catalogs = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_xml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if !is_xml {
            continue;
        }

        match is_catalog(path) {
            Ok(true) => {
                debug!("found catalog {}", path.display());
                catalogs.push(path.to_path_buf());
            }
            Ok(false) => debug!("not a catalog: {}", path.display()),
            Err(reason) => debug!("skipping {}: {}", path.display(), reason),
        }
    }

    info!(
        "discovered {} catalog(s) under {}",
        catalogs.len(),
        root.display()
    );
    Ok(catalogs)
}

/// Stream-parse `path` up to its first start element and check its expanded name
pub fn is_catalog(path: &Path) -> Result<bool, quick_xml::Error> {
    let mut reader = NsReader::from_file(path)?;
    let mut buffer = Vec::new();

    loop {
        match reader.read_event_into(&mut buffer)? {
            Event::Start(tag) | Event::Empty(tag) => {
                let (ns, local) = reader.resolve_element(tag.name());
                let in_catalog_ns = matches!(
                    ns,
                    ResolveResult::Bound(namespace) if namespace.as_ref() == OASIS_CATALOG_NS.as_bytes()
                );
                return Ok(in_catalog_ns && local.as_ref() == OASIS_CATALOG_ELEMENT.as_bytes());
            }
            Event::Eof => return Ok(false),
            _ => {}
        }
        buffer.clear();
    }
}
