//! OASIS XML Catalog model
//!
//! Parses catalog documents (OASIS XML Catalogs 1.1 vocabulary) into an ordered,
//! read-only resolution table and answers system, public and URI lookups against it.
//!
//! Catalogs referenced through `nextCatalog` and `delegate*` entries are loaded while
//! the model is built, so lookups never touch the file system and a built model can be
//! shared freely between the resolver and the schema engine.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node, ParsingOptions};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{CatalogError, CatalogResult};

/// Namespace of the OASIS catalog vocabulary
pub const OASIS_CATALOG_NS: &str = "urn:oasis:names:tc:entity:xmlns:xml:catalog";

/// Local name of the OASIS catalog root element
pub const OASIS_CATALOG_ELEMENT: &str = "catalog";

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Whether public identifiers may be used when a system identifier is also supplied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prefer {
    Public,
    System,
}

impl Prefer {
    fn from_attribute(value: &str) -> Option<Self> {
        match value.trim() {
            "public" => Some(Prefer::Public),
            "system" => Some(Prefer::System),
            _ => None,
        }
    }
}

/// Kind of a catalog entry, named after the catalog element that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Public,
    System,
    Uri,
    RewriteSystem,
    RewriteUri,
    SystemSuffix,
    UriSuffix,
    DelegatePublic,
    DelegateSystem,
    DelegateUri,
    NextCatalog,
}

/// One mapping loaded from a catalog document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub kind: EntryKind,
    /// Identifier, prefix or suffix the entry matches (empty for `nextCatalog`)
    pub key: String,
    /// Absolute location: the mapped resource, the rewrite prefix or the catalog to consult
    pub location: String,
    /// Effective `prefer` setting in scope for the entry
    pub prefer: Prefer,
}

impl CatalogEntry {
    /// Public identifier matched by this entry, if it is a public-id entry
    pub fn public_id(&self) -> Option<&str> {
        match self.kind {
            EntryKind::Public => Some(&self.key),
            _ => None,
        }
    }

    /// System identifier matched by this entry, if it is a system-id entry
    pub fn system_id(&self) -> Option<&str> {
        match self.kind {
            EntryKind::System => Some(&self.key),
            _ => None,
        }
    }

    /// Location the entry resolves to
    pub fn resolved_location(&self) -> &str {
        &self.location
    }
}

/// Entries parsed from a single catalog document, in document order
#[derive(Debug, Clone)]
pub struct CatalogFile {
    pub path: PathBuf,
    pub entries: Vec<CatalogEntry>,
}

/// Outcome of searching one catalog (and its chained catalogs)
enum Outcome {
    Match(String),
    /// Delegation happened and failed: resolution is over and unsuccessful.
    Stop,
    Miss,
}

/// Read-only resolution table built from one or more catalog documents
#[derive(Debug, Clone)]
pub struct CatalogModel {
    files: Vec<CatalogFile>,
    by_location: HashMap<String, usize>,
    top_level: Vec<usize>,
    prefer_public: bool,
}

impl CatalogModel {
    /// An empty model: every lookup misses
    pub fn empty(prefer_public: bool) -> Self {
        Self {
            files: Vec::new(),
            by_location: HashMap::new(),
            top_level: Vec::new(),
            prefer_public,
        }
    }

    /// Load the given catalog documents, in order, into one model
    pub fn load(paths: &[PathBuf], prefer_public: bool) -> CatalogResult<Self> {
        let mut model = Self::empty(prefer_public);
        info!("creating resolver from {} catalog(s)", paths.len());
        for path in paths {
            model.add_catalog(path)?;
        }
        Ok(model)
    }

    /// Add a top-level catalog and every catalog it chains to
    pub fn add_catalog(&mut self, path: &Path) -> CatalogResult<()> {
        info!("adding catalog {}", path.display());
        let index = self.load_file(path)?;
        self.top_level.push(index);

        let mut pending: Vec<usize> = vec![index];
        while let Some(current) = pending.pop() {
            let chained: Vec<String> = self.files[current]
                .entries
                .iter()
                .filter(|e| {
                    matches!(
                        e.kind,
                        EntryKind::NextCatalog
                            | EntryKind::DelegatePublic
                            | EntryKind::DelegateSystem
                            | EntryKind::DelegateUri
                    )
                })
                .map(|e| e.location.clone())
                .collect();

            for location in chained {
                if self.by_location.contains_key(&location) {
                    continue;
                }
                let Some(chained_path) = local_path(&location) else {
                    warn!("ignoring non-local chained catalog {}", location);
                    continue;
                };
                if !chained_path.is_file() {
                    warn!("ignoring missing chained catalog {}", chained_path.display());
                    continue;
                }
                pending.push(self.load_file(&chained_path)?);
            }
        }

        Ok(())
    }

    fn load_file(&mut self, path: &Path) -> CatalogResult<usize> {
        let file = parse_catalog_file(path, self.default_prefer())?;
        let key = file_location(&file.path)?;
        if let Some(&existing) = self.by_location.get(&key) {
            return Ok(existing);
        }
        debug!(
            "parsed catalog {} with {} entries",
            file.path.display(),
            file.entries.len()
        );
        self.files.push(file);
        let index = self.files.len() - 1;
        self.by_location.insert(key, index);
        Ok(index)
    }

    fn default_prefer(&self) -> Prefer {
        if self.prefer_public {
            Prefer::Public
        } else {
            Prefer::System
        }
    }

    /// Whether public identifiers win by default
    pub fn prefer_public(&self) -> bool {
        self.prefer_public
    }

    /// Top-level catalog files in load order
    pub fn catalogs(&self) -> impl Iterator<Item = &CatalogFile> {
        self.top_level.iter().map(|&i| &self.files[i])
    }

    /// Every entry of every loaded catalog document (chained ones included)
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.files.iter().flat_map(|f| f.entries.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.top_level.is_empty()
    }

    /// Resolve a system identifier
    pub fn resolve_system(&self, system_id: &str) -> Option<String> {
        if let Some(public_id) = unwrap_urn(system_id) {
            return self.resolve_public(&public_id, None);
        }
        let system_id = normalize_uri(system_id);
        let mut visited = HashSet::new();
        self.search(&self.top_level, &mut visited, &|model, index, visited| {
            model.system_in(index, &system_id, visited)
        })
    }

    /// Resolve a URI reference (e.g. a namespace name)
    pub fn resolve_uri(&self, uri: &str) -> Option<String> {
        if let Some(public_id) = unwrap_urn(uri) {
            return self.resolve_public(&public_id, None);
        }
        let uri = normalize_uri(uri);
        let mut visited = HashSet::new();
        self.search(&self.top_level, &mut visited, &|model, index, visited| {
            model.uri_in(index, &uri, visited)
        })
    }

    /// Combined public/system lookup used for external identifiers
    ///
    /// Public entries whose effective `prefer` is `public` are consulted before system
    /// entries; public entries under `prefer="system"` only apply when no system
    /// identifier was supplied.
    pub fn resolve_public(&self, public_id: &str, system_id: Option<&str>) -> Option<String> {
        let mut public_id = normalize_public(public_id);
        let mut system_id = system_id.map(str::to_string);

        if let Some(unwrapped) = system_id.as_deref().and_then(unwrap_urn) {
            if public_id.is_empty() || public_id == unwrapped {
                public_id = unwrapped;
            }
            system_id = None;
        }
        if let Some(unwrapped) = unwrap_urn(&public_id) {
            public_id = unwrapped;
        }

        let public = (!public_id.is_empty()).then_some(public_id);
        let system = system_id.map(|s| normalize_uri(&s));
        let mut visited = HashSet::new();
        self.search(&self.top_level, &mut visited, &|model, index, visited| {
            model.external_in(index, public.as_deref(), system.as_deref(), visited)
        })
    }

    /// Lookup with both identifiers optional
    pub fn resolve_entity(&self, public_id: Option<&str>, system_id: Option<&str>) -> Option<String> {
        match (public_id, system_id) {
            (Some(public_id), system_id) => self.resolve_public(public_id, system_id),
            (None, Some(system_id)) => self.resolve_system(system_id),
            (None, None) => None,
        }
    }

    fn search<F>(&self, list: &[usize], visited: &mut HashSet<usize>, step: &F) -> Option<String>
    where
        F: Fn(&Self, usize, &mut HashSet<usize>) -> Outcome,
    {
        for &index in list {
            match step(self, index, visited) {
                Outcome::Match(location) => return Some(location),
                Outcome::Stop => return None,
                Outcome::Miss => {}
            }
        }
        None
    }

    fn chained(&self, location: &str) -> Option<usize> {
        self.by_location.get(location).copied()
    }

    fn next_catalogs(&self, index: usize) -> Vec<usize> {
        self.files[index]
            .entries
            .iter()
            .filter(|e| e.kind == EntryKind::NextCatalog)
            .filter_map(|e| self.chained(&e.location))
            .collect()
    }

    fn delegates(&self, index: usize, kind: EntryKind, identifier: &str) -> Vec<usize> {
        let mut matches: Vec<&CatalogEntry> = self.files[index]
            .entries
            .iter()
            .filter(|e| e.kind == kind && identifier.starts_with(&e.key))
            .collect();
        // Longest prefix first; stable sort keeps document order among equals.
        matches.sort_by(|a, b| b.key.len().cmp(&a.key.len()));

        let mut catalogs = Vec::new();
        for entry in matches {
            if let Some(chained) = self.chained(&entry.location)
                && !catalogs.contains(&chained)
            {
                catalogs.push(chained);
            }
        }
        catalogs
    }

    fn follow(&self, list: &[usize], visited: &mut HashSet<usize>, step: &dyn Fn(&Self, usize, &mut HashSet<usize>) -> Outcome) -> Outcome {
        for &next in list {
            match step(self, next, visited) {
                Outcome::Miss => {}
                other => return other,
            }
        }
        Outcome::Miss
    }

    fn system_in(&self, index: usize, system_id: &str, visited: &mut HashSet<usize>) -> Outcome {
        if !visited.insert(index) {
            return Outcome::Miss;
        }
        let entries = &self.files[index].entries;

        if let Some(location) = match_system(entries, system_id) {
            return Outcome::Match(location);
        }

        let delegated = self.delegates(index, EntryKind::DelegateSystem, system_id);
        if !delegated.is_empty() {
            let mut fresh = HashSet::new();
            return match self.follow(&delegated, &mut fresh, &|m, i, v| m.system_in(i, system_id, v)) {
                Outcome::Match(location) => Outcome::Match(location),
                _ => Outcome::Stop,
            };
        }

        self.follow(&self.next_catalogs(index), visited, &|m, i, v| {
            m.system_in(i, system_id, v)
        })
    }

    fn uri_in(&self, index: usize, uri: &str, visited: &mut HashSet<usize>) -> Outcome {
        if !visited.insert(index) {
            return Outcome::Miss;
        }
        let entries = &self.files[index].entries;

        if let Some(entry) = entries.iter().find(|e| e.kind == EntryKind::Uri && e.key == uri) {
            return Outcome::Match(entry.location.clone());
        }
        if let Some(entry) = longest(entries, EntryKind::RewriteUri, |k| uri.starts_with(k)) {
            return Outcome::Match(format!("{}{}", entry.location, &uri[entry.key.len()..]));
        }
        if let Some(entry) = longest(entries, EntryKind::UriSuffix, |k| uri.ends_with(k)) {
            return Outcome::Match(entry.location.clone());
        }

        let delegated = self.delegates(index, EntryKind::DelegateUri, uri);
        if !delegated.is_empty() {
            let mut fresh = HashSet::new();
            return match self.follow(&delegated, &mut fresh, &|m, i, v| m.uri_in(i, uri, v)) {
                Outcome::Match(location) => Outcome::Match(location),
                _ => Outcome::Stop,
            };
        }

        self.follow(&self.next_catalogs(index), visited, &|m, i, v| m.uri_in(i, uri, v))
    }

    fn external_in(
        &self,
        index: usize,
        public_id: Option<&str>,
        system_id: Option<&str>,
        visited: &mut HashSet<usize>,
    ) -> Outcome {
        if !visited.insert(index) {
            return Outcome::Miss;
        }
        let entries = &self.files[index].entries;

        if let Some(public_id) = public_id
            && let Some(entry) = entries.iter().find(|e| {
                e.kind == EntryKind::Public && e.prefer == Prefer::Public && e.key == public_id
            })
        {
            return Outcome::Match(entry.location.clone());
        }

        if let Some(system_id) = system_id
            && let Some(location) = match_system(entries, system_id)
        {
            return Outcome::Match(location);
        }

        if system_id.is_none()
            && let Some(public_id) = public_id
            && let Some(entry) = entries
                .iter()
                .find(|e| e.kind == EntryKind::Public && e.key == public_id)
        {
            return Outcome::Match(entry.location.clone());
        }

        let mut delegated = Vec::new();
        if let Some(system_id) = system_id {
            delegated = self.delegates(index, EntryKind::DelegateSystem, system_id);
        }
        if delegated.is_empty()
            && let Some(public_id) = public_id
        {
            let usable = entries.iter().any(|e| {
                e.kind == EntryKind::DelegatePublic
                    && public_id.starts_with(&e.key)
                    && (e.prefer == Prefer::Public || system_id.is_none())
            });
            if usable {
                delegated = self.delegates(index, EntryKind::DelegatePublic, public_id);
            }
        }
        if !delegated.is_empty() {
            let mut fresh = HashSet::new();
            return match self.follow(&delegated, &mut fresh, &|m, i, v| {
                m.external_in(i, public_id, system_id, v)
            }) {
                Outcome::Match(location) => Outcome::Match(location),
                _ => Outcome::Stop,
            };
        }

        self.follow(&self.next_catalogs(index), visited, &|m, i, v| {
            m.external_in(i, public_id, system_id, v)
        })
    }
}

fn match_system(entries: &[CatalogEntry], system_id: &str) -> Option<String> {
    if let Some(entry) = entries
        .iter()
        .find(|e| e.kind == EntryKind::System && e.key == system_id)
    {
        return Some(entry.location.clone());
    }
    if let Some(entry) = longest(entries, EntryKind::RewriteSystem, |k| system_id.starts_with(k)) {
        return Some(format!("{}{}", entry.location, &system_id[entry.key.len()..]));
    }
    longest(entries, EntryKind::SystemSuffix, |k| system_id.ends_with(k)).map(|e| e.location.clone())
}

/// First entry of `kind` with the longest key satisfying `matches`
fn longest<'a>(
    entries: &'a [CatalogEntry],
    kind: EntryKind,
    matches: impl Fn(&str) -> bool,
) -> Option<&'a CatalogEntry> {
    let mut best: Option<&CatalogEntry> = None;
    for entry in entries.iter().filter(|e| e.kind == kind && matches(&e.key)) {
        if best.is_none_or(|b| entry.key.len() > b.key.len()) {
            best = Some(entry);
        }
    }
    best
}

/// Parse one catalog document
pub fn parse_catalog_file(path: &Path, default_prefer: Prefer) -> CatalogResult<CatalogFile> {
    let path = std::path::absolute(path).map_err(|source| CatalogError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let content = std::fs::read_to_string(&path).map_err(|source| CatalogError::Read {
        path: path.clone(),
        source,
    })?;

    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let document =
        Document::parse_with_options(&content, options).map_err(|e| CatalogError::Malformed {
            path: path.clone(),
            details: e.to_string(),
        })?;

    let root = document.root_element();
    let tag = root.tag_name();
    if tag.namespace() != Some(OASIS_CATALOG_NS) || tag.name() != OASIS_CATALOG_ELEMENT {
        return Err(CatalogError::NotACatalog {
            path,
            namespace: tag.namespace().unwrap_or_default().to_string(),
            local_name: tag.name().to_string(),
        });
    }

    let base = Url::parse(&file_location(&path)?).map_err(|e| CatalogError::InvalidLocation {
        location: path.display().to_string(),
        details: e.to_string(),
    })?;

    let mut entries = Vec::new();
    collect_entries(root, &base, default_prefer, &path, &mut entries)?;
    Ok(CatalogFile { path, entries })
}

fn collect_entries(
    element: Node<'_, '_>,
    inherited_base: &Url,
    inherited_prefer: Prefer,
    path: &Path,
    entries: &mut Vec<CatalogEntry>,
) -> CatalogResult<()> {
    let base = element_base(element, inherited_base)?;
    let prefer = element
        .attribute("prefer")
        .and_then(Prefer::from_attribute)
        .unwrap_or(inherited_prefer);

    for child in element.children().filter(|n| n.is_element()) {
        if child.tag_name().namespace() != Some(OASIS_CATALOG_NS) {
            continue;
        }
        let name = child.tag_name().name();
        if name == "group" {
            collect_entries(child, &base, prefer, path, entries)?;
            continue;
        }

        let (kind, key_attribute, location_attribute) = match name {
            "public" => (EntryKind::Public, Some("publicId"), "uri"),
            "system" => (EntryKind::System, Some("systemId"), "uri"),
            "uri" => (EntryKind::Uri, Some("name"), "uri"),
            "rewriteSystem" => (
                EntryKind::RewriteSystem,
                Some("systemIdStartString"),
                "rewritePrefix",
            ),
            "rewriteURI" => (EntryKind::RewriteUri, Some("uriStartString"), "rewritePrefix"),
            "systemSuffix" => (EntryKind::SystemSuffix, Some("systemIdSuffix"), "uri"),
            "uriSuffix" => (EntryKind::UriSuffix, Some("uriSuffix"), "uri"),
            "delegatePublic" => (
                EntryKind::DelegatePublic,
                Some("publicIdStartString"),
                "catalog",
            ),
            "delegateSystem" => (
                EntryKind::DelegateSystem,
                Some("systemIdStartString"),
                "catalog",
            ),
            "delegateURI" => (EntryKind::DelegateUri, Some("uriStartString"), "catalog"),
            "nextCatalog" => (EntryKind::NextCatalog, None, "catalog"),
            other => {
                debug!("ignoring unknown catalog element '{}' in {}", other, path.display());
                continue;
            }
        };

        let key = match key_attribute {
            Some(attribute) => match child.attribute(attribute) {
                Some(value) => value,
                None => {
                    warn!(
                        "skipping <{}> without '{}' in {}",
                        name,
                        attribute,
                        path.display()
                    );
                    continue;
                }
            },
            None => "",
        };
        let Some(target) = child.attribute(location_attribute) else {
            warn!(
                "skipping <{}> without '{}' in {}",
                name,
                location_attribute,
                path.display()
            );
            continue;
        };

        let entry_prefer = child
            .attribute("prefer")
            .and_then(Prefer::from_attribute)
            .unwrap_or(prefer);
        let entry_base = element_base(child, &base)?;
        let location = entry_base
            .join(target.trim())
            .map_err(|e| CatalogError::InvalidLocation {
                location: target.to_string(),
                details: e.to_string(),
            })?;

        let key = match kind {
            EntryKind::Public | EntryKind::DelegatePublic => normalize_public(key),
            _ => normalize_uri(key),
        };
        entries.push(CatalogEntry {
            kind,
            key,
            location: location.to_string(),
            prefer: entry_prefer,
        });
    }
    Ok(())
}

fn element_base(element: Node<'_, '_>, inherited: &Url) -> CatalogResult<Url> {
    match element.attribute((XML_NS, "base")) {
        Some(value) => inherited
            .join(value.trim())
            .map_err(|e| CatalogError::InvalidLocation {
                location: value.to_string(),
                details: e.to_string(),
            }),
        None => Ok(inherited.clone()),
    }
}

/// `file:` URL of an absolute path, used as the identity of a loaded catalog
fn file_location(path: &Path) -> CatalogResult<String> {
    Url::from_file_path(path)
        .map(|u| u.to_string())
        .map_err(|_| CatalogError::InvalidLocation {
            location: path.display().to_string(),
            details: "path is not absolute".to_string(),
        })
}

/// Local file system path of a resolved location, if it denotes one
///
/// Accepts `file:` URLs and absolute paths; every other scheme is non-local.
pub fn local_path(location: &str) -> Option<PathBuf> {
    match Url::parse(location) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
        // Windows drive letters parse as a one-letter scheme.
        Ok(url) if url.scheme().len() == 1 => Some(PathBuf::from(location)),
        Ok(_) => None,
        Err(_) => {
            let path = PathBuf::from(location);
            path.is_absolute().then_some(path)
        }
    }
}

/// Normalize a system identifier or URI for comparison (OASIS §6.3)
pub fn normalize_uri(uri: &str) -> String {
    let mut normalized = String::with_capacity(uri.len());
    for byte in uri.bytes() {
        let escape = byte <= 0x20
            || byte >= 0x7F
            || matches!(byte, b'"' | b'<' | b'>' | b'\\' | b'^' | b'`' | b'{' | b'|' | b'}');
        if escape {
            normalized.push_str(&format!("%{:02X}", byte));
        } else {
            normalized.push(byte as char);
        }
    }
    normalized
}

/// Normalize a public identifier: trim and collapse whitespace runs
pub fn normalize_public(public_id: &str) -> String {
    public_id.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Unwrap a `urn:publicid:` URN into a public identifier (OASIS §6.4)
pub fn unwrap_urn(identifier: &str) -> Option<String> {
    const PREFIX: &str = "urn:publicid:";
    let prefix = identifier.get(..PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(PREFIX) {
        return None;
    }

    let urn = &identifier[PREFIX.len()..];
    let mut public_id = String::with_capacity(urn.len());
    let mut rest = urn;
    while let Some(c) = rest.chars().next() {
        let (replacement, consumed): (&str, usize) = match c {
            '+' => (" ", 1),
            ':' => ("//", 1),
            ';' => ("::", 1),
            '%' => match rest.get(1..3).map(str::to_ascii_uppercase).as_deref() {
                Some("2B") => ("+", 3),
                Some("3A") => (":", 3),
                Some("2F") => ("/", 3),
                Some("3B") => (";", 3),
                Some("27") => ("'", 3),
                Some("3F") => ("?", 3),
                Some("23") => ("#", 3),
                Some("25") => ("%", 3),
                _ => ("%", 1),
            },
            _ => {
                public_id.push(c);
                rest = &rest[c.len_utf8()..];
                continue;
            }
        };
        public_id.push_str(replacement);
        rest = &rest[consumed..];
    }
    Some(public_id)
}
