use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use tracing::{debug, info};
use url::Url;

use crate::catalog::local_path;
use crate::error::{Result, ValidationError};
use crate::error_reporter::Diagnostic;
use crate::libxml2::{LibXml2Wrapper, ResolverGuard, XmlSchemaPtr};
use crate::resolver::{ResourceResolver, SchemaResourceRequest, XML_SCHEMA_TYPE};

/// Namespace of the `xsi:` schema location hints
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Namespace of XML Schema documents
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// What the root element of a document says about the schemas it needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentProfile {
    pub root_namespace: Option<String>,
    pub root_name: String,
    /// `xsi:schemaLocation` pairs, in document order
    pub schema_locations: Vec<(String, String)>,
    /// `xsi:noNamespaceSchemaLocation`
    pub no_namespace_location: Option<String>,
    pub line: u32,
    pub column: u32,
}

/// One schema the document needs: a namespace (absent for no-namespace) plus its hint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRequirement {
    pub namespace: Option<String>,
    pub hint: Option<String>,
}

impl DocumentProfile {
    /// A document with no namespace and no no-namespace hint needs no schema
    pub fn needs_schema(&self) -> bool {
        self.root_namespace.is_some()
            || self.no_namespace_location.is_some()
            || !self.schema_locations.is_empty()
    }

    /// Schemas to assemble: the root namespace first, then every hinted namespace
    pub fn requirements(&self) -> Vec<SchemaRequirement> {
        let mut requirements: Vec<SchemaRequirement> = Vec::new();
        let hint_for = |namespace: &str| {
            self.schema_locations
                .iter()
                .find(|(ns, _)| ns == namespace)
                .map(|(_, location)| location.clone())
        };

        match &self.root_namespace {
            Some(namespace) => requirements.push(SchemaRequirement {
                namespace: Some(namespace.clone()),
                hint: hint_for(namespace),
            }),
            None => {
                if let Some(location) = &self.no_namespace_location {
                    requirements.push(SchemaRequirement {
                        namespace: None,
                        hint: Some(location.clone()),
                    });
                }
            }
        }

        for (namespace, location) in &self.schema_locations {
            if requirements
                .iter()
                .any(|r| r.namespace.as_deref() == Some(namespace.as_str()))
            {
                continue;
            }
            requirements.push(SchemaRequirement {
                namespace: Some(namespace.clone()),
                hint: Some(location.clone()),
            });
        }
        requirements
    }
}

/// Reads the root element of a document without parsing the rest
pub struct SchemaExtractor;

impl SchemaExtractor {
    /// Profile the root element of `file_path`
    ///
    /// `Ok(None)` when no root element can be read (the document is not well-formed
    /// up to its root); the caller reports that through the full parser. I/O failures
    /// are errors.
    pub fn extract(file_path: &Path) -> Result<Option<DocumentProfile>> {
        let unreadable = |source: std::io::Error| ValidationError::UnreadableFile {
            file: file_path.to_path_buf(),
            source,
        };
        let file = File::open(file_path).map_err(unreadable)?;
        let mut reader = NsReader::from_reader(std::io::BufReader::new(file));
        let mut buffer = Vec::new();

        loop {
            let offset = reader.buffer_position() as u64;
            let event = match reader.read_event_into(&mut buffer) {
                Ok(event) => event,
                Err(quick_xml::Error::Io(e)) => {
                    return Err(unreadable(std::io::Error::new(e.kind(), e.to_string())));
                }
                Err(e) => {
                    debug!("cannot read root of {}: {}", file_path.display(), e);
                    return Ok(None);
                }
            };
            match event {
                Event::Start(tag) | Event::Empty(tag) => {
                    let tag = tag.into_owned();
                    let Some(mut profile) = Self::profile_root(&reader, &tag) else {
                        return Ok(None);
                    };
                    let (line, column) = root_position(file_path, offset).map_err(unreadable)?;
                    profile.line = line;
                    profile.column = column;
                    return Ok(Some(profile));
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
            buffer.clear();
        }
    }

    fn profile_root<R>(reader: &NsReader<R>, tag: &BytesStart<'_>) -> Option<DocumentProfile> {
        let (ns, local) = reader.resolve_element(tag.name());
        let root_namespace = match ns {
            ResolveResult::Bound(namespace) => {
                Some(String::from_utf8_lossy(namespace.as_ref()).into_owned())
            }
            ResolveResult::Unbound => None,
            ResolveResult::Unknown(_) => return None,
        };
        let root_name = String::from_utf8_lossy(local.as_ref()).into_owned();

        let mut schema_locations = Vec::new();
        let mut no_namespace_location = None;
        for attribute in tag.attributes() {
            let attribute = attribute.ok()?;
            let (ns, local) = reader.resolve_attribute(attribute.key);
            let in_xsi = matches!(
                ns,
                ResolveResult::Bound(namespace) if namespace.as_ref() == XSI_NAMESPACE.as_bytes()
            );
            if !in_xsi {
                continue;
            }
            let value = attribute.unescape_value().ok()?;
            match local.as_ref() {
                b"schemaLocation" => {
                    let tokens: Vec<&str> = value.split_whitespace().collect();
                    for pair in tokens.chunks(2) {
                        if let [namespace, location] = pair {
                            schema_locations.push((namespace.to_string(), location.to_string()));
                        }
                    }
                }
                b"noNamespaceSchemaLocation" => {
                    let location = value.trim();
                    if !location.is_empty() {
                        no_namespace_location = Some(location.to_string());
                    }
                }
                _ => {}
            }
        }

        Some(DocumentProfile {
            root_namespace,
            root_name,
            schema_locations,
            no_namespace_location,
            line: 1,
            column: 1,
        })
    }
}

/// 1-based line and column of the first `<` at or after `offset`
fn root_position(file_path: &Path, offset: u64) -> std::io::Result<(u32, u32)> {
    let mut prefix = Vec::new();
    File::open(file_path)?
        .take(offset.saturating_add(4096))
        .read_to_end(&mut prefix)?;

    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(prefix.len());
    let tag_start = prefix[start..]
        .iter()
        .position(|&b| b == b'<')
        .map_or(start, |p| start + p);

    let before = String::from_utf8_lossy(&prefix[..tag_start]);
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(newline) => before[newline + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    Ok((
        u32::try_from(line).unwrap_or(u32::MAX),
        u32::try_from(column).unwrap_or(u32::MAX),
    ))
}

/// A resolved schema document taking part in an assembled schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaImport {
    pub namespace: Option<String>,
    pub location: String,
}

/// Build the in-memory schema importing (or, for no-namespace, including) every
/// resolved schema document
pub fn assemble_wrapper_schema(imports: &[SchemaImport]) -> String {
    let mut schema = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <xs:schema xmlns:xs=\"http://www.w3.org/2001/XMLSchema\">\n",
    );
    for import in imports {
        match &import.namespace {
            Some(namespace) => schema.push_str(&format!(
                "  <xs:import namespace=\"{}\" schemaLocation=\"{}\"/>\n",
                escape_attribute(namespace),
                escape_attribute(&import.location)
            )),
            None => schema.push_str(&format!(
                "  <xs:include schemaLocation=\"{}\"/>\n",
                escape_attribute(&import.location)
            )),
        }
    }
    schema.push_str("</xs:schema>\n");
    schema
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// What the schema documents behind an import set reference in turn
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NestedReferences {
    /// Location-less imports resolved by namespace, to be imported ahead of the roots
    pub leading: Vec<SchemaImport>,
    /// Namespace of every located `xs:import`, keyed by each form the location may
    /// take when libxml2 requests it
    pub import_namespaces: HashMap<String, String>,
}

/// Keys under which libxml2 may request `location` referenced from `schema`
fn location_keys(location: &str, schema: &Path) -> Vec<String> {
    let mut keys = vec![location.to_string()];
    if let Ok(base) = Url::from_file_path(schema)
        && let Ok(joined) = base.join(location)
    {
        keys.push(joined.to_string());
        if let Ok(path) = joined.to_file_path() {
            keys.push(path.to_string_lossy().into_owned());
        }
    }
    keys.dedup();
    keys
}

/// A compiled assembled schema plus what the compiler reported while building it
#[derive(Debug)]
pub struct CompiledSchema {
    pub imports: Vec<SchemaImport>,
    pub schema: Option<XmlSchemaPtr>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Outcome of preparing the schema for one document
#[derive(Debug, Clone)]
pub enum SchemaLoad {
    /// Schema-less document: well-formedness check only
    NotRequired,
    /// A needed schema could not be resolved
    Unresolved(SchemaRequirement),
    Compiled(Arc<CompiledSchema>),
}

/// Resolves the schemas a document needs and compiles them, caching per namespace set
pub struct SchemaLoader {
    libxml2: LibXml2Wrapper,
    resolver: Arc<dyn ResourceResolver>,
    compiled: HashMap<Vec<SchemaImport>, Arc<CompiledSchema>>,
}

impl SchemaLoader {
    pub fn new(resolver: Arc<dyn ResourceResolver>) -> Self {
        Self {
            libxml2: LibXml2Wrapper::new(),
            resolver,
            compiled: HashMap::new(),
        }
    }

    pub fn libxml2(&self) -> &LibXml2Wrapper {
        &self.libxml2
    }

    pub fn resolver(&self) -> &Arc<dyn ResourceResolver> {
        &self.resolver
    }

    /// Number of distinct assembled schemas compiled so far
    pub fn cached_schemas(&self) -> usize {
        self.compiled.len()
    }

    /// Resolve and compile the schema `profile` needs
    pub fn load_schema_for(&mut self, profile: &DocumentProfile, document: &Path) -> Result<SchemaLoad> {
        if !profile.needs_schema() {
            return Ok(SchemaLoad::NotRequired);
        }

        let base_uri = Url::from_file_path(document).ok().map(|u| u.to_string());
        let mut imports = Vec::new();
        for requirement in profile.requirements() {
            match self.resolve_requirement(&requirement, document, base_uri.clone())? {
                Some(location) => imports.push(SchemaImport {
                    namespace: requirement.namespace.clone(),
                    location,
                }),
                None => return Ok(SchemaLoad::Unresolved(requirement)),
            }
        }
        imports.sort();
        imports.dedup();

        if let Some(compiled) = self.compiled.get(&imports) {
            debug!("reusing compiled schema for {} import(s)", imports.len());
            return Ok(SchemaLoad::Compiled(Arc::clone(compiled)));
        }

        let compiled = Arc::new(self.compile(imports.clone())?);
        self.compiled.insert(imports, Arc::clone(&compiled));
        Ok(SchemaLoad::Compiled(compiled))
    }

    fn resolve_requirement(
        &self,
        requirement: &SchemaRequirement,
        document: &Path,
        base_uri: Option<String>,
    ) -> Result<Option<String>> {
        let request = SchemaResourceRequest {
            resource_type: Some(XML_SCHEMA_TYPE.to_string()),
            namespace_uri: requirement.namespace.clone(),
            public_id: None,
            system_id: requirement.hint.clone(),
            base_uri,
        };

        if let Some(resource) = self.resolver.resolve_schema_resource(&request)? {
            return Ok(Some(resource.path().to_string_lossy().into_owned()));
        }

        // An unmapped hint naming a local file is read directly.
        let Some(hint) = &requirement.hint else {
            return Ok(None);
        };
        Ok(local_hint(hint, document)
            .filter(|path| path.is_file())
            .map(|path| {
                debug!("using local schema hint {}", path.display());
                path.to_string_lossy().into_owned()
            }))
    }

    /// Walk the schema documents reachable from `imports`, resolving every nested
    /// `xs:import` by namespace and location
    ///
    /// Documents that cannot be read or parsed are skipped here; the compiler reports
    /// them.
    pub fn nested_references(&self, imports: &[SchemaImport]) -> Result<NestedReferences> {
        let mut nested = NestedReferences::default();
        let mut imported: HashSet<Option<String>> =
            imports.iter().map(|import| import.namespace.clone()).collect();
        let mut visited = HashSet::new();
        let mut pending: VecDeque<PathBuf> = imports
            .iter()
            .map(|import| PathBuf::from(&import.location))
            .collect();

        while let Some(schema) = pending.pop_front() {
            if !visited.insert(schema.clone()) {
                continue;
            }
            let Ok(text) = fs::read_to_string(&schema) else {
                debug!("cannot read schema {}", schema.display());
                continue;
            };
            let options = roxmltree::ParsingOptions {
                allow_dtd: true,
                ..roxmltree::ParsingOptions::default()
            };
            let Ok(document) = roxmltree::Document::parse_with_options(&text, options) else {
                debug!("cannot parse schema {}", schema.display());
                continue;
            };
            let base_uri = Url::from_file_path(&schema).ok().map(|u| u.to_string());

            for reference in document.root_element().children().filter(|node| {
                node.is_element() && node.tag_name().namespace() == Some(XSD_NAMESPACE)
            }) {
                let namespace = match reference.tag_name().name() {
                    "import" => reference.attribute("namespace").map(str::to_string),
                    "include" | "redefine" | "override" => None,
                    _ => continue,
                };
                let location = reference.attribute("schemaLocation");
                let request = SchemaResourceRequest {
                    resource_type: Some(XML_SCHEMA_TYPE.to_string()),
                    namespace_uri: namespace.clone(),
                    public_id: None,
                    system_id: location.map(str::to_string),
                    base_uri: base_uri.clone(),
                };
                if request.namespace_uri.is_none() && request.system_id.is_none() {
                    continue;
                }
                let resolved = self
                    .resolver
                    .resolve_schema_resource(&request)?
                    .map(|resource| resource.path().to_path_buf());

                match (location, &namespace) {
                    (Some(location), Some(namespace)) => {
                        for key in location_keys(location, &schema) {
                            nested.import_namespaces.insert(key, namespace.clone());
                        }
                    }
                    (None, Some(namespace)) => {
                        if let Some(path) = &resolved
                            && imported.insert(Some(namespace.clone()))
                        {
                            debug!("importing {} for {}", path.display(), namespace);
                            nested.leading.push(SchemaImport {
                                namespace: Some(namespace.clone()),
                                location: path.to_string_lossy().into_owned(),
                            });
                        }
                    }
                    _ => {}
                }

                let next = resolved.or_else(|| {
                    location
                        .and_then(|location| local_hint(location, &schema))
                        .filter(|path| path.is_file())
                });
                if let Some(next) = next {
                    pending.push_back(next);
                }
            }
        }

        // Dependencies ahead of the schemas that reference them.
        nested.leading.reverse();
        Ok(nested)
    }

    fn compile(&self, imports: Vec<SchemaImport>) -> Result<CompiledSchema> {
        info!("compiling schema for {} import(s)", imports.len());
        let nested = self.nested_references(&imports)?;
        let mut assembled = nested.leading;
        assembled.extend(imports.iter().cloned());
        let wrapper = assemble_wrapper_schema(&assembled);

        let guard =
            ResolverGuard::install_for_schema(Arc::clone(&self.resolver), nested.import_namespaces);
        let compilation = self.libxml2.parse_schema_from_memory(wrapper.as_bytes());
        if let Some(failure) = guard.take_failure() {
            return Err(failure);
        }
        drop(guard);
        let compilation = compilation?;

        Ok(CompiledSchema {
            imports,
            schema: compilation.schema,
            diagnostics: compilation.diagnostics,
        })
    }
}

/// Local path named by a schema hint, relative hints resolved against the document
fn local_hint(hint: &str, document: &Path) -> Option<PathBuf> {
    if let Some(path) = local_path(hint) {
        return Some(path);
    }
    if Url::parse(hint).is_ok() {
        return None;
    }
    let base = document.parent().unwrap_or(Path::new("."));
    Some(base.join(hint))
}
