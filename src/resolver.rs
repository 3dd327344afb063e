//! Catalog-backed resolution of schema resources and external entities
//!
//! Resolution never touches the network: a catalog location that is not a local file
//! counts as unresolved.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error};

use crate::catalog::{CatalogModel, local_path};
use crate::error::{Result, ValidationError};

/// Resource type of XML Schema documents requested while compiling schemas
pub const XML_SCHEMA_TYPE: &str = "http://www.w3.org/2001/XMLSchema";

/// A request for a schema document issued while compiling or validating
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaResourceRequest {
    pub resource_type: Option<String>,
    pub namespace_uri: Option<String>,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub base_uri: Option<String>,
}

impl SchemaResourceRequest {
    /// Request for the schema of `namespace_uri`
    pub fn for_namespace(namespace_uri: impl Into<String>) -> Self {
        Self {
            resource_type: Some(XML_SCHEMA_TYPE.to_string()),
            namespace_uri: Some(namespace_uri.into()),
            ..Self::default()
        }
    }

    pub fn with_system_id(mut self, system_id: Option<String>) -> Self {
        self.system_id = system_id;
        self
    }

    pub fn with_public_id(mut self, public_id: Option<String>) -> Self {
        self.public_id = public_id;
        self
    }

    pub fn with_base_uri(mut self, base_uri: Option<String>) -> Self {
        self.base_uri = base_uri;
        self
    }
}

/// An opened, resolved resource
///
/// The resolved location is both the effective system identifier and the logical URI
/// of the stream, so relative references inside the resource resolve against it.
#[derive(Debug)]
pub struct ResolvedResource {
    public_id: Option<String>,
    system_id: String,
    path: PathBuf,
}

impl ResolvedResource {
    /// Check the local file behind a resolved location can be opened
    pub fn open(public_id: Option<String>, system_id: String, path: PathBuf) -> Result<Self> {
        File::open(&path).map_err(|source| ValidationError::Resolver {
            location: system_id.clone(),
            source,
        })?;
        Ok(Self {
            public_id,
            system_id,
            path,
        })
    }

    pub fn public_id(&self) -> Option<&str> {
        self.public_id.as_deref()
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    pub fn base_uri(&self) -> &str {
        &self.system_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Resolution protocol consulted by the schema engine
///
/// `Ok(None)` means unresolved; `Err` is an I/O failure opening a resolved location.
#[cfg_attr(test, mockall::automock)]
pub trait ResourceResolver: Send + Sync {
    /// Resolve a schema document: system identifier first, then the namespace URI
    fn resolve_schema_resource(
        &self,
        request: &SchemaResourceRequest,
    ) -> Result<Option<ResolvedResource>>;

    /// Resolve an external entity through the combined public/system lookup
    fn resolve_entity<'a, 'b>(
        &self,
        public_id: Option<&'a str>,
        system_id: Option<&'b str>,
    ) -> Result<Option<ResolvedResource>>;
}

/// [`ResourceResolver`] over a read-only [`CatalogModel`]
#[derive(Debug, Clone)]
pub struct CatalogResourceResolver {
    catalog: Arc<CatalogModel>,
}

impl CatalogResourceResolver {
    pub fn new(catalog: Arc<CatalogModel>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &CatalogModel {
        &self.catalog
    }

    fn open(&self, public_id: Option<&str>, location: String) -> Result<Option<ResolvedResource>> {
        let Some(path) = local_path(&location) else {
            debug!("resolved location {} is not local, ignoring it", location);
            return Ok(None);
        };
        ResolvedResource::open(public_id.map(str::to_string), location, path).map(Some)
    }
}

impl ResourceResolver for CatalogResourceResolver {
    fn resolve_schema_resource(
        &self,
        request: &SchemaResourceRequest,
    ) -> Result<Option<ResolvedResource>> {
        debug!(
            "resolveResource type: {:?}, namespaceURI: {:?}, publicId: {:?}, systemId: {:?}, baseURI: {:?}",
            request.resource_type,
            request.namespace_uri,
            request.public_id,
            request.system_id,
            request.base_uri
        );

        if let Some(system_id) = &request.system_id {
            debug!("resolving by systemId: {}", system_id);
            match self.catalog.resolve_system(system_id) {
                Some(location) => {
                    debug!("resolved by systemId as {}", location);
                    if let Some(resource) = self.open(request.public_id.as_deref(), location)? {
                        return Ok(Some(resource));
                    }
                }
                None => debug!("systemId resolution failed"),
            }
        }

        if let Some(namespace_uri) = &request.namespace_uri {
            debug!("resolving by uri: {}", namespace_uri);
            if let Some(location) = self.catalog.resolve_uri(namespace_uri) {
                debug!("resolved by URI as {}", location);
                if let Some(resource) = self.open(request.public_id.as_deref(), location)? {
                    return Ok(Some(resource));
                }
            }
        }

        match &request.namespace_uri {
            Some(namespace_uri) => error!(
                "resolution failed for namespace {} (systemId {:?})",
                namespace_uri, request.system_id
            ),
            None => debug!("no catalog entry for systemId {:?}", request.system_id),
        }
        Ok(None)
    }

    fn resolve_entity(
        &self,
        public_id: Option<&str>,
        system_id: Option<&str>,
    ) -> Result<Option<ResolvedResource>> {
        debug!(
            "resolveEntity publicId: {:?}, systemId: {:?}",
            public_id, system_id
        );
        match self.catalog.resolve_entity(public_id, system_id) {
            Some(location) => self.open(public_id, location),
            None => Ok(None),
        }
    }
}
