//! Where the catalogs of a run come from
//!
//! Schema trees are published as versioned artifacts. Fetching and unpacking them is
//! someone else's job: a [`SchemaArtifactSupplier`] only maps a version to a local,
//! already-unpacked directory. [`CatalogSelection`] then turns that directory into the
//! list of catalog files to load, according to an [`ArtifactSelection`] policy.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog_discovery::discover_catalogs;
use crate::error::{CatalogError, ConfigError, Result, ValidationError};

/// File name of the catalog expected at the root of an artifact under [`ArtifactSelection::Convention`]
pub const CONVENTIONAL_CATALOG: &str = "catalog.xml";

/// Policy deciding which artifact roots are used and how catalogs are found in them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactSelection {
    /// One artifact, a single `catalog.xml` at its root
    #[default]
    Convention,
    /// One artifact, every catalog found below its root
    Discover,
    /// Every declared schema dependency passing the filter, catalogs discovered in each
    Declared,
}

impl fmt::Display for ArtifactSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactSelection::Convention => "convention",
            ArtifactSelection::Discover => "discover",
            ArtifactSelection::Declared => "declared",
        };
        f.write_str(name)
    }
}

/// A declared schema dependency, `group:artifact:version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredDependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl DeclaredDependency {
    /// `group:artifact`, the part include/exclude patterns match against
    pub fn key(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }
}

impl fmt::Display for DeclaredDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

impl FromStr for DeclaredDependency {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        match parts.as_slice() {
            [group_id, artifact_id, version]
                if !group_id.is_empty() && !artifact_id.is_empty() && !version.is_empty() =>
            {
                Ok(Self {
                    group_id: group_id.to_string(),
                    artifact_id: artifact_id.to_string(),
                    version: version.to_string(),
                })
            }
            _ => Err(ConfigError::Validation(format!(
                "Invalid dependency '{}': expected group:artifact:version",
                s
            ))),
        }
    }
}

/// Include/exclude patterns over `group:artifact` keys of declared dependencies
#[derive(Debug, Clone)]
pub struct DependencyFilter {
    includes: Vec<String>,
    include_set: GlobSet,
    excludes: Vec<String>,
    exclude_set: GlobSet,
}

impl DependencyFilter {
    /// Default include patterns: catalog and xsd artifacts of any group
    pub fn default_includes() -> Vec<String> {
        vec!["*:catalog".to_string(), "*:xsd".to_string()]
    }

    pub fn new(includes: Vec<String>, excludes: Vec<String>) -> Result<Self> {
        let includes = if includes.is_empty() {
            Self::default_includes()
        } else {
            includes
        };
        Ok(Self {
            include_set: build_set(&includes)?,
            includes,
            exclude_set: build_set(&excludes)?,
            excludes,
        })
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn excludes(&self) -> &[String] {
        &self.excludes
    }

    /// Dependencies matching an include pattern, in declaration order
    ///
    /// Exclude patterns are reported but not applied.
    pub fn apply<'a>(&self, dependencies: &'a [DeclaredDependency]) -> Vec<&'a DeclaredDependency> {
        let mut selected = Vec::new();
        for dependency in dependencies {
            let key = dependency.key();
            if !self.include_set.is_match(&key) {
                debug!("dependency {} not included", dependency);
                continue;
            }
            if self.exclude_set.is_match(&key) {
                // TODO: confirm with the schema owners whether excluded dependencies
                // should be dropped; released builds have always kept them.
                warn!(
                    "dependency {} matches an exclude pattern; exclude filtering is not applied",
                    dependency
                );
            }
            selected.push(dependency);
        }
        selected
    }
}

impl Default for DependencyFilter {
    fn default() -> Self {
        let includes = Self::default_includes();
        let include_set = build_set(&includes).unwrap_or_else(|_| GlobSet::empty());
        Self {
            includes,
            include_set,
            excludes: Vec::new(),
            exclude_set: GlobSet::empty(),
        }
    }
}

fn build_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            ValidationError::Config(format!("Invalid dependency pattern '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ValidationError::Config(format!("Failed to build dependency patterns: {}", e)))
}

/// Maps a schema version to the local directory of its unpacked artifact
pub trait SchemaArtifactSupplier {
    fn locate(&self, version: &str) -> Result<PathBuf>;
}

/// Supplier over a directory of unpacked artifacts named `catalog-<version>`
#[derive(Debug, Clone)]
pub struct DirectoryArtifactSupplier {
    schemas_dir: PathBuf,
    unpack_dir: Option<PathBuf>,
}

impl DirectoryArtifactSupplier {
    pub fn new(schemas_dir: impl Into<PathBuf>) -> Self {
        Self {
            schemas_dir: schemas_dir.into(),
            unpack_dir: None,
        }
    }

    /// Use `unpack_dir` for every version instead of `<schemas_dir>/catalog-<version>`
    pub fn with_unpack_dir(mut self, unpack_dir: Option<PathBuf>) -> Self {
        self.unpack_dir = unpack_dir;
        self
    }

    pub fn artifact_dir(&self, version: &str) -> PathBuf {
        match &self.unpack_dir {
            Some(dir) => dir.clone(),
            None => self.schemas_dir.join(format!("catalog-{}", version)),
        }
    }
}

impl SchemaArtifactSupplier for DirectoryArtifactSupplier {
    fn locate(&self, version: &str) -> Result<PathBuf> {
        let dir = self.artifact_dir(version);
        if !dir.is_dir() {
            return Err(ValidationError::ArtifactNotFound {
                version: version.to_string(),
                path: dir,
            });
        }
        debug!("schema artifact {} at {}", version, dir.display());
        Ok(dir)
    }
}

/// Everything needed to decide which catalog files a run loads
#[derive(Debug, Clone, Default)]
pub struct CatalogSelection {
    pub selection: ArtifactSelection,
    /// Use this directory as the only artifact root, bypassing the supplier
    pub catalog_dir: Option<PathBuf>,
    /// Explicit schema version; wins over declared dependencies
    pub schema_version: Option<String>,
    pub dependencies: Vec<DeclaredDependency>,
    pub filter: DependencyFilter,
}

impl CatalogSelection {
    /// Version of the single artifact used by `Convention` and `Discover`
    pub fn schema_version(&self) -> Option<String> {
        if let Some(version) = &self.schema_version {
            return Some(version.clone());
        }
        self.filter
            .apply(&self.dependencies)
            .first()
            .map(|dependency| dependency.version.clone())
    }

    /// Artifact roots to search for catalogs
    pub fn artifact_roots(&self, supplier: &dyn SchemaArtifactSupplier) -> Result<Vec<PathBuf>> {
        if let Some(dir) = &self.catalog_dir {
            return Ok(vec![dir.clone()]);
        }

        match self.selection {
            ArtifactSelection::Convention | ArtifactSelection::Discover => {
                let version = self.schema_version().ok_or_else(|| {
                    ValidationError::Config("can't get xml schema version".to_string())
                })?;
                Ok(vec![supplier.locate(&version)?])
            }
            ArtifactSelection::Declared => {
                let selected = self.filter.apply(&self.dependencies);
                if selected.is_empty() {
                    return Err(ValidationError::Config(
                        "no declared schema dependency matches the include patterns".to_string(),
                    ));
                }
                selected
                    .into_iter()
                    .map(|dependency| supplier.locate(&dependency.version))
                    .collect()
            }
        }
    }

    /// Catalog files to load, in order
    pub fn catalog_paths(&self, supplier: &dyn SchemaArtifactSupplier) -> Result<Vec<PathBuf>> {
        let mut catalogs = Vec::new();
        for root in self.artifact_roots(supplier)? {
            match self.selection {
                ArtifactSelection::Convention => catalogs.push(conventional_catalog(&root)?),
                ArtifactSelection::Discover | ArtifactSelection::Declared => {
                    catalogs.extend(discover_catalogs(&root)?)
                }
            }
        }
        info!(
            "{} catalog(s) selected by the {} policy",
            catalogs.len(),
            self.selection
        );
        Ok(catalogs)
    }
}

fn conventional_catalog(root: &Path) -> Result<PathBuf> {
    if !root.is_dir() {
        return Err(CatalogError::DirectoryNotFound {
            path: root.to_path_buf(),
        }
        .into());
    }
    let catalog = root.join(CONVENTIONAL_CATALOG);
    if !catalog.is_file() {
        return Err(CatalogError::Read {
            path: catalog,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "catalog.xml not found"),
        }
        .into());
    }
    Ok(catalog)
}
