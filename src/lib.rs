//! # catalog-validate Library
//!
//! Validates XML documents against XML Schemas located exclusively through OASIS XML
//! catalogs. Schema and entity references are never fetched from the network; every
//! diagnostic is classified and aggregated so one broken document does not stop a run.

pub mod artifact;
pub mod catalog;
pub mod catalog_discovery;
pub mod cli;
pub mod config;
pub mod error;
pub mod error_reporter;
pub mod file_discovery;
pub mod libxml2;
pub mod orchestrator;
pub mod output;
pub mod resolver;
pub mod schema_loader;
pub mod validator;

pub use artifact::{
    ArtifactSelection, CatalogSelection, DeclaredDependency, DependencyFilter,
    DirectoryArtifactSupplier, SchemaArtifactSupplier,
};
pub use catalog::{CatalogEntry, CatalogModel, EntryKind, Prefer};
pub use catalog_discovery::discover_catalogs;
pub use cli::Cli;
pub use config::{Config, ConfigManager};
pub use error::{CatalogError, ConfigError, ValidationError};
pub use error_reporter::{
    Diagnostic, ErrorAggregator, ErrorHandler, ErrorRecord, RaisingErrorHandler, Severity,
    SourceLocator, VerbosityLevel,
};
pub use file_discovery::FileDiscovery;
pub use libxml2::{LibXml2Wrapper, ValidationResult, XmlSchemaPtr};
pub use orchestrator::{RunOutcome, RunReport, RunState, ValidationRun, execute, run_validation};
pub use output::{Output, OutputFormat};
pub use resolver::{
    CatalogResourceResolver, ResolvedResource, ResourceResolver, SchemaResourceRequest,
};
pub use schema_loader::{DocumentProfile, SchemaExtractor, SchemaLoader};
pub use validator::{FileValidationResult, ValidationStatus, ValidatorFactory, XmlValidator};
