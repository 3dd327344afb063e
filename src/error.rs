use std::path::PathBuf;

use thiserror::Error;

use crate::error_reporter::Diagnostic;

/// Main application error type that encompasses every way a validation run can stop
///
/// A run that completes and reports failed documents is *not* an error: those
/// outcomes live in the [`crate::error_reporter::ErrorAggregator`]. Everything here
/// is either a broken precondition (configuration) or an infrastructure failure.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("{0}")]
    Config(String),

    #[error("Schema artifact not found: version {version} - expected at {path}")]
    ArtifactNotFound { version: String, path: PathBuf },

    #[error("Failed to read {file}: {source}")]
    UnreadableFile {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("While parsing {file}: {diagnostic}")]
    Raised { file: PathBuf, diagnostic: Diagnostic },

    #[error("Resource resolution failed for {location}: {source}")]
    Resolver {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("LibXML2 internal error: {details}")]
    LibXml2Internal { details: String },

    #[error("File system traversal error: {path} - {reason}")]
    FileSystemTraversal { path: PathBuf, reason: String },

    #[error("Validation run is {actual}, expected {expected}")]
    InvalidRunState {
        expected: &'static str,
        actual: &'static str,
    },
}

impl ValidationError {
    /// The run could not start because an operator-supplied precondition is broken.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ValidationError::Catalog(_)
                | ValidationError::Config(_)
                | ValidationError::ArtifactNotFound { .. }
        )
    }
}

/// Catalog-specific error types
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("Failed to read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed catalog {path}: {details}")]
    Malformed { path: PathBuf, details: String },

    #[error("Not an OASIS catalog: {path} (root element {{{namespace}}}{local_name})")]
    NotACatalog {
        path: PathBuf,
        namespace: String,
        local_name: String,
    },

    #[error("Invalid catalog location '{location}': {details}")]
    InvalidLocation { location: String, details: String },
}

/// Configuration-specific error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

/// LibXML2-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("Path is not representable for libxml2: {path}")]
    InvalidPath { path: PathBuf },

    #[error("Schema validation internal error: {details}")]
    InternalError { details: String },
}

impl From<ConfigError> for ValidationError {
    fn from(err: ConfigError) -> Self {
        ValidationError::Config(err.to_string())
    }
}

impl From<LibXml2Error> for ValidationError {
    fn from(err: LibXml2Error) -> Self {
        ValidationError::LibXml2Internal {
            details: err.to_string(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Catalog result type alias
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;
