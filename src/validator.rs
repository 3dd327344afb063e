//! Catalog-bound document validator
//!
//! A validator has no fixed schema. For every document it reads the root element,
//! resolves the schemas of the namespaces found there through the catalog resolver,
//! compiles them (once per namespace set) and runs libxml2 over the document.
//! Every diagnostic goes to the pluggable [`ErrorHandler`], in the order libxml2
//! reported it; a handler that raises stops the current document.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, ValidationError};
use crate::error_reporter::{
    Diagnostic, ErrorHandler, Raised, RaisingErrorHandler, Severity, SourceLocator,
};
use crate::libxml2::{LoadPurpose, ResolverGuard, ValidationResult};
use crate::resolver::ResourceResolver;
use crate::schema_loader::{
    DocumentProfile, SchemaExtractor, SchemaLoad, SchemaLoader, SchemaRequirement,
};

/// How a document came out of validation, when no diagnostic was raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ValidationStatus {
    /// No errors (warnings may have been reported)
    Valid,
    /// Errors were reported and accepted by the handler
    Invalid { error_count: usize },
    /// Only well-formedness was checked: the document declares no schema
    WellFormed,
}

impl ValidationStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationStatus::Valid | ValidationStatus::WellFormed)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationStatus::Invalid { .. })
    }
}

/// Result of validating a single file
#[derive(Debug, Clone, Serialize)]
pub struct FileValidationResult {
    pub path: PathBuf,
    pub status: ValidationStatus,
    /// Schema documents the file was validated against
    pub schemas: Vec<String>,
    /// Diagnostics handed to the error handler for this file
    pub diagnostics: usize,
    pub duration: Duration,
}

/// Builds validators bound to one resource resolver
#[derive(Clone)]
pub struct ValidatorFactory {
    resolver: Arc<dyn ResourceResolver>,
}

impl ValidatorFactory {
    pub fn new(resolver: Arc<dyn ResourceResolver>) -> Self {
        Self { resolver }
    }

    /// A validator with the strict default handler: any diagnostic aborts the document
    pub fn new_validator(&self) -> XmlValidator<RaisingErrorHandler> {
        self.new_validator_with_handler(RaisingErrorHandler)
    }

    pub fn new_validator_with_handler<H: ErrorHandler>(&self, handler: H) -> XmlValidator<H> {
        XmlValidator {
            loader: SchemaLoader::new(Arc::clone(&self.resolver)),
            handler,
        }
    }
}

/// Reusable validator: compiled schemas are cached for its lifetime
pub struct XmlValidator<H: ErrorHandler> {
    loader: SchemaLoader,
    handler: H,
}

impl<H: ErrorHandler> XmlValidator<H> {
    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Number of distinct assembled schemas compiled so far
    pub fn cached_schemas(&self) -> usize {
        self.loader.cached_schemas()
    }

    /// Validate one file
    ///
    /// Returns `Err(ValidationError::Raised)` when the handler raised on a diagnostic;
    /// any other error is an infrastructure failure.
    pub fn validate(&mut self, file: &Path) -> Result<FileValidationResult> {
        let start = Instant::now();
        info!("validating {}", file.display());

        let mut outcome = Outcome::default();
        let profile = SchemaExtractor::extract(file)?;

        let status = match profile {
            Some(profile) if profile.needs_schema() => {
                self.validate_against_schema(file, &profile, &mut outcome)?
            }
            _ => {
                debug!("{} declares no schema, checking well-formedness", file.display());
                self.check_well_formed(file, &mut outcome)?
            }
        };

        Ok(FileValidationResult {
            path: file.to_path_buf(),
            status,
            schemas: outcome.schemas,
            diagnostics: outcome.diagnostics,
            duration: start.elapsed(),
        })
    }

    fn validate_against_schema(
        &mut self,
        file: &Path,
        profile: &DocumentProfile,
        outcome: &mut Outcome,
    ) -> Result<ValidationStatus> {
        let compiled = match self.loader.load_schema_for(profile, file)? {
            SchemaLoad::Compiled(compiled) => compiled,
            SchemaLoad::Unresolved(requirement) => {
                let diagnostic = Diagnostic::new(
                    Severity::Fatal,
                    SourceLocator::at_line(
                        None,
                        Some(file.display().to_string()),
                        profile.line,
                        profile.column,
                    ),
                    unresolved_message(&requirement),
                );
                self.report(file, diagnostic, outcome)?;
                return Ok(ValidationStatus::Invalid {
                    error_count: outcome.errors,
                });
            }
            SchemaLoad::NotRequired => return self.check_well_formed(file, outcome),
        };

        outcome.schemas = compiled
            .imports
            .iter()
            .map(|import| import.location.clone())
            .collect();
        for diagnostic in &compiled.diagnostics {
            self.report(file, diagnostic.clone(), outcome)?;
        }

        let Some(schema) = &compiled.schema else {
            let diagnostic = Diagnostic::new(
                Severity::Fatal,
                SourceLocator::in_resource(None, Some(file.display().to_string())),
                format!(
                    "Failed to compile the schema assembled from {}",
                    outcome.schemas.join(", ")
                ),
            );
            self.report(file, diagnostic, outcome)?;
            return Ok(ValidationStatus::Invalid {
                error_count: outcome.errors,
            });
        };

        let guard =
            ResolverGuard::install(Arc::clone(self.loader.resolver()), LoadPurpose::Document);
        let result = self.loader.libxml2().validate_file(schema, file);
        if let Some(failure) = guard.take_failure() {
            return Err(failure);
        }
        drop(guard);

        self.finish(file, result?, outcome)
    }

    fn check_well_formed(&mut self, file: &Path, outcome: &mut Outcome) -> Result<ValidationStatus> {
        let guard =
            ResolverGuard::install(Arc::clone(self.loader.resolver()), LoadPurpose::Document);
        let result = self.loader.libxml2().check_well_formed(file);
        if let Some(failure) = guard.take_failure() {
            return Err(failure);
        }
        drop(guard);

        match self.finish(file, result?, outcome)? {
            ValidationStatus::Valid => Ok(ValidationStatus::WellFormed),
            other => Ok(other),
        }
    }

    fn finish(
        &mut self,
        file: &Path,
        result: ValidationResult,
        outcome: &mut Outcome,
    ) -> Result<ValidationStatus> {
        if result.is_error() {
            return Err(ValidationError::LibXml2Internal {
                details: format!(
                    "libxml2 returned {} for {} without a diagnostic",
                    result.code,
                    file.display()
                ),
            });
        }

        let code = result.code;
        for diagnostic in result.diagnostics {
            self.report(file, diagnostic, outcome)?;
        }

        if code > 0 && outcome.errors == 0 {
            let diagnostic = Diagnostic::new(
                Severity::Error,
                SourceLocator::in_resource(None, Some(file.display().to_string())),
                format!("Document failed validation (libxml2 code {})", code),
            );
            self.report(file, diagnostic, outcome)?;
        }

        if outcome.errors > 0 {
            Ok(ValidationStatus::Invalid {
                error_count: outcome.errors,
            })
        } else {
            Ok(ValidationStatus::Valid)
        }
    }

    fn report(&mut self, file: &Path, diagnostic: Diagnostic, outcome: &mut Outcome) -> Result<()> {
        outcome.diagnostics += 1;
        if diagnostic.severity != Severity::Warning {
            outcome.errors += 1;
        }
        match self.handler.dispatch(&diagnostic) {
            Ok(()) => Ok(()),
            Err(Raised) => Err(ValidationError::Raised {
                file: file.to_path_buf(),
                diagnostic,
            }),
        }
    }
}

#[derive(Default)]
struct Outcome {
    schemas: Vec<String>,
    diagnostics: usize,
    errors: usize,
}

fn unresolved_message(requirement: &SchemaRequirement) -> String {
    match (&requirement.namespace, &requirement.hint) {
        (Some(namespace), Some(hint)) => format!(
            "Cannot resolve the schema for namespace '{}' (schema location '{}') through the catalogs",
            namespace, hint
        ),
        (Some(namespace), None) => format!(
            "Cannot resolve the schema for namespace '{}' through the catalogs",
            namespace
        ),
        (None, Some(hint)) => format!(
            "Cannot resolve the no-namespace schema '{}' through the catalogs",
            hint
        ),
        (None, None) => "Cannot resolve a schema for the document".to_string(),
    }
}
