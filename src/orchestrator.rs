//! One validation run, from catalog loading to the final report
//!
//! A run is a small state machine:
//! `Idle -> CatalogsLoaded -> ValidatorBuilt -> Validating -> Reported`.
//! Each run owns its catalog model, resolver, validator and aggregator, so
//! independent runs can proceed on different threads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::artifact::{CatalogSelection, SchemaArtifactSupplier};
use crate::catalog::CatalogModel;
use crate::error::{Result, ValidationError};
use crate::error_reporter::{ErrorAggregator, ErrorRecord, serialize_records};
use crate::resolver::CatalogResourceResolver;
use crate::validator::{FileValidationResult, ValidatorFactory, XmlValidator};

/// Stage a [`ValidationRun`] has reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    CatalogsLoaded,
    ValidatorBuilt,
    Validating,
    Reported,
}

impl RunState {
    fn name(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::CatalogsLoaded => "catalogs loaded",
            RunState::ValidatorBuilt => "validator built",
            RunState::Validating => "validating",
            RunState::Reported => "reported",
        }
    }
}

/// Pass/fail verdict of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Passed,
    Failed,
}

/// A file whose validation stopped on a raised diagnostic
#[derive(Debug, Clone, Serialize)]
pub struct AbortedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Everything a completed run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub catalogs: Vec<PathBuf>,
    /// Files validated to completion
    pub files: Vec<FileValidationResult>,
    pub aborted_files: Vec<AbortedFile>,
    pub records: Vec<ErrorRecord>,
    pub warning_count: usize,
    pub error_count: usize,
    pub fatal_count: usize,
    pub outcome: RunOutcome,
    /// The records rendered one per line
    pub message: String,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.outcome == RunOutcome::Passed
    }

    /// Number of target files seen by the run, aborted ones included
    pub fn total_files(&self) -> usize {
        self.files.len() + self.aborted_files.len()
    }
}

/// A single validation run
pub struct ValidationRun {
    id: Uuid,
    started_at: DateTime<Utc>,
    state: RunState,
    prefer_public: bool,
    catalogs: Vec<PathBuf>,
    catalog: Option<Arc<CatalogModel>>,
    validator: Option<XmlValidator<ErrorAggregator>>,
    files: Vec<FileValidationResult>,
    aborted: Vec<AbortedFile>,
}

impl ValidationRun {
    pub fn new(prefer_public: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            state: RunState::Idle,
            prefer_public,
            catalogs: Vec::new(),
            catalog: None,
            validator: None,
            files: Vec::new(),
            aborted: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Load the catalog model; a malformed or unreadable catalog aborts the run
    pub fn load_catalogs(&mut self, catalogs: &[PathBuf]) -> Result<()> {
        self.expect_state(RunState::Idle)?;
        let _span = info_span!("load_catalogs", run = %self.id).entered();

        let model = CatalogModel::load(catalogs, self.prefer_public)?;
        info!(
            "loaded {} catalog file(s), {} entries",
            model.catalogs().count(),
            model.entries().count()
        );
        self.catalogs = catalogs.to_vec();
        self.catalog = Some(Arc::new(model));
        self.state = RunState::CatalogsLoaded;
        Ok(())
    }

    /// Bind a resolver over the loaded catalogs to a validator with a fresh aggregator
    pub fn build_validator(&mut self) -> Result<()> {
        self.expect_state(RunState::CatalogsLoaded)?;
        let catalog = self.catalog.clone().ok_or(ValidationError::InvalidRunState {
            expected: RunState::CatalogsLoaded.name(),
            actual: self.state.name(),
        })?;

        let resolver = Arc::new(CatalogResourceResolver::new(catalog));
        let factory = ValidatorFactory::new(resolver);
        self.validator = Some(factory.new_validator_with_handler(ErrorAggregator::new()));
        self.state = RunState::ValidatorBuilt;
        Ok(())
    }

    /// Validate target files in order
    ///
    /// A raised diagnostic stops only the current file. Any other error aborts the run.
    pub fn validate_files(&mut self, files: &[PathBuf]) -> Result<()> {
        if self.state != RunState::Validating {
            self.expect_state(RunState::ValidatorBuilt)?;
        }
        self.state = RunState::Validating;
        let _span = info_span!("validate_files", run = %self.id).entered();

        for file in files {
            self.validate_one(file)?;
        }
        Ok(())
    }

    fn validate_one(&mut self, file: &Path) -> Result<()> {
        let validator = self
            .validator
            .as_mut()
            .ok_or(ValidationError::InvalidRunState {
                expected: RunState::ValidatorBuilt.name(),
                actual: RunState::Validating.name(),
            })?;

        match validator.validate(file) {
            Ok(result) => {
                debug!(
                    "{}: {:?} in {:?}",
                    result.path.display(),
                    result.status,
                    result.duration
                );
                self.files.push(result);
                Ok(())
            }
            Err(ValidationError::Raised { file, diagnostic }) => {
                warn!("validation of {} aborted{}", file.display(), diagnostic);
                self.aborted.push(AbortedFile {
                    path: file,
                    reason: diagnostic.message,
                });
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Produce the report and close the run
    pub fn report(&mut self) -> Result<RunReport> {
        if self.state != RunState::ValidatorBuilt {
            self.expect_state(RunState::Validating)?;
        }
        let aggregator = self
            .validator
            .take()
            .map(XmlValidator::into_handler)
            .unwrap_or_default();

        let outcome = if aggregator.has_failures() {
            RunOutcome::Failed
        } else {
            RunOutcome::Passed
        };
        let records = aggregator.errors();
        let report = RunReport {
            run_id: self.id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            catalogs: std::mem::take(&mut self.catalogs),
            files: std::mem::take(&mut self.files),
            aborted_files: std::mem::take(&mut self.aborted),
            message: serialize_records(&records),
            records,
            warning_count: aggregator.warning_count(),
            error_count: aggregator.error_count(),
            fatal_count: aggregator.fatal_count(),
            outcome,
        };
        self.state = RunState::Reported;

        info!(
            run = %self.id,
            "run {:?}: {} warning(s), {} error(s), {} fatal error(s)",
            report.outcome, report.warning_count, report.error_count, report.fatal_count
        );
        Ok(report)
    }

    fn expect_state(&self, expected: RunState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ValidationError::InvalidRunState {
                expected: expected.name(),
                actual: self.state.name(),
            })
        }
    }
}

/// Run every stage over explicit catalog files
pub fn execute(catalogs: &[PathBuf], files: &[PathBuf], prefer_public: bool) -> Result<RunReport> {
    let mut run = ValidationRun::new(prefer_public);
    run.load_catalogs(catalogs)?;
    run.build_validator()?;
    run.validate_files(files)?;
    run.report()
}

/// Select catalogs through the artifact policy, then run every stage
pub fn run_validation(
    selection: &CatalogSelection,
    supplier: &dyn SchemaArtifactSupplier,
    files: &[PathBuf],
    prefer_public: bool,
) -> Result<RunReport> {
    let catalogs = selection.catalog_paths(supplier)?;
    execute(&catalogs, files, prefer_public)
}
