use std::fmt;

use serde::Serialize;

use crate::error::ValidationError;

/// Classification of a document diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

/// Where a diagnostic was raised; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceLocator {
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl SourceLocator {
    /// A locator with no position information
    pub fn unknown() -> Self {
        Self::default()
    }

    /// A locator pointing into a resource, without position
    pub fn in_resource(public_id: Option<String>, system_id: Option<String>) -> Self {
        Self {
            public_id,
            system_id,
            line: None,
            column: None,
        }
    }

    pub fn at_line(
        public_id: Option<String>,
        system_id: Option<String>,
        line: u32,
        column: u32,
    ) -> Self {
        Self {
            public_id,
            system_id,
            line: Some(line),
            column: Some(column),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.public_id.is_none()
            && self.system_id.is_none()
            && self.line.is_none()
            && self.column.is_none()
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(4);
        if let Some(public_id) = &self.public_id {
            parts.push(format!("Public ID {}", public_id));
        }
        if let Some(system_id) = &self.system_id {
            parts.push(system_id.clone());
        }
        if let Some(line) = self.line {
            parts.push(format!("line {}", line));
        }
        if let Some(column) = self.column {
            parts.push(format!(" column {}", column));
        }
        f.write_str(&parts.join(", "))
    }
}

/// One classified diagnostic produced while validating a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub locator: SourceLocator,
    pub message: String,
}

/// Recorded diagnostics are stored as they were reported
pub type ErrorRecord = Diagnostic;

impl Diagnostic {
    pub fn new(severity: Severity, locator: SourceLocator, message: impl Into<String>) -> Self {
        Self {
            severity,
            locator,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    /// `, at <location>: <SEVERITY>: <message>`; the location part is omitted when unknown
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.locator.is_unknown() {
            write!(f, ", at {}", self.locator)?;
        }
        write!(f, ": {}: {}", self.severity, self.message)
    }
}

/// Returned by an [`ErrorHandler`] to abort validation of the current document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Raised;

/// Receives diagnostics in the order the engine reports them
pub trait ErrorHandler {
    fn warning(&mut self, diagnostic: &Diagnostic) -> Result<(), Raised>;
    fn error(&mut self, diagnostic: &Diagnostic) -> Result<(), Raised>;
    fn fatal_error(&mut self, diagnostic: &Diagnostic) -> Result<(), Raised>;

    /// Route a diagnostic to the method matching its severity
    fn dispatch(&mut self, diagnostic: &Diagnostic) -> Result<(), Raised> {
        match diagnostic.severity {
            Severity::Warning => self.warning(diagnostic),
            Severity::Error => self.error(diagnostic),
            Severity::Fatal => self.fatal_error(diagnostic),
        }
    }
}

/// Default handler: every diagnostic, warnings included, aborts the document
#[derive(Debug, Default, Clone, Copy)]
pub struct RaisingErrorHandler;

impl ErrorHandler for RaisingErrorHandler {
    fn warning(&mut self, _diagnostic: &Diagnostic) -> Result<(), Raised> {
        Err(Raised)
    }

    fn error(&mut self, _diagnostic: &Diagnostic) -> Result<(), Raised> {
        Err(Raised)
    }

    fn fatal_error(&mut self, _diagnostic: &Diagnostic) -> Result<(), Raised> {
        Err(Raised)
    }
}

/// Collects every diagnostic of a run; only fatal diagnostics abort a document
#[derive(Debug, Default, Clone)]
pub struct ErrorAggregator {
    records: Vec<ErrorRecord>,
    warnings: usize,
    errors: usize,
    fatals: usize,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records collected so far, in insertion order
    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.records.clone()
    }

    pub fn records(&self) -> &[ErrorRecord] {
        &self.records
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn fatal_count(&self) -> usize {
        self.fatals
    }

    /// Errors and fatal errors fail a run; warnings never do
    pub fn has_failures(&self) -> bool {
        self.errors + self.fatals > 0
    }

    fn record(&mut self, diagnostic: &Diagnostic) {
        self.records.push(diagnostic.clone());
    }
}

impl ErrorHandler for ErrorAggregator {
    fn warning(&mut self, diagnostic: &Diagnostic) -> Result<(), Raised> {
        self.warnings += 1;
        self.record(diagnostic);
        Ok(())
    }

    fn error(&mut self, diagnostic: &Diagnostic) -> Result<(), Raised> {
        self.errors += 1;
        self.record(diagnostic);
        Ok(())
    }

    fn fatal_error(&mut self, diagnostic: &Diagnostic) -> Result<(), Raised> {
        self.fatals += 1;
        self.record(diagnostic);
        Err(Raised)
    }
}

/// Render records as the report message: one formatted diagnostic per line
pub fn serialize_records(records: &[ErrorRecord]) -> String {
    let mut message = String::new();
    for record in records {
        message.push_str(&record.to_string());
        message.push('\n');
    }
    message
}

/// Verbosity levels for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Only show the error itself
    Quiet,
    /// Show the error with a hint
    Normal,
    /// Show the full source chain as well
    Verbose,
}

/// Reports run-level failures (configuration and infrastructure) on stderr
pub struct ErrorReporter {
    verbosity: VerbosityLevel,
}

impl ErrorReporter {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self { verbosity }
    }

    pub fn report(&self, error: &ValidationError) {
        eprintln!("{}", self.format(error));
    }

    pub fn format(&self, error: &ValidationError) -> String {
        let kind = if error.is_configuration() {
            "Configuration error"
        } else {
            "Infrastructure error"
        };
        let mut output = format!("{}: {}", kind, error);
        if self.verbosity == VerbosityLevel::Quiet {
            return output;
        }

        if let Some(hint) = self.hint(error) {
            output.push_str("\nSuggestion: ");
            output.push_str(hint);
        }

        if self.verbosity == VerbosityLevel::Verbose {
            let mut current: &dyn std::error::Error = error;
            let mut level = 0;
            while let Some(source) = current.source() {
                level += 1;
                output.push_str(&format!("\n  {}: {}", level, source));
                current = source;
            }
        }
        output
    }

    fn hint(&self, error: &ValidationError) -> Option<&'static str> {
        match error {
            ValidationError::Catalog(_) => {
                Some("Check the catalog directory and the syntax of the catalog files")
            }
            ValidationError::ArtifactNotFound { .. } => {
                Some("Unpack the schema artifact or pass --unpack-dir / --catalog-dir")
            }
            ValidationError::Config(_) => {
                Some("Check the configuration file, CATALOG_VALIDATE_* variables and options")
            }
            ValidationError::UnreadableFile { .. } | ValidationError::Resolver { .. } => {
                Some("Check file permissions")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use std::path::PathBuf;

    fn diagnostic(severity: Severity, message: &str) -> Diagnostic {
        Diagnostic::new(
            severity,
            SourceLocator::at_line(None, Some("file:///doc.xml".to_string()), 4, 12),
            message,
        )
    }

    #[test]
    fn test_aggregator_counts_and_order() {
        let mut aggregator = ErrorAggregator::new();

        assert!(aggregator.warning(&diagnostic(Severity::Warning, "w")).is_ok());
        assert!(aggregator.error(&diagnostic(Severity::Error, "e")).is_ok());
        assert_eq!(
            aggregator.fatal_error(&diagnostic(Severity::Fatal, "f")),
            Err(Raised)
        );

        assert_eq!(aggregator.warning_count(), 1);
        assert_eq!(aggregator.error_count(), 1);
        assert_eq!(aggregator.fatal_count(), 1);
        let messages: Vec<_> = aggregator.errors().into_iter().map(|r| r.message).collect();
        assert_eq!(messages, vec!["w", "e", "f"]);
        assert_eq!(
            aggregator.records().len(),
            aggregator.warning_count() + aggregator.error_count() + aggregator.fatal_count()
        );
    }

    #[test]
    fn test_warnings_never_fail() {
        let mut aggregator = ErrorAggregator::new();
        aggregator
            .dispatch(&diagnostic(Severity::Warning, "minor"))
            .unwrap();
        assert!(!aggregator.has_failures());

        aggregator
            .dispatch(&diagnostic(Severity::Error, "invalid"))
            .unwrap();
        assert!(aggregator.has_failures());
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut aggregator = ErrorAggregator::new();
        aggregator.error(&diagnostic(Severity::Error, "one")).unwrap();
        let snapshot = aggregator.errors();
        aggregator.error(&diagnostic(Severity::Error, "two")).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(aggregator.records().len(), 2);
    }

    #[test]
    fn test_raising_handler_raises_on_everything() {
        let mut handler = RaisingErrorHandler;
        assert_eq!(handler.dispatch(&diagnostic(Severity::Warning, "w")), Err(Raised));
        assert_eq!(handler.dispatch(&diagnostic(Severity::Error, "e")), Err(Raised));
        assert_eq!(handler.dispatch(&diagnostic(Severity::Fatal, "f")), Err(Raised));
    }

    #[test]
    fn test_diagnostic_format() {
        let full = Diagnostic::new(
            Severity::Error,
            SourceLocator {
                public_id: Some("-//X//EN".to_string()),
                system_id: Some("file:///doc.xml".to_string()),
                line: Some(3),
                column: Some(9),
            },
            "element 'b' is not expected",
        );
        assert_eq!(
            full.to_string(),
            ", at Public ID -//X//EN, file:///doc.xml, line 3,  column 9: ERROR: element 'b' is not expected"
        );

        let bare = Diagnostic::new(Severity::Fatal, SourceLocator::unknown(), "boom");
        assert_eq!(bare.to_string(), ": FATAL: boom");

        let no_position = Diagnostic::new(
            Severity::Warning,
            SourceLocator::in_resource(None, Some("a.xml".to_string())),
            "note",
        );
        assert_eq!(no_position.to_string(), ", at a.xml: WARNING: note");
    }

    #[test]
    fn test_serialize_records() {
        let records = vec![
            diagnostic(Severity::Error, "first"),
            diagnostic(Severity::Fatal, "second"),
        ];
        let text = serialize_records(&records);
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": ERROR: first"));
        assert!(lines[1].ends_with(": FATAL: second"));
        assert_eq!(serialize_records(&[]), "");
    }

    #[test]
    fn test_error_reporter_classifies_failures() {
        let reporter = ErrorReporter::new(VerbosityLevel::Normal);

        let config: ValidationError = CatalogError::DirectoryNotFound {
            path: PathBuf::from("/missing"),
        }
        .into();
        let text = reporter.format(&config);
        assert!(text.starts_with("Configuration error"));
        assert!(text.contains("Suggestion"));

        let infra = ValidationError::UnreadableFile {
            file: PathBuf::from("doc.xml"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let quiet = ErrorReporter::new(VerbosityLevel::Quiet).format(&infra);
        assert!(quiet.starts_with("Infrastructure error"));
        assert!(!quiet.contains("Suggestion"));

        let verbose = ErrorReporter::new(VerbosityLevel::Verbose).format(&infra);
        assert!(verbose.contains("1: denied"));
    }
}
