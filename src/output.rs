//! Output and Reporting
//!
//! Renders a [`RunReport`] for people (the record lines followed by a summary) or
//! as JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error_reporter::VerbosityLevel;
use crate::orchestrator::RunReport;
use crate::validator::{FileValidationResult, ValidationStatus};

/// Output format of the final report
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

/// Output formatter for run reports
pub struct Output {
    format: OutputFormat,
    verbosity: VerbosityLevel,
    show_colors: bool,
}

impl Output {
    pub fn new(format: OutputFormat, verbosity: VerbosityLevel) -> Self {
        Self {
            format,
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
        }
    }

    pub fn with_colors(mut self, show_colors: bool) -> Self {
        self.show_colors = show_colors;
        self
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Human => self.format_human(report),
            OutputFormat::Json => format_json(report),
        }
    }

    fn format_human(&self, report: &RunReport) -> String {
        let mut output = String::new();

        if self.verbosity == VerbosityLevel::Verbose {
            for file in &report.files {
                output.push_str(&self.format_file_result(file));
                output.push('\n');
            }
            for aborted in &report.aborted_files {
                output.push_str(&format!(
                    "{}  {} - {}\n",
                    self.colorize("✗ ABORTED", "31"),
                    aborted.path.display(),
                    aborted.reason
                ));
            }
        }

        output.push_str(&report.message);

        match self.verbosity {
            VerbosityLevel::Quiet => {
                if !report.passed() {
                    output.push_str(&format!(
                        "Errors: {} Fatal: {}\n",
                        report.error_count, report.fatal_count
                    ));
                }
            }
            VerbosityLevel::Normal | VerbosityLevel::Verbose => {
                output.push_str(&self.format_summary(report));
            }
        }

        output
    }

    pub fn format_file_result(&self, result: &FileValidationResult) -> String {
        let path_display = result.path.display();
        let duration_str = format_duration(result.duration);

        match &result.status {
            ValidationStatus::Valid => format!(
                "{}  {} ({})",
                self.colorize("✓ VALID", "32"),
                path_display,
                duration_str
            ),
            ValidationStatus::WellFormed => format!(
                "{}  {} ({}) - no schema declared",
                self.colorize("✓ WELL-FORMED", "36"),
                path_display,
                duration_str
            ),
            ValidationStatus::Invalid { error_count } => format!(
                "{}  {} ({}) - {} error{}",
                self.colorize("✗ INVALID", "31"),
                path_display,
                duration_str,
                error_count,
                if *error_count == 1 { "" } else { "s" }
            ),
        }
    }

    fn format_summary(&self, report: &RunReport) -> String {
        let mut output = String::new();
        output.push_str("Validation Summary:\n");
        output.push_str(&format!("  Catalogs: {}\n", report.catalogs.len()));
        output.push_str(&format!("  Total files: {}\n", report.total_files()));

        if report.warning_count > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Warnings:", "33"),
                report.warning_count
            ));
        }
        if report.error_count > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Errors:", "31"),
                report.error_count
            ));
        }
        if report.fatal_count > 0 {
            output.push_str(&format!(
                "  {} {}\n",
                self.colorize("Fatal errors:", "31"),
                report.fatal_count
            ));
        }

        let elapsed = (report.finished_at - report.started_at)
            .to_std()
            .unwrap_or_default();
        output.push_str(&format!("  Duration: {}\n", format_duration(elapsed)));

        let verdict = if report.passed() {
            self.colorize("PASSED", "32")
        } else {
            self.colorize("FAILED", "31")
        };
        output.push_str(&format!("  Result: {}\n", verdict));
        output
    }
}

fn format_json(report: &RunReport) -> String {
    match serde_json::to_string_pretty(report) {
        Ok(json) => json,
        Err(e) => format!("{{\"error\": \"failed to serialize report: {}\"}}", e),
    }
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}
