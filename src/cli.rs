use clap::Parser;
use std::path::PathBuf;

use crate::artifact::ArtifactSelection;
use crate::error_reporter::VerbosityLevel;
use crate::output::OutputFormat;

/// Validate XML documents against schemas resolved through OASIS XML catalogs
#[derive(Parser, Debug, Clone)]
#[command(name = "catalog-validate")]
#[command(
    about = "Validate XML documents against schemas resolved through OASIS XML catalogs, never the network"
)]
#[command(version)]
pub struct Cli {
    /// Directory scanned for target documents
    #[arg(help = "Base directory of the documents to validate")]
    pub base_dir: PathBuf,

    /// Use this directory as the only catalog root
    #[arg(long = "catalog-dir")]
    pub catalog_dir: Option<PathBuf>,

    /// Schema artifact version
    #[arg(long = "schema-version")]
    pub schema_version: Option<String>,

    /// Directory holding unpacked artifacts as catalog-<version>
    #[arg(long = "schemas-dir")]
    pub schemas_dir: Option<PathBuf>,

    /// Unpacked artifact directory, replacing <schemas-dir>/catalog-<version>
    #[arg(long = "unpack-dir")]
    pub unpack_dir: Option<PathBuf>,

    /// How catalogs are located in the artifact
    #[arg(long = "selection", value_enum)]
    pub selection: Option<ArtifactSelection>,

    /// Declared schema dependency (group:artifact:version)
    #[arg(long = "dependency", action = clap::ArgAction::Append)]
    pub dependencies: Vec<String>,

    /// Include pattern over group:artifact of declared dependencies
    #[arg(long = "dependency-include", action = clap::ArgAction::Append)]
    pub dependency_includes: Vec<String>,

    /// Exclude pattern over group:artifact of declared dependencies
    #[arg(long = "dependency-exclude", action = clap::ArgAction::Append)]
    pub dependency_excludes: Vec<String>,

    /// Let system entries win over public entries in entity lookups
    #[arg(long = "prefer-system")]
    pub prefer_system: bool,

    /// Include file patterns (glob syntax, relative to the base directory)
    #[arg(long = "include", action = clap::ArgAction::Append)]
    pub include_patterns: Vec<String>,

    /// Exclude file patterns (glob syntax, relative to the base directory)
    #[arg(long = "exclude", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Maximum directory depth below the base directory
    #[arg(long = "max-depth")]
    pub max_depth: Option<usize>,

    /// Descend into symlinked directories and validate symlinked files
    #[arg(long = "follow-symlinks")]
    pub follow_symlinks: bool,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Report format
    #[arg(short = 'f', long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// Skip validation entirely
    #[arg(long = "skip")]
    pub skip: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.base_dir.is_dir() {
            return Err(format!(
                "Base directory does not exist: {}",
                self.base_dir.display()
            ));
        }
        if let Some(dir) = &self.catalog_dir
            && !dir.is_dir()
        {
            return Err(format!("Catalog directory does not exist: {}", dir.display()));
        }
        Ok(())
    }
}
