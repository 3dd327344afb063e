use crate::artifact::{
    ArtifactSelection, CatalogSelection, DeclaredDependency, DependencyFilter,
    DirectoryArtifactSupplier,
};
use crate::cli::Cli;
use crate::error::{ConfigError, ConfigResult as Result};
use crate::error_reporter::VerbosityLevel;
use crate::output::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Prefix of every environment variable read by [`ConfigManager`]
pub const ENV_PREFIX: &str = "CATALOG_VALIDATE_";

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub catalog: CatalogConfig,
    pub files: FileConfig,
    pub output: OutputConfig,
}

/// Where catalogs come from and how they resolve
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog root used as-is, bypassing the artifact supplier
    pub catalog_dir: Option<PathBuf>,
    pub selection: ArtifactSelection,
    /// Public entries win over system entries in entity lookups
    pub prefer_public: bool,
    pub schema_version: Option<String>,
    /// Directory holding unpacked artifacts as `catalog-<version>`
    pub schemas_dir: PathBuf,
    pub unpack_dir: Option<PathBuf>,
    /// Declared schema dependencies, `group:artifact:version`
    pub dependencies: Vec<String>,
    pub dependency_includes: Vec<String>,
    pub dependency_excludes: Vec<String>,
}

/// Target document selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct FileConfig {
    /// Include patterns (glob syntax, relative to the base directory)
    pub include_patterns: Vec<String>,
    /// Exclude patterns (glob syntax, relative to the base directory)
    pub exclude_patterns: Vec<String>,
    /// Maximum directory depth below the base directory
    pub max_depth: Option<usize>,
    pub follow_symlinks: bool,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub verbose: bool,
    /// Quiet mode (errors only)
    pub quiet: bool,
    /// Skip validation entirely
    pub skip: bool,
}

impl OutputConfig {
    pub fn verbosity(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            catalog_dir: None,
            selection: ArtifactSelection::default(),
            prefer_public: true,
            schema_version: None,
            schemas_dir: PathBuf::from("target").join("schemas"),
            unpack_dir: None,
            dependencies: Vec::new(),
            dependency_includes: DependencyFilter::default_includes(),
            dependency_excludes: Vec::new(),
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(cli, &SystemEnvProvider).await
    }

    pub async fn load_config_with(cli: &Cli, env: &impl EnvProvider) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            let file_config = Self::load_from_file(config_path).await?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = Self::merge_configs(config, found_config);
        }

        config = Self::apply_environment_overrides_with(env, config)?;
        config = Self::merge_with_cli(config, cli);

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;
        debug!("loading configuration from {}", path.display());

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub async fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "catalog-validate.toml",
            "catalog-validate.json",
            ".catalog-validate.toml",
            ".catalog-validate.json",
        ];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("catalog-validate");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        let var = |name: &str| env.get(&format!("{}{}", ENV_PREFIX, name));

        if let Some(dir) = var("CATALOG_DIR") {
            config.catalog.catalog_dir = Some(PathBuf::from(dir));
        }
        if let Some(selection) = var("SELECTION") {
            config.catalog.selection = match selection.to_lowercase().as_str() {
                "convention" => ArtifactSelection::Convention,
                "discover" => ArtifactSelection::Discover,
                "declared" => ArtifactSelection::Declared,
                _ => return Err(invalid_env("SELECTION", &selection)),
            };
        }
        if let Some(prefer_public) = var("PREFER_PUBLIC") {
            config.catalog.prefer_public = parse_bool("PREFER_PUBLIC", &prefer_public)?;
        }
        if let Some(version) = var("SCHEMA_VERSION") {
            config.catalog.schema_version = Some(version);
        }
        if let Some(dir) = var("SCHEMAS_DIR") {
            config.catalog.schemas_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("UNPACK_DIR") {
            config.catalog.unpack_dir = Some(PathBuf::from(dir));
        }
        if let Some(dependencies) = var("DEPENDENCIES") {
            config.catalog.dependencies = split_list(&dependencies);
        }

        if let Some(include) = var("INCLUDE") {
            config.files.include_patterns = split_list(&include);
        }
        if let Some(exclude) = var("EXCLUDE") {
            config.files.exclude_patterns = split_list(&exclude);
        }
        if let Some(depth) = var("MAX_DEPTH") {
            config.files.max_depth = Some(
                depth
                    .trim()
                    .parse()
                    .map_err(|_| invalid_env("MAX_DEPTH", &depth))?,
            );
        }
        if let Some(follow) = var("FOLLOW_SYMLINKS") {
            config.files.follow_symlinks = parse_bool("FOLLOW_SYMLINKS", &follow)?;
        }

        if let Some(verbose) = var("VERBOSE") {
            config.output.verbose = parse_bool("VERBOSE", &verbose)?;
        }
        if let Some(quiet) = var("QUIET") {
            config.output.quiet = parse_bool("QUIET", &quiet)?;
        }
        if let Some(skip) = var("SKIP") {
            config.output.skip = parse_bool("SKIP", &skip)?;
        }
        if let Some(format) = var("FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormat::Human,
                "json" => OutputFormat::Json,
                _ => return Err(invalid_env("FORMAT", &format)),
            };
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence where given)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        if let Some(dir) = &cli.catalog_dir {
            config.catalog.catalog_dir = Some(dir.clone());
        }
        if let Some(selection) = cli.selection {
            config.catalog.selection = selection;
        }
        if cli.prefer_system {
            config.catalog.prefer_public = false;
        }
        if let Some(version) = &cli.schema_version {
            config.catalog.schema_version = Some(version.clone());
        }
        if let Some(dir) = &cli.schemas_dir {
            config.catalog.schemas_dir = dir.clone();
        }
        if let Some(dir) = &cli.unpack_dir {
            config.catalog.unpack_dir = Some(dir.clone());
        }
        if !cli.dependencies.is_empty() {
            config.catalog.dependencies = cli.dependencies.clone();
        }
        if !cli.dependency_includes.is_empty() {
            config.catalog.dependency_includes = cli.dependency_includes.clone();
        }
        if !cli.dependency_excludes.is_empty() {
            config.catalog.dependency_excludes = cli.dependency_excludes.clone();
        }

        if !cli.include_patterns.is_empty() {
            config.files.include_patterns = cli.include_patterns.clone();
        }
        if !cli.exclude_patterns.is_empty() {
            config.files.exclude_patterns = cli.exclude_patterns.clone();
        }
        if cli.max_depth.is_some() {
            config.files.max_depth = cli.max_depth;
        }
        if cli.follow_symlinks {
            config.files.follow_symlinks = true;
        }

        if let Some(format) = cli.output_format {
            config.output.format = format;
        }
        if cli.verbose {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }
        if cli.skip {
            config.output.skip = true;
        }

        config
    }

    /// Merge two configurations (second takes precedence for values it sets)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        let catalog = override_config.catalog;
        if catalog.catalog_dir.is_some() {
            base.catalog.catalog_dir = catalog.catalog_dir;
        }
        base.catalog.selection = catalog.selection;
        base.catalog.prefer_public = catalog.prefer_public;
        if catalog.schema_version.is_some() {
            base.catalog.schema_version = catalog.schema_version;
        }
        base.catalog.schemas_dir = catalog.schemas_dir;
        if catalog.unpack_dir.is_some() {
            base.catalog.unpack_dir = catalog.unpack_dir;
        }
        if !catalog.dependencies.is_empty() {
            base.catalog.dependencies = catalog.dependencies;
        }
        if !catalog.dependency_includes.is_empty() {
            base.catalog.dependency_includes = catalog.dependency_includes;
        }
        if !catalog.dependency_excludes.is_empty() {
            base.catalog.dependency_excludes = catalog.dependency_excludes;
        }

        if !override_config.files.include_patterns.is_empty() {
            base.files.include_patterns = override_config.files.include_patterns;
        }
        if !override_config.files.exclude_patterns.is_empty() {
            base.files.exclude_patterns = override_config.files.exclude_patterns;
        }
        if override_config.files.max_depth.is_some() {
            base.files.max_depth = override_config.files.max_depth;
        }
        base.files.follow_symlinks = override_config.files.follow_symlinks;

        base.output = override_config.output;

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        if let Some(version) = &config.catalog.schema_version
            && version.trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "Schema version must not be empty".to_string(),
            ));
        }

        let dependencies = Self::declared_dependencies(config)?;

        if config.catalog.selection == ArtifactSelection::Declared
            && config.catalog.catalog_dir.is_none()
            && dependencies.is_empty()
        {
            return Err(ConfigError::Validation(
                "The declared selection needs at least one dependency".to_string(),
            ));
        }

        if config.catalog.selection == ArtifactSelection::Declared
            && config.catalog.unpack_dir.is_some()
            && dependencies.len() > 1
        {
            return Err(ConfigError::Validation(
                "An unpack directory serves a single artifact; declare one dependency or use schemas_dir"
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn declared_dependencies(config: &Config) -> Result<Vec<DeclaredDependency>> {
        config
            .catalog
            .dependencies
            .iter()
            .map(|coordinate| coordinate.parse())
            .collect()
    }

    /// The catalog selection described by the configuration
    pub fn catalog_selection(config: &Config) -> crate::error::Result<CatalogSelection> {
        Ok(CatalogSelection {
            selection: config.catalog.selection,
            catalog_dir: config.catalog.catalog_dir.clone(),
            schema_version: config.catalog.schema_version.clone(),
            dependencies: Self::declared_dependencies(config)?,
            filter: DependencyFilter::new(
                config.catalog.dependency_includes.clone(),
                config.catalog.dependency_excludes.clone(),
            )?,
        })
    }

    /// The artifact supplier over the configured schemas directory
    pub fn artifact_supplier(config: &Config) -> DirectoryArtifactSupplier {
        DirectoryArtifactSupplier::new(config.catalog.schemas_dir.clone())
            .with_unpack_dir(config.catalog.unpack_dir.clone())
    }
}

fn invalid_env(name: &str, value: &str) -> ConfigError {
    ConfigError::Environment(format!("Invalid {}{} value: {}", ENV_PREFIX, name, value))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    value.trim().parse().map_err(|_| invalid_env(name, value))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
