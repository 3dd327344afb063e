use std::process::ExitCode;

use anyhow::Context;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use catalog_validate::cli::Cli;
use catalog_validate::config::ConfigManager;
use catalog_validate::error::ValidationError;
use catalog_validate::error_reporter::{ErrorReporter, VerbosityLevel};
use catalog_validate::file_discovery::FileDiscovery;
use catalog_validate::orchestrator::run_validation;
use catalog_validate::output::Output;

const EXIT_FAILED: u8 = 1;
const EXIT_CONFIGURATION: u8 = 2;
const EXIT_INFRASTRUCTURE: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    let verbosity = cli.verbosity();
    init_tracing(verbosity);

    match run(cli).await {
        Ok(code) => code,
        Err(error) => {
            let reporter = ErrorReporter::new(verbosity);
            match error.downcast_ref::<ValidationError>() {
                Some(validation_error) => {
                    reporter.report(validation_error);
                    if validation_error.is_configuration() {
                        ExitCode::from(EXIT_CONFIGURATION)
                    } else {
                        ExitCode::from(EXIT_INFRASTRUCTURE)
                    }
                }
                None => {
                    eprintln!("Infrastructure error: {:#}", error);
                    ExitCode::from(EXIT_INFRASTRUCTURE)
                }
            }
        }
    }
}

fn init_tracing(verbosity: VerbosityLevel) {
    let default_level = match verbosity {
        VerbosityLevel::Quiet => "error",
        VerbosityLevel::Normal => "warn",
        VerbosityLevel::Verbose => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = ConfigManager::load_config(&cli)
        .await
        .map_err(ValidationError::from)?;

    if config.output.skip {
        info!("validation is skipped");
        return Ok(ExitCode::SUCCESS);
    }

    cli.validate().map_err(ValidationError::Config)?;

    let selection = ConfigManager::catalog_selection(&config)?;
    let supplier = ConfigManager::artifact_supplier(&config);

    let discovery = FileDiscovery::new()
        .with_include_patterns(config.files.include_patterns.clone())?
        .with_exclude_patterns(config.files.exclude_patterns.clone())?
        .with_max_depth(config.files.max_depth)
        .with_follow_symlinks(config.files.follow_symlinks);
    let files = discovery.discover_files(&cli.base_dir).await?;
    debug!("{} file(s) to validate", files.len());

    let prefer_public = config.catalog.prefer_public;
    let report = tokio::task::spawn_blocking(move || {
        run_validation(&selection, &supplier, &files, prefer_public)
    })
    .await
    .context("validation worker stopped unexpectedly")??;

    let output = Output::new(config.output.format, config.output.verbosity());
    print!("{}", output.format_report(&report));

    if report.passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_FAILED))
    }
}
