//! `debby` checks whether the dependencies of a project are out of date.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use debby_core::config::CheckConfig;
use debby_core::execution::TokioProcessExecutor;
use debby_core::orchestration::{CheckReport, FailurePolicy};
use debby_core::report::{JsonNotifier, Notifier, TextNotifier};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "debby")]
#[command(version, about = "Check a project's dependencies for available updates")]
struct Cli {
    /// Project root containing the manifests and lock files
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// JSON config file; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Composer binary or phar to use instead of the one on PATH
    #[arg(long, value_name = "PATH")]
    composer_executable: Option<PathBuf>,

    /// npm binary to use instead of the one on PATH
    #[arg(long, value_name = "PATH")]
    npm_executable: Option<PathBuf>,

    /// Timeout for each tool invocation
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Number of latest-release lookups to run in parallel per manager
    #[arg(long, short = 'j', value_name = "N")]
    jobs: Option<usize>,

    /// Keep checking the other managers when one fails
    #[arg(long)]
    isolate_failures: bool,

    /// Log debug output to stderr
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Cli {
    fn resolve_config(&self) -> anyhow::Result<CheckConfig> {
        let mut config = match &self.config {
            Some(path) => CheckConfig::load(path)?,
            None => CheckConfig::default(),
        };

        if let Some(root) = &self.root {
            config.root_dir = root.clone();
        }
        if let Some(executable) = &self.composer_executable {
            config.composer.executable = Some(executable.clone());
        }
        if let Some(executable) = &self.npm_executable {
            config.npm.executable = Some(executable.clone());
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        if let Some(jobs) = self.jobs {
            config.lookup_concurrency = jobs;
        }
        if self.isolate_failures {
            config.failure_policy = FailurePolicy::Isolate;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debby=debug,debby_core=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("debby=info,debby_core=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();
}

fn run(cli: &Cli) -> anyhow::Result<CheckReport> {
    let config = cli.resolve_config()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let _runtime = runtime.enter();

    let runner = config.build_runner(Arc::new(TokioProcessExecutor))?;
    let report = runner
        .run()
        .with_context(|| format!("dependency check of {} failed", config.root_dir.display()))?;

    let stdout = io::stdout().lock();
    let written = match cli.format {
        OutputFormat::Text => TextNotifier::new(stdout).notify(&report),
        OutputFormat::Json => JsonNotifier::new(stdout).notify(&report),
    };
    written.context("failed to write the report")?;

    if !report.has_updates() && !report.has_failures() {
        tracing::info!("all required packages are up to date");
    }

    Ok(report)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tracing::debug!("debby starting with args: {:?}", cli);

    match run(&cli) {
        Ok(report) if report.has_failures() => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("debby: {error:#}");
            ExitCode::FAILURE
        }
    }
}
