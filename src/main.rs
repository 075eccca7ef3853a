//! Seismograph - test execution engine CLI
//!
//! ## Usage
//!
//! ```bash
//! # Run the smoke catalog one suite at a time
//! seismograph run
//!
//! # Run suites in worker processes, two at a time
//! seismograph run --strategy process -j 2 --catalog pairs
//!
//! # Stop at the first failure and keep the results
//! seismograph run --strategy thread --fail-fast --save
//!
//! # List catalogs and their cases
//! seismograph list --detailed
//!
//! # Inspect saved runs
//! seismograph results list
//! seismograph results show latest
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use tracing::{debug, info};

use seismograph::catalog;
use seismograph::cli::{self, Args};
use seismograph::config::{env::print_env_help, ConfigFile, EnvConfig, RunConfig};
use seismograph::executor::{serve_worker, TestRunner};
use seismograph::output::{write_results_to_file, OutputFormat, ResultFormatter};
use seismograph::results::{ResultsStorage, RunSummary};
use seismograph::utils::{init_logger, LogLevel};

// Backends build their own runtimes, so main stays synchronous.
fn main() -> Result<()> {
    let args = Args::parse();

    let level = LogLevel::select(
        args.verbose,
        matches!(args.command, cli::Command::Worker(_)),
        EnvConfig::load().log_level.as_deref(),
    );
    init_logger(level);

    match args.command {
        cli::Command::Run(run_args) => {
            let success = run_catalog(run_args)?;
            if !success {
                std::process::exit(1);
            }
        }
        cli::Command::List(list_args) => {
            list_catalogs(list_args)?;
        }
        cli::Command::Results(results_args) => {
            show_results(results_args)?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args)?;
        }
        cli::Command::Worker(worker_args) => {
            run_worker(worker_args)?;
        }
    }

    Ok(())
}

/// Defaults, then config file, then environment, then flags
fn resolve_config(args: &cli::RunArgs) -> Result<RunConfig> {
    let mut config = ConfigFile::load_default(args.config.as_deref())?.run;
    EnvConfig::load().apply(&mut config);

    if let Some(strategy) = &args.strategy {
        config.strategy = strategy.parse()?;
    }
    if let Some(max) = args.concurrency {
        config.max_concurrency = max;
    }
    if let Some(secs) = args.timeout {
        config.release_timeout_secs = secs;
    }
    if args.fail_fast {
        config.fail_fast = true;
    }
    if let Some(catalog) = &args.catalog {
        config.catalog = catalog.clone();
    }

    config.validate()?;
    Ok(config)
}

fn run_catalog(args: cli::RunArgs) -> Result<bool> {
    let format = OutputFormat::from_str(&args.format)
        .with_context(|| format!("Unknown output format: {}", args.format))?;
    let config = resolve_config(&args)?;
    let suites = catalog::load(&config.catalog)?;

    info!(
        "Catalog {} ({} suites), strategy {}, max {} workers",
        config.catalog,
        suites.len(),
        config.strategy,
        config.max_concurrency
    );

    let runner = TestRunner::new(config)?.with_extensions(catalog::extensions());
    let summary = runner.run(&suites)?;

    let formatter = ResultFormatter::new(format);
    println!("{}", formatter.format_summary(&summary)?);

    if args.save {
        let path = ResultsStorage::default_dir().save(&summary)?;
        println!("Saved run {} to {}", summary.run_id, path.display());
    }

    if let Some(output) = &args.output {
        write_results_to_file(output, &summary, output_format_for(output, format))?;
        println!("Results written to {}", output.display());
    }

    Ok(summary.was_success())
}

/// File output follows the extension when it names a format
fn output_format_for(path: &Path, fallback: OutputFormat) -> OutputFormat {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => OutputFormat::JsonPretty,
        Some("csv") => OutputFormat::Csv,
        _ => fallback,
    }
}

fn list_catalogs(args: cli::ListArgs) -> Result<()> {
    let names = match &args.catalog {
        Some(name) => vec![name.as_str()],
        None => catalog::names(),
    };

    println!("\nSuite Catalogs\n");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for name in names {
        let suites = catalog::load(name)?;
        println!(
            "\n{} - {}",
            name,
            catalog::describe(name).unwrap_or_default()
        );
        println!("──────────────────────────────────────────────────────────────────────");

        for suite in &suites {
            let mut notes = Vec::new();
            if let Some(reason) = suite.skip_reason() {
                notes.push(format!("skipped: {reason}"));
            }
            if !suite.requires().is_empty() {
                notes.push(format!("requires: {}", suite.requires().join(", ")));
            }

            if notes.is_empty() {
                println!("  {:20} {} cases", suite.name(), suite.len());
            } else {
                println!(
                    "  {:20} {} cases [{}]",
                    suite.name(),
                    suite.len(),
                    notes.join("; ")
                );
            }

            if args.detailed {
                for case in suite.cases() {
                    let kind = if case.body().is_async() { "async" } else { "blocking" };
                    println!("      {:32} {}", case.id().as_str(), kind);
                }
            }
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    Ok(())
}

fn show_results(args: cli::ResultsArgs) -> Result<()> {
    let storage = ResultsStorage::default_dir();

    match args.action {
        cli::ResultsAction::List => {
            let runs = storage.list_runs()?;
            if runs.is_empty() {
                println!("\n📭 No stored results found.");
                println!("   Save a run with: seismograph run --save");
                return Ok(());
            }

            println!("\n┌──────────────────────────────────────────────────────────────────┐");
            println!("│ Stored Runs                                                      │");
            println!("├──────────────────────────────────────────────────────────────────┤");
            for run in &runs {
                println!(
                    "│ {:20} │ {:11} │ {:4} units │ {:5.1}% │ {} │",
                    run.id,
                    run.strategy,
                    run.total,
                    run.pass_rate,
                    if run.success { "✓" } else { "✗" }
                );
            }
            println!("└──────────────────────────────────────────────────────────────────┘");
            println!("\nStored in {}\n", storage.base_dir().display());
        }

        cli::ResultsAction::Show { id, format } => {
            let format = OutputFormat::from_str(&format)
                .with_context(|| format!("Unknown output format: {format}"))?;
            let summary: RunSummary = if id == "latest" {
                storage.latest()?.context("No stored runs")?
            } else {
                storage.load(&id)?
            };
            println!("{}", ResultFormatter::new(format).format_summary(&summary)?);
        }

        cli::ResultsAction::Delete { id } => {
            storage.delete(&id)?;
            println!("✓ Deleted run {id}");
        }
    }

    Ok(())
}

fn manage_config(args: cli::ConfigArgs) -> Result<()> {
    match args.action {
        cli::ConfigAction::Show { config } => {
            let mut file = ConfigFile::load_default(config.as_deref())?;
            let env = EnvConfig::load();
            if env.has_any() {
                debug!("Applying environment overrides");
                env.apply(&mut file.run);
            }
            println!("{}", serde_yaml::to_string(&file)?);
        }

        cli::ConfigAction::Init { path } => {
            if path.exists() {
                anyhow::bail!("Configuration file already exists: {}", path.display());
            }
            ConfigFile::example().save(&path)?;
            println!("✓ Configuration file created: {}", path.display());
        }

        cli::ConfigAction::Env => {
            print_env_help();
        }
    }

    Ok(())
}

fn run_worker(args: cli::WorkerArgs) -> Result<()> {
    let suites = catalog::load(&args.catalog)?;
    let extensions = catalog::extensions();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let bundle = serve_worker(&suites, &args.suite, args.fail_fast, &extensions, &mut out)?;
    extensions.teardown();

    debug!(
        "Worker for {} reported {} passed, {} failed, {} errors",
        args.suite,
        bundle.successes.len(),
        bundle.failures.len(),
        bundle.errors.len()
    );
    Ok(())
}
