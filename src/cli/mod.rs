//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Pluggable test-execution engine
#[derive(Parser, Debug)]
#[command(name = "seismograph")]
#[command(version)]
#[command(about = "Run test suites sequentially, on threads, as async tasks or in worker processes")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a suite catalog
    Run(RunArgs),

    /// List catalogs and their suites
    List(ListArgs),

    /// View saved run results
    Results(ResultsArgs),

    /// Show or create configuration files
    Config(ConfigArgs),

    /// Run one suite and report it on stdout (spawned by the process backend)
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Execution strategy (sequential, thread, cooperative, process)
    #[arg(short, long)]
    pub strategy: Option<String>,

    /// Maximum number of concurrently running workers
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Seconds to wait for a worker slot before giving up
    #[arg(short, long)]
    pub timeout: Option<f64>,

    /// Stop at the first failure or error
    #[arg(long)]
    pub fail_fast: bool,

    /// Suite catalog to run
    #[arg(short, long)]
    pub catalog: Option<String>,

    /// Configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Save the run to the results directory
    #[arg(long)]
    pub save: bool,

    /// Write results to file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only list this catalog
    #[arg(short, long)]
    pub catalog: Option<String>,

    /// Show cases of every suite
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for results command
#[derive(Parser, Debug)]
pub struct ResultsArgs {
    #[command(subcommand)]
    pub action: ResultsAction,
}

#[derive(Subcommand, Debug)]
pub enum ResultsAction {
    /// List saved runs
    List,

    /// Show a saved run
    Show {
        /// Run id, or "latest"
        id: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Delete a saved run
    Delete {
        /// Run id
        id: String,
    },
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show {
        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write an example configuration file
    Init {
        /// Destination (.yaml, .yml or .json)
        #[arg(default_value = "seismograph.yaml")]
        path: PathBuf,
    },

    /// List supported environment variables
    Env,
}

/// Arguments for the hidden worker command
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Catalog holding the suite
    #[arg(long)]
    pub catalog: String,

    /// Suite to run
    #[arg(long)]
    pub suite: String,

    /// Stop the suite at its first failure
    #[arg(long)]
    pub fail_fast: bool,
}
