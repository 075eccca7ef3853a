//! Execution backends
//!
//! One backend is picked from the run config and used for the whole run.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::{RunConfig, Strategy};
use crate::error::EngineError;
use crate::executor::{CooperativeBackend, ProcessBackend, SequentialBackend, ThreadBackend, WorkerCommand};
use crate::extensions::ExtensionRegistry;
use crate::models::Suite;
use crate::results::ResultState;

/// Runs a batch of suites into a result state.
///
/// Test outcomes always land in `state`; an `Err` means the run itself was
/// aborted.
pub trait ExecutionBackend {
    fn name(&self) -> &'static str;

    fn run(&self, suites: &[Suite], state: &mut ResultState) -> Result<(), EngineError>;
}

pub enum Backend {
    Sequential(SequentialBackend),
    Thread(ThreadBackend),
    Cooperative(CooperativeBackend),
    Process(ProcessBackend),
}

impl Backend {
    /// Build the backend named by `config.strategy`
    pub fn from_config(config: &RunConfig, extensions: Arc<ExtensionRegistry>) -> Result<Self> {
        let settings = config.pool_settings()?;

        let backend = match config.strategy {
            Strategy::Sequential => Backend::Sequential(SequentialBackend::new(extensions)),
            Strategy::Thread => Backend::Thread(ThreadBackend::new(settings, extensions)),
            Strategy::Cooperative => {
                Backend::Cooperative(CooperativeBackend::new(settings, extensions))
            }
            Strategy::Process => {
                Backend::Process(ProcessBackend::new(settings, worker_command(config)?))
            }
        };
        Ok(backend)
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Backend::Sequential(_) => Strategy::Sequential,
            Backend::Thread(_) => Strategy::Thread,
            Backend::Cooperative(_) => Strategy::Cooperative,
            Backend::Process(_) => Strategy::Process,
        }
    }

    fn inner(&self) -> &dyn ExecutionBackend {
        match self {
            Backend::Sequential(b) => b,
            Backend::Thread(b) => b,
            Backend::Cooperative(b) => b,
            Backend::Process(b) => b,
        }
    }
}

impl ExecutionBackend for Backend {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn run(&self, suites: &[Suite], state: &mut ResultState) -> Result<(), EngineError> {
        self.inner().run(suites, state)
    }
}

/// `<program> worker --catalog <name>`; the program defaults to this executable
fn worker_command(config: &RunConfig) -> Result<WorkerCommand> {
    let program = match &config.worker_program {
        Some(program) => program.clone(),
        None => std::env::current_exe().context("Failed to locate worker executable")?,
    };

    Ok(WorkerCommand::new(program)
        .arg("worker")
        .arg("--catalog")
        .arg(&config.catalog))
}
