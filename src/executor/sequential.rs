//! Sequential backend
//!
//! Runs suites one after another on the caller's thread. No pool, no channel.

use std::sync::Arc;
use tracing::info;

use crate::error::EngineError;
use crate::executor::{run_suite, ExecutionBackend};
use crate::extensions::ExtensionRegistry;
use crate::models::Suite;
use crate::results::ResultState;

pub struct SequentialBackend {
    extensions: Arc<ExtensionRegistry>,
}

impl SequentialBackend {
    pub fn new(extensions: Arc<ExtensionRegistry>) -> Self {
        Self { extensions }
    }
}

impl ExecutionBackend for SequentialBackend {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn run(&self, suites: &[Suite], state: &mut ResultState) -> Result<(), EngineError> {
        for (index, suite) in suites.iter().enumerate() {
            if state.should_stop() {
                info!(
                    "Stop requested, {} suites not started",
                    suites.len() - index
                );
                break;
            }
            run_suite(suite, state, &self.extensions);
        }
        Ok(())
    }
}
