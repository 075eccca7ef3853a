//! Test execution runner
//!
//! Picks the backend for a run, executes the suites, turns a coordination
//! failure into a fatal entry of the result and tears the run's extensions
//! down afterwards.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::executor::{Backend, ExecutionBackend};
use crate::extensions::ExtensionRegistry;
use crate::models::Suite;
use crate::results::{generate_run_id, ResultState, RunSummary};

/// Runs one batch of suites under a [`RunConfig`]
pub struct TestRunner {
    config: RunConfig,
    extensions: Arc<ExtensionRegistry>,
}

impl TestRunner {
    /// Create a runner; the config is validated here, before any suite runs
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            extensions: Arc::new(ExtensionRegistry::new()),
        })
    }

    /// Use a pre-populated extension registry
    pub fn with_extensions(mut self, extensions: Arc<ExtensionRegistry>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn extensions(&self) -> &Arc<ExtensionRegistry> {
        &self.extensions
    }

    /// Run `suites` and return the final state. A coordination error is
    /// recorded as the state's fatal message rather than returned.
    pub fn execute(&self, suites: &[Suite]) -> Result<ResultState> {
        let backend = Backend::from_config(&self.config, self.extensions.clone())?;
        info!(
            "Running {} suites with the {} backend",
            suites.len(),
            backend.name()
        );

        let mut state = ResultState::new().with_fail_fast(self.config.fail_fast);
        if let Err(e) = backend.run(suites, &mut state) {
            error!("Run aborted: {}", e);
            state.record_fatal(e.to_string());
        }

        self.extensions.teardown();

        let violations = state.check_exclusive();
        if !violations.is_empty() {
            warn!(
                "{} units have more than one outcome: {:?}",
                violations.len(),
                violations
            );
        }
        Ok(state)
    }

    /// Run `suites` and summarize the outcome
    pub fn run(&self, suites: &[Suite]) -> Result<RunSummary> {
        let run_id = generate_run_id();
        let started_at = Utc::now();

        let state = self.execute(suites)?;
        let summary = RunSummary::from_state(run_id, self.config.strategy.name(), started_at, &state);

        info!(
            "Run {} completed in {}ms - Pass: {}/{} ({:.1}%)",
            summary.run_id,
            summary.total_duration_ms,
            summary.passed,
            summary.total,
            summary.pass_rate()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Strategy;
    use crate::models::CaseError;

    fn suites() -> Vec<Suite> {
        vec![
            Suite::new("a")
                .with_case("ok", |_| Ok(()))
                .with_case("bad", |_| Err(CaseError::failed("nope"))),
            Suite::new("b").with_case("ok", |_| Ok(())),
        ]
    }

    #[test]
    fn test_runner_rejects_invalid_config() {
        assert!(TestRunner::new(RunConfig::default().with_max_concurrency(0)).is_err());
    }

    #[test]
    fn test_in_process_strategies_agree() {
        for strategy in [Strategy::Sequential, Strategy::Thread, Strategy::Cooperative] {
            let runner = TestRunner::new(RunConfig::default().with_strategy(strategy)).unwrap();
            let summary = runner.run(&suites()).unwrap();

            assert_eq!(summary.strategy, strategy.name());
            assert_eq!(summary.passed, 2, "{strategy}");
            assert_eq!(summary.failed, 1, "{strategy}");
            assert_eq!(summary.proxies, 0, "{strategy}");
            assert!(!summary.was_success());
        }
    }

    #[test]
    fn test_fail_fast_marks_stop() {
        let config = RunConfig::default().with_fail_fast(true);
        let summary = TestRunner::new(config).unwrap().run(&suites()).unwrap();

        assert!(summary.stopped_early);
        assert_eq!(summary.total, 2);
    }

    #[test]
    fn test_extensions_torn_down_after_run() {
        let extensions = Arc::new(ExtensionRegistry::new());
        extensions.shared_data("answer", 42u32);

        let suite = Suite::new("ext")
            .require("answer")
            .with_case("reads", |ctx| {
                let answer = ctx.ext::<u32>("answer")?;
                if *answer == 42 {
                    Ok(())
                } else {
                    Err(CaseError::failed("wrong answer"))
                }
            });

        let runner = TestRunner::new(RunConfig::default())
            .unwrap()
            .with_extensions(extensions.clone());
        let summary = runner.run(&[suite]).unwrap();

        assert!(summary.was_success());
        assert!(extensions.is_torn_down());
    }

    #[test]
    fn test_fatal_error_recorded_in_summary() {
        let config = RunConfig::default()
            .with_strategy(Strategy::Process)
            .with_worker_program("/nonexistent/seismograph");
        let summary = TestRunner::new(config).unwrap().run(&suites()).unwrap();

        assert!(summary.fatal.is_some());
        assert!(!summary.was_success());
    }
}
