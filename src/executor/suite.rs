//! Suite execution
//!
//! Runs the cases of one suite, in their defined order, into a
//! [`ResultState`]. Every backend ends up here: the sequential backend on the
//! caller's thread, the thread backend on a worker thread, the process
//! backend inside the worker process. The cooperative backend uses
//! [`run_suite_cooperative`], which awaits async cases in place and yields
//! after every case.

use futures::FutureExt;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::extensions::ExtensionRegistry;
use crate::models::{Case, CaseBody, CaseContext, CaseError, CaseResult, OutcomeDetail, RunnableUnit, Suite};
use crate::results::{ResultAggregator, ResultProxy, ResultState};
use crate::utils::Timer;

/// A case either returned, or panicked with the given message
type CaseOutcome = Result<CaseResult, String>;

/// Run every case of `suite` on the current thread
pub fn run_suite(suite: &Suite, state: &mut ResultState, extensions: &Arc<ExtensionRegistry>) {
    if settled_without_running(suite, state, extensions) {
        return;
    }

    debug!("Running suite {} ({} cases)", suite.name(), suite.len());
    for case in suite {
        if state.should_stop() {
            debug!("Stop requested, leaving suite {} at {}", suite.name(), case.name());
            break;
        }

        let ctx = context(case, state, extensions);
        let timer = Timer::start(case.id().as_str());
        let outcome = match case.body() {
            CaseBody::Blocking(body) => catch_unwind(AssertUnwindSafe(|| body(&ctx))),
            CaseBody::Async(body) => match async_runtime() {
                Ok(runtime) => catch_unwind(AssertUnwindSafe(|| runtime.block_on(body(ctx)))),
                Err(e) => Ok(Err(e)),
            },
        }
        .map_err(panic_message);

        record(state, case.unit(), outcome, timer.stop());
    }
}

/// Cooperative variant of [`run_suite`]. Suspends at the await points of async
/// cases and once after every case.
pub async fn run_suite_cooperative(
    suite: &Suite,
    state: &mut ResultState,
    extensions: &Arc<ExtensionRegistry>,
) {
    if settled_without_running(suite, state, extensions) {
        return;
    }

    debug!("Running suite {} ({} cases)", suite.name(), suite.len());
    for case in suite {
        if state.should_stop() {
            debug!("Stop requested, leaving suite {} at {}", suite.name(), case.name());
            break;
        }

        let ctx = context(case, state, extensions);
        let timer = Timer::start(case.id().as_str());
        let outcome = match case.body() {
            CaseBody::Blocking(body) => catch_unwind(AssertUnwindSafe(|| body(&ctx))),
            CaseBody::Async(body) => AssertUnwindSafe(body(ctx)).catch_unwind().await,
        }
        .map_err(panic_message);

        record(state, case.unit(), outcome, timer.stop());
        tokio::task::yield_now().await;
    }
}

/// What a worker thread or task hands back once its suite is done
#[derive(Debug)]
pub struct SuiteExit {
    pub suite: Arc<RunnableUnit>,
    /// The suite's results, or why the worker died without producing them
    pub outcome: Result<ResultProxy, String>,
}

/// Fold an in-process worker's result into the run-wide state
pub fn absorb(state: &mut ResultState, exit: SuiteExit) {
    match exit.outcome {
        Ok(proxy) => ResultAggregator::merge_local(state, proxy),
        Err(reason) => {
            error!("Worker for suite {} died: {}", exit.suite.id, reason);
            state.add_error(
                exit.suite,
                OutcomeDetail::default().with_message(format!("worker died: {reason}")),
            );
        }
    }
}

/// Skipped suites and suites with missing extensions settle every case up front
fn settled_without_running(
    suite: &Suite,
    state: &mut ResultState,
    extensions: &Arc<ExtensionRegistry>,
) -> bool {
    if let Some(reason) = suite.skip_reason() {
        debug!("Skipping suite {}: {}", suite.name(), reason);
        for case in suite {
            state.add_skip(case.unit().clone(), OutcomeDetail::default().with_message(reason));
        }
        return true;
    }

    let missing = extensions.missing(suite.requires());
    if missing.is_empty() {
        return false;
    }

    let message = format!("missing extension(s): {}", missing.join(", "));
    warn!("Suite {}: {}", suite.name(), message);
    for case in suite {
        state.add_error(
            case.unit().clone(),
            OutcomeDetail::default().with_message(message.as_str()),
        );
    }
    true
}

fn context(case: &Case, state: &ResultState, extensions: &Arc<ExtensionRegistry>) -> CaseContext {
    CaseContext::new(case.unit().clone(), state.stop_flag().clone(), extensions.clone())
}

fn async_runtime() -> Result<tokio::runtime::Runtime, CaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CaseError::Error(anyhow::Error::new(e).context("failed to start async runtime")))
}

fn record(state: &mut ResultState, unit: &Arc<RunnableUnit>, outcome: CaseOutcome, duration_ms: u64) {
    let detail = OutcomeDetail::new(duration_ms);
    let unit = unit.clone();

    match outcome {
        Ok(Ok(())) => state.add_success(unit, detail),
        Ok(Err(CaseError::Skipped(reason))) => state.add_skip(unit, detail.with_message(reason)),
        Ok(Err(CaseError::Failed(message))) => state.add_failure(unit, detail.with_message(message)),
        Ok(Err(CaseError::Error(e))) => state.add_error(unit, detail.with_message(format!("{e:#}"))),
        // A panic is an assertion that did not hold
        Err(message) => state.add_failure(unit, detail.with_message(message)),
    };
}

pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(_) => "panicked".to_string(),
    }
}
