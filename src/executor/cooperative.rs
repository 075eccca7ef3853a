//! Cooperative backend
//!
//! Suites run as tasks on a single-threaded tokio runtime. A task gives up
//! the thread only at its own await points and once after every case, so
//! blocking case bodies run to completion without interleaving. Admission
//! goes through the same worker pool as the thread backend, polled
//! asynchronously so that running tasks make progress while it waits.

use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::EngineError;
use crate::executor::suite::panic_message;
use crate::executor::{
    absorb, run_suite_cooperative, ExecutionBackend, PoolSettings, SuiteExit, WorkerHandle,
    WorkerPool,
};
use crate::extensions::ExtensionRegistry;
use crate::models::{RunnableUnit, Suite};
use crate::results::{ResultProxy, ResultState};

pub struct CooperativeBackend {
    settings: PoolSettings,
    extensions: Arc<ExtensionRegistry>,
}

impl CooperativeBackend {
    pub fn new(settings: PoolSettings, extensions: Arc<ExtensionRegistry>) -> Self {
        Self {
            settings,
            extensions,
        }
    }
}

/// Suite task on the scheduler
pub struct TaskWorker {
    suite: Arc<RunnableUnit>,
    handle: Option<JoinHandle<ResultProxy>>,
}

impl WorkerHandle for TaskWorker {
    type Output = SuiteExit;

    fn is_alive(&mut self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Blocking here would stall the only thread, so a task is reaped only
    /// once finished. The pool does the waiting asynchronously.
    fn join(&mut self, _timeout: Duration) -> Option<SuiteExit> {
        if self.is_alive() {
            return None;
        }

        // Finished, so ready; unconstrained keeps the coop budget from hiding that
        let finished = tokio::task::unconstrained(self.handle.take()?);
        let outcome = match finished.now_or_never()? {
            Ok(proxy) => Ok(proxy),
            Err(e) if e.is_panic() => Err(panic_message(e.into_panic())),
            Err(e) => Err(e.to_string()),
        };
        Some(SuiteExit {
            suite: self.suite.clone(),
            outcome,
        })
    }

    fn terminate(&mut self) {
        if let Some(handle) = &self.handle {
            debug!("Aborting task of suite {}", self.suite.id);
            handle.abort();
        }
    }

    fn abandoned(&mut self) -> Option<SuiteExit> {
        self.handle.take();
        Some(SuiteExit {
            suite: self.suite.clone(),
            outcome: Err("task did not finish in time and was aborted".to_string()),
        })
    }
}

impl ExecutionBackend for CooperativeBackend {
    fn name(&self) -> &'static str {
        "cooperative"
    }

    fn run(&self, suites: &[Suite], state: &mut ResultState) -> Result<(), EngineError> {
        info!(
            "Running {} suites as cooperative tasks (max {} concurrent)",
            suites.len(),
            self.settings.max_concurrency
        );

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(EngineError::Runtime)?;

        let mut pool = WorkerPool::new(self.settings);
        for suite in suites {
            pool.submit(suite.clone());
        }

        let stop = state.stop_flag().clone();
        let template = ResultState::new()
            .with_fail_fast(state.fail_fast())
            .with_stop_flag(stop.clone());

        let start = |suite: Suite| -> Result<TaskWorker, EngineError> {
            let unit = suite.unit().clone();
            let mut proxy = template.proxy(suite.name());
            let extensions = self.extensions.clone();

            let handle = tokio::spawn(async move {
                run_suite_cooperative(&suite, proxy.state_mut(), &extensions).await;
                proxy
            });

            debug!("Scheduled task for suite {}", unit.id);
            Ok(TaskWorker {
                suite: unit,
                handle: Some(handle),
            })
        };

        let result = runtime.block_on(pool.drive_async(&stop, start, |exit| absorb(state, exit)));
        info!(
            "Cooperative backend finished: {} suites started, peak {} running",
            pool.started(),
            pool.peak_running()
        );
        result
    }
}
