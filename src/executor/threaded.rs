//! Thread backend
//!
//! Each suite runs on its own OS thread under the worker pool. Memory is
//! shared, so a finished thread's result is folded straight into the run
//! state without serialization and without keeping a proxy.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::executor::suite::panic_message;
use crate::executor::{absorb, run_suite, ExecutionBackend, PoolSettings, SuiteExit, WorkerHandle, WorkerPool};
use crate::extensions::ExtensionRegistry;
use crate::models::{RunnableUnit, Suite};
use crate::results::{ResultProxy, ResultState};
use crate::utils::waiting_for;

pub struct ThreadBackend {
    settings: PoolSettings,
    extensions: Arc<ExtensionRegistry>,
}

impl ThreadBackend {
    pub fn new(settings: PoolSettings, extensions: Arc<ExtensionRegistry>) -> Self {
        Self {
            settings,
            extensions,
        }
    }
}

/// Running suite thread
pub struct ThreadWorker {
    suite: Arc<RunnableUnit>,
    handle: Option<JoinHandle<ResultProxy>>,
    poll_interval: Duration,
}

impl WorkerHandle for ThreadWorker {
    type Output = SuiteExit;

    fn is_alive(&mut self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn join(&mut self, timeout: Duration) -> Option<SuiteExit> {
        let interval = self.poll_interval;
        waiting_for(|| !self.is_alive(), interval, timeout).ok()?;

        let handle = self.handle.take()?;
        Some(SuiteExit {
            suite: self.suite.clone(),
            outcome: handle.join().map_err(panic_message),
        })
    }

    fn terminate(&mut self) {
        // Threads cannot be killed; detach and let it finish on its own
        if self.handle.take().is_some() {
            warn!("Detaching thread of suite {}", self.suite.id);
        }
    }

    fn abandoned(&mut self) -> Option<SuiteExit> {
        Some(SuiteExit {
            suite: self.suite.clone(),
            outcome: Err("thread did not finish in time and was detached".to_string()),
        })
    }
}

impl ExecutionBackend for ThreadBackend {
    fn name(&self) -> &'static str {
        "thread"
    }

    fn run(&self, suites: &[Suite], state: &mut ResultState) -> Result<(), EngineError> {
        info!(
            "Running {} suites on threads (max {} concurrent)",
            suites.len(),
            self.settings.max_concurrency
        );

        let mut pool = WorkerPool::new(self.settings);
        for suite in suites {
            pool.submit(suite.clone());
        }

        // Proxies are cut from a template so `state` stays free for merging
        let stop = state.stop_flag().clone();
        let template = ResultState::new()
            .with_fail_fast(state.fail_fast())
            .with_stop_flag(stop.clone());
        let poll_interval = self.settings.poll_interval;

        let start = |suite: Suite| -> Result<ThreadWorker, EngineError> {
            let unit = suite.unit().clone();
            let mut proxy = template.proxy(suite.name());
            let extensions = self.extensions.clone();

            let handle = thread::Builder::new()
                .name(format!("suite-{}", suite.name()))
                .spawn(move || {
                    run_suite(&suite, proxy.state_mut(), &extensions);
                    proxy
                })
                .map_err(|source| EngineError::Spawn {
                    suite: unit.name.clone(),
                    source,
                })?;

            debug!("Started thread for suite {}", unit.id);
            Ok(ThreadWorker {
                suite: unit,
                handle: Some(handle),
                poll_interval,
            })
        };

        let result = pool.drive(&stop, start, |exit| absorb(state, exit));
        info!(
            "Thread backend finished: {} suites started, peak {} running",
            pool.started(),
            pool.peak_running()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaseError, UnitId};
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn backend(max: usize) -> ThreadBackend {
        ThreadBackend::new(
            PoolSettings::new(NonZeroUsize::new(max).unwrap(), Duration::from_secs(5)),
            Arc::new(ExtensionRegistry::new()),
        )
    }

    #[test]
    fn test_runs_every_suite() {
        let suites: Vec<Suite> = (0..6)
            .map(|n| {
                Suite::new(format!("s{n}"))
                    .with_case("pass", |_| Ok(()))
                    .with_case("fail", |_| Err(CaseError::failed("no")))
            })
            .collect();

        let mut state = ResultState::new();
        backend(3).run(&suites, &mut state).unwrap();

        assert_eq!(state.successes().len(), 6);
        assert_eq!(state.failures().len(), 6);
        assert!(state.proxies().is_empty());
        assert!(state.check_exclusive().is_empty());
    }

    #[test]
    fn test_concurrency_is_bounded() {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let suites: Vec<Suite> = (0..8)
            .map(|n| {
                let live = live.clone();
                let peak = peak.clone();
                Suite::new(format!("s{n}")).with_case("busy", move |_| {
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    live.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        let mut state = ResultState::new();
        backend(2).run(&suites, &mut state).unwrap();

        assert_eq!(state.successes().len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_stop_bounded_by_in_flight() {
        let started = Arc::new(AtomicUsize::new(0));
        let suites: Vec<Suite> = (0..10)
            .map(|n| {
                let started = started.clone();
                Suite::new(format!("s{n}")).with_case("work", move |ctx| {
                    started.fetch_add(1, Ordering::SeqCst);
                    if n == 1 {
                        ctx.request_stop();
                    } else {
                        thread::sleep(Duration::from_millis(20));
                    }
                    Ok(())
                })
            })
            .collect();

        let mut state = ResultState::new();
        backend(2).run(&suites, &mut state).unwrap();

        // Suite 1 is admitted second; at most one more slot was in flight
        assert!(state.should_stop());
        assert!(started.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_overrunning_suite_is_error() {
        let suites = vec![Suite::new("slow").with_case("late", |_| {
            thread::sleep(Duration::from_millis(300));
            Err(CaseError::failed("too late"))
        })];

        let backend = ThreadBackend::new(
            PoolSettings::new(NonZeroUsize::new(2).unwrap(), Duration::from_millis(50)),
            Arc::new(ExtensionRegistry::new()),
        );
        let mut state = ResultState::new();
        backend.run(&suites, &mut state).unwrap();

        let (_, detail) = state.errors().get(&UnitId::suite("slow")).unwrap();
        assert!(detail.message.as_deref().unwrap().contains("detached"));
        assert_eq!(state.total(), 1);
        assert!(!state.was_success());
    }

    #[test]
    fn test_thread_panic_is_error() {
        let mut worker = ThreadWorker {
            suite: Suite::new("boom").unit().clone(),
            handle: Some(thread::spawn(|| panic!("worker exploded"))),
            poll_interval: Duration::from_millis(1),
        };

        let exit = worker.join(Duration::from_secs(5)).unwrap();
        assert_eq!(exit.outcome.unwrap_err(), "worker exploded");
        assert!(!worker.is_alive());
    }
}
